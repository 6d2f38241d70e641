//! Errors raised while building a [`crate::GithubClient`].
//!
//! Failures of individual calls are reported as
//! [`orchestration::RemoteCallError`] instead.

use thiserror::Error;

/// Why a [`crate::GithubClient`] could not be constructed.
#[derive(Debug, Error)]
pub enum GithubError {
    /// The API base URL could not be parsed.
    #[error("invalid GitHub API base URL '{url}': {message}")]
    InvalidBaseUrl {
        /// The configured base URL.
        url: String,
        /// Parser message.
        message: String,
    },

    /// The token contains characters that cannot appear in an HTTP header.
    #[error("GitHub token is not a valid header value")]
    InvalidToken,

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// Builder failure, usually TLS backend initialisation.
        #[source]
        source: reqwest::Error,
    },
}
