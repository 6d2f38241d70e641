//! GitHub REST boundary client.
//!
//! [`GithubClient`] implements [`orchestration::BoundaryClient`] over the
//! GitHub REST API. Remote methods such as `"issues.create"` resolve through a
//! fixed function table ([`endpoints`]) built when the client is constructed;
//! there is no dynamic lookup by name at call time.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Authentication, pagination and the mapping of HTTP
//! failures onto [`orchestration::RetryPolicy`] live here. The
//! [`orchestration`] crate never sees an HTTP status code except as data on a
//! [`orchestration::RemoteCallError`].
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | [`GithubClient`], [`GithubConfig`], response classification |
//! | [`endpoints`] | The remote method → endpoint table |
//! | [`errors`] | [`GithubError`] for client construction |

pub mod client;
pub mod endpoints;
pub mod errors;

pub use client::{GithubClient, GithubConfig};
pub use endpoints::{Endpoint, Verb};
pub use errors::GithubError;
