//! Error and retry-policy types for the orchestration layer.
//!
//! Errors fall into two classes with different propagation rules:
//!
//! - **Startup errors** ([`RegistryError`] and everything it wraps) describe a
//!   malformed declaration set. They are raised while building the registry and
//!   abort the process before any entity is processed.
//! - **Per-call errors** ([`InvokeError`], [`StorageError`], [`EntityError`])
//!   stop at the entity boundary and end up in that entity's
//!   [`crate::RunOutcome`] as an [`ErrorKind`] plus message.
//!
//! [`RetryPolicy`] is the cross-cutting retry contract: the boundary client
//! attaches one to every [`RemoteCallError`] and the invoker acts on it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Direction, EntityName};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// - `Retryable` errors: throttling, server errors, transient network failures.
/// - `NonRetryable` errors: authorization failures, missing resources,
///   validation rejections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from `Retry-After` or `x-ratelimit-reset` response headers).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Boundary errors
// ---------------------------------------------------------------------------

/// A failed call through the boundary client.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("remote call '{method}' failed: {message}")]
pub struct RemoteCallError {
    /// The remote method that was called.
    pub method: String,
    /// HTTP status, when the failure carried one.
    pub status: Option<u16>,
    /// Human-readable failure description.
    pub message: String,
    /// Whether the invoker may try again.
    pub retry: RetryPolicy,
}

impl RemoteCallError {
    /// A transient failure that may be retried on the caller's schedule.
    pub fn retryable(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            status: None,
            message: message.into(),
            retry: RetryPolicy::Retryable { after: None },
        }
    }

    /// A permanent failure.
    pub fn non_retryable(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            status: None,
            message: message.into(),
            retry: RetryPolicy::NonRetryable,
        }
    }

    /// Attaches the HTTP status that produced the failure.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the minimum delay before a retry. No-op for non-retryable errors.
    #[must_use]
    pub fn with_retry_after(mut self, after: Duration) -> Self {
        if let RetryPolicy::Retryable { after: slot } = &mut self.retry {
            *slot = Some(after);
        }
        self
    }

    /// Returns `true` if the invoker may retry this call.
    pub fn is_retryable(&self) -> bool {
        matches!(self.retry, RetryPolicy::Retryable { .. })
    }

    /// Server-requested minimum delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.retry {
            RetryPolicy::Retryable { after } => after,
            RetryPolicy::NonRetryable => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion errors
// ---------------------------------------------------------------------------

/// A converter could not turn a raw record into a domain object.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    /// A converter was looked up by a name the catalog does not know.
    #[error("unknown converter '{converter}'")]
    UnknownConverter {
        /// The name that failed to resolve.
        converter: String,
    },

    /// A required field was absent or null.
    #[error("missing field '{field}'")]
    MissingField {
        /// Field name within the raw record.
        field: String,
    },

    /// A field was present but had the wrong shape.
    #[error("invalid field '{field}': {message}")]
    InvalidField {
        /// Field name within the raw record.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// Context wrapper naming the converter (and element index) that failed.
    #[error("converter '{converter}' rejected {}: {source}", record_label(.index))]
    InvalidRecord {
        /// Converter that rejected the record.
        converter: String,
        /// Position within a list result, when the raw result was a list.
        index: Option<usize>,
        /// The underlying failure.
        #[source]
        source: Box<ConversionError>,
    },

    /// A converted value did not deserialize into the requested model type.
    #[error("cannot decode value as {target}: {message}")]
    Decode {
        /// Rust type name of the requested model.
        target: String,
        /// Decoder message.
        message: String,
    },
}

fn record_label(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("record #{i}"),
        None => "record".to_string(),
    }
}

impl ConversionError {
    /// Shorthand for [`ConversionError::InvalidField`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConversionError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Records the list position of the failing element on the outermost
    /// converter context.
    pub(crate) fn at_index(self, i: usize) -> Self {
        match self {
            ConversionError::InvalidRecord {
                converter, source, ..
            } => ConversionError::InvalidRecord {
                converter,
                index: Some(i),
                source,
            },
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Startup errors
// ---------------------------------------------------------------------------

/// The declaration field a [`SpecValidationError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecField {
    /// The operation name itself.
    Name,
    /// The remote method the operation calls.
    RemoteMethod,
    /// The converter applied to results.
    Converter,
    /// The cache key template.
    CacheKeyTemplate,
}

impl std::fmt::Display for SpecField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SpecField::Name => "name",
            SpecField::RemoteMethod => "remote_method",
            SpecField::Converter => "converter",
            SpecField::CacheKeyTemplate => "cache_key_template",
        };
        write!(f, "{label}")
    }
}

/// A malformed operation declaration.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid operation '{operation}' on entity '{entity}': {field} {reason}")]
pub struct SpecValidationError {
    /// Entity that declared the operation.
    pub entity: String,
    /// Operation name as declared.
    pub operation: String,
    /// The offending field.
    pub field: SpecField,
    /// What is wrong with it.
    pub reason: String,
}

/// The entity dependency relation contains a cycle.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("dependency cycle in {direction} order: {}", render_cycle(.members))]
pub struct DependencyCycleError {
    /// Cycle members, each depending on the next, starting from the smallest
    /// name.
    pub members: Vec<EntityName>,
    /// The direction whose graph contains the cycle.
    pub direction: Direction,
}

fn render_cycle(members: &[EntityName]) -> String {
    let mut parts: Vec<&str> = members.iter().map(EntityName::as_str).collect();
    if let Some(first) = members.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

/// Structural errors in the set of entity descriptors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    /// An entity was declared with an empty name.
    #[error("entity declared with an empty name")]
    EmptyEntityName,

    /// Two descriptors share a name.
    #[error("entity '{entity}' declared more than once")]
    DuplicateEntity {
        /// The repeated name.
        entity: String,
    },

    /// A dependency names an entity that was never declared.
    #[error("entity '{entity}' depends on undeclared entity '{dependency}'")]
    UnknownDependency {
        /// The declaring entity.
        entity: String,
        /// The missing dependency.
        dependency: String,
    },

    /// A run configuration enabled an entity that was never declared.
    #[error("entity '{entity}' is enabled but not declared")]
    UnknownEntity {
        /// The unknown name.
        entity: String,
    },

    /// The dependency relation is not a DAG.
    #[error(transparent)]
    Cycle(#[from] DependencyCycleError),
}

/// Any failure while building the [`crate::Registry`].
///
/// All variants are fatal: a registry is either fully valid or not built.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    /// An operation declaration failed validation.
    #[error(transparent)]
    SpecValidation(#[from] SpecValidationError),

    /// Two entities declared the same operation name with different targets.
    #[error(
        "operation '{operation}' declared by both '{first_entity}' and '{second_entity}' with different targets"
    )]
    DuplicateOperation {
        /// The colliding operation name.
        operation: String,
        /// Entity that declared it first, in declaration order.
        first_entity: String,
        /// Entity that declared it again.
        second_entity: String,
    },

    /// The entity graph is malformed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Per-call errors
// ---------------------------------------------------------------------------

/// A strategy referenced an operation name that was never declared.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("unknown operation '{operation}'")]
pub struct UnknownOperationError {
    /// The name that failed to resolve.
    pub operation: String,
}

/// Failure of a single [`crate::Invoker::invoke`] call.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The operation name resolved neither to an override nor a registry entry.
    #[error(transparent)]
    UnknownOperation(#[from] UnknownOperationError),

    /// The boundary call failed permanently or exhausted its retry budget.
    #[error("operation '{operation}' failed after {attempts} attempt(s): {source}")]
    Remote {
        /// Operation being invoked.
        operation: String,
        /// Number of boundary calls made.
        attempts: u32,
        /// Last error returned by the boundary.
        #[source]
        source: RemoteCallError,
    },

    /// The declared converter rejected the raw result.
    #[error("operation '{operation}' returned an unconvertible result: {source}")]
    Conversion {
        /// Operation being invoked.
        operation: String,
        /// Converter failure.
        #[source]
        source: ConversionError,
    },
}

impl InvokeError {
    /// Classifies the error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvokeError::UnknownOperation(_) => ErrorKind::UnknownOperation,
            InvokeError::Remote { source, .. } if source.is_retryable() => {
                ErrorKind::RemoteRetryable
            }
            InvokeError::Remote { .. } => ErrorKind::RemoteNonRetryable,
            InvokeError::Conversion { .. } => ErrorKind::Conversion,
        }
    }
}

/// Failure reading or writing a persisted entity collection.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("storage I/O failed for entity '{entity}': {source}")]
    Io {
        /// Entity whose collection was being accessed.
        entity: String,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The collection could not be encoded or decoded.
    #[error("storage format error for entity '{entity}': {source}")]
    Format {
        /// Entity whose collection was being accessed.
        entity: String,
        /// Serialisation failure.
        #[source]
        source: serde_json::Error,
    },
}

/// A record inside an entity that failed while siblings were still processed.
#[derive(Debug)]
pub struct RecordFailure {
    /// Human-readable record label (e.g. `"milestone 'v1'"`).
    pub record: String,
    /// Why it failed.
    pub error: EntityError,
}

fn failure_summary(total: &usize, failures: &[RecordFailure]) -> String {
    match failures.first() {
        Some(first) => format!(
            "{} of {total} record(s) failed; first: {}: {}",
            failures.len(),
            first.record,
            first.error
        ),
        None => format!("0 of {total} record(s) failed"),
    }
}

/// Failure of an entity strategy; becomes a Failed [`crate::RunOutcome`].
#[derive(Debug, Error)]
pub enum EntityError {
    /// A remote operation failed.
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// Persisted storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A persisted or converted record did not have the expected shape.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Some records failed; the rest were processed.
    #[error("{}", failure_summary(.total, .failures))]
    Records {
        /// Records attempted.
        total: usize,
        /// Records processed successfully.
        processed: usize,
        /// Every failure, in processing order. Never empty.
        failures: Vec<RecordFailure>,
    },

    /// No strategy is registered for an enabled entity.
    #[error("no {direction} strategy registered for entity '{entity}'")]
    MissingStrategy {
        /// The entity lacking a strategy.
        entity: EntityName,
        /// The requested direction.
        direction: Direction,
    },
}

impl EntityError {
    /// Classifies the error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EntityError::Invoke(e) => e.kind(),
            EntityError::Storage(_) => ErrorKind::Storage,
            EntityError::Conversion(_) => ErrorKind::Conversion,
            EntityError::Records { .. } => ErrorKind::RecordFailures,
            EntityError::MissingStrategy { .. } => ErrorKind::MissingStrategy,
        }
    }

    /// Records that were processed successfully before (or despite) the error.
    pub fn processed(&self) -> usize {
        match self {
            EntityError::Records { processed, .. } => *processed,
            _ => 0,
        }
    }
}

/// Report-level classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A strategy referenced an undeclared operation.
    UnknownOperation,
    /// A transient remote failure outlasted the retry budget.
    RemoteRetryable,
    /// A permanent remote failure.
    RemoteNonRetryable,
    /// A converter or decoder rejected a record.
    Conversion,
    /// Persisted storage failed.
    Storage,
    /// Individual records failed inside an otherwise processed entity.
    RecordFailures,
    /// No strategy was registered for the entity.
    MissingStrategy,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::UnknownOperation => "unknown_operation",
            ErrorKind::RemoteRetryable => "remote_retryable",
            ErrorKind::RemoteNonRetryable => "remote_non_retryable",
            ErrorKind::Conversion => "conversion",
            ErrorKind::Storage => "storage",
            ErrorKind::RecordFailures => "record_failures",
            ErrorKind::MissingStrategy => "missing_strategy",
        };
        write!(f, "{label}")
    }
}
