//! Declarative operation orchestration for repository backup and restore.
//!
//! Entity kinds (labels, milestones, issues, ...) declare their remote
//! operations as data. This crate validates those declarations once at
//! startup, invokes them through a cached and retrying [`Invoker`], and
//! sequences per-entity save/restore strategies over a dependency graph.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no I/O of its
//! own. The boundary client, persisted storage and the entity strategies are
//! supplied through the traits in [`ports`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`EntityName`, `OperationName`, `RunId`, etc.) |
//! | [`types`] | Shared value types (`CallArgs`, `Direction`, `FailurePolicy`, `Timestamp`) |
//! | [`errors`] | Startup and per-call error types, `RetryPolicy` |
//! | [`spec`] | Operation declarations, validation, cache-key templates |
//! | [`descriptor`] | `EntityDescriptor`: an entity's dependencies and operations |
//! | [`convert`] | `ConverterCatalog` and field-extraction helpers |
//! | [`graph`] | `EntityGraph`: deterministic save and restore orders |
//! | [`registry`] | `Registry`: validated operation table |
//! | [`retry`] | `RetryConfig`: bounded exponential backoff |
//! | [`ports`] | `BoundaryClient`, `EntityStore`, `EntityStrategy` traits |
//! | [`invoker`] | `Invoker`: resolve, cache, retry, convert |
//! | [`context`] | `RunContext`, id remapping, per-record failure tally |
//! | [`outcome`] | `RunOutcome` and `RunReport` |
//! | [`orchestrator`] | `Orchestrator`: runs strategies in dependency order |

pub mod context;
pub mod convert;
pub mod descriptor;
pub mod errors;
pub mod graph;
pub mod identifiers;
pub mod invoker;
pub mod orchestrator;
pub mod outcome;
pub mod ports;
pub mod registry;
pub mod retry;
pub mod spec;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use context::{IdMap, RecordTally, RunContext};
pub use convert::{ConvertFn, ConverterCatalog};
pub use descriptor::EntityDescriptor;
pub use errors::{
    ConversionError, DependencyCycleError, EntityError, ErrorKind, GraphError, InvokeError,
    RecordFailure, RegistryError, RemoteCallError, RetryPolicy, SpecField, SpecValidationError,
    StorageError, UnknownOperationError,
};
pub use graph::{build_order, EntityGraph};
pub use identifiers::{
    CommentId, ConverterName, EntityName, IssueNumber, MilestoneNumber, OperationName,
    RemoteMethod, RepositoryId, RunId,
};
pub use invoker::{ExplicitOperation, Invoker, InvokerStats};
pub use orchestrator::{Orchestrator, RunConfig};
pub use outcome::{ErrorSummary, OutcomeStatus, RunOutcome, RunReport, RunState};
pub use ports::{BoundaryClient, EntityStore, EntityStrategy, StrategyProvider};
pub use registry::Registry;
pub use retry::RetryConfig;
pub use spec::{is_write_name, write_prefix, CacheKeyTemplate, OperationDecl, OperationSpec};
pub use types::{CallArgs, Direction, DomainValue, FailurePolicy, RawRecord, Timestamp};
