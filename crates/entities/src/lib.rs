//! Built-in backup entities.
//!
//! Each entity module supplies three things:
//!
//! - a `descriptor()` declaring the entity's dependencies and remote
//!   operations as data,
//! - a converter registered in [`converter_catalog`],
//! - an [`orchestration::EntityStrategy`] implementing save and restore.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Strategies sequence invoker calls and store
//! reads/writes. They never talk HTTP or touch the file system directly; the
//! [`orchestration`] crate hands them everything through
//! [`orchestration::RunContext`].
//!
//! ## Entities
//!
//! | Entity | Save after | Restore after |
//! |--------|------------|---------------|
//! | [`label`] | | |
//! | [`milestone`] | | |
//! | [`issue`] | label, milestone | label, milestone |
//! | [`pull_request`] | label, milestone | issue, label, milestone |
//! | [`comment`] | issue, pull_request | issue, pull_request |

use std::sync::Arc;

use orchestration::{
    CallArgs, ConversionError, ConverterCatalog, EntityDescriptor, EntityError, EntityName,
    EntityStrategy, RecordTally, RunContext, StrategyProvider,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

pub mod comment;
pub mod issue;
pub mod label;
pub mod milestone;
pub mod model;
pub mod pull_request;

#[cfg(test)]
pub(crate) mod test_support;

pub use comment::CommentStrategy;
pub use issue::IssueStrategy;
pub use label::LabelStrategy;
pub use milestone::MilestoneStrategy;
pub use model::{Comment, Issue, Label, Milestone, PullRequest, State, User};
pub use pull_request::PullRequestStrategy;

/// Declarations for every built-in entity.
pub fn descriptors() -> Vec<EntityDescriptor> {
    vec![
        label::descriptor(),
        milestone::descriptor(),
        issue::descriptor(),
        pull_request::descriptor(),
        comment::descriptor(),
    ]
}

/// Converters for every built-in entity plus the shared `user` converter.
pub fn converter_catalog() -> ConverterCatalog {
    ConverterCatalog::new()
        .with("label", label::convert)
        .with("milestone", milestone::convert)
        .with("issue", issue::convert)
        .with("pull_request", pull_request::convert)
        .with("comment", comment::convert)
        .with("user", model::convert_user)
}

/// Strategy lookup for the built-in entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinStrategies;

impl StrategyProvider for BuiltinStrategies {
    fn strategy(&self, entity: &EntityName) -> Option<Arc<dyn EntityStrategy>> {
        let name = entity.clone();
        let strategy: Arc<dyn EntityStrategy> = match entity.as_str() {
            label::ENTITY => Arc::new(LabelStrategy::new(name)),
            milestone::ENTITY => Arc::new(MilestoneStrategy::new(name)),
            issue::ENTITY => Arc::new(IssueStrategy::new(name)),
            pull_request::ENTITY => Arc::new(PullRequestStrategy::new(name)),
            comment::ENTITY => Arc::new(CommentStrategy::new(name)),
            _ => return None,
        };
        Some(strategy)
    }
}

// ---------------------------------------------------------------------------
// Shared strategy helpers
// ---------------------------------------------------------------------------

/// Repository arguments plus `state=all`, for listings that default to open
/// records only.
pub(crate) fn list_args(ctx: &RunContext) -> CallArgs {
    ctx.repo_args().with("state", "all")
}

/// Keeps the records that converted and counts the rest as failed.
///
/// Returns `None` once the tally's policy says to stop.
pub(crate) fn accept_records<T>(
    tally: &mut RecordTally,
    entity: &EntityName,
    records: Vec<Result<T, ConversionError>>,
) -> Option<Vec<T>> {
    let mut accepted = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match record {
            Ok(record) => accepted.push(record),
            Err(error) => {
                if tally
                    .failed(format!("{entity} record {index}"), error)
                    .is_break()
                {
                    return None;
                }
            }
        }
    }
    Some(accepted)
}

/// Lists `operation`, keeps the records `keep` selects, and saves them.
///
/// Records that do not convert are counted as failed; under
/// continue-on-error the rest are still saved.
pub(crate) async fn save_listing<T>(
    ctx: &RunContext,
    entity: &EntityName,
    operation: &str,
    args: &CallArgs,
    keep: impl Fn(&T) -> bool,
) -> Result<usize, EntityError>
where
    T: DeserializeOwned + Serialize + Sync,
{
    let mut tally = ctx.tally();
    let listed = ctx.invoker().invoke_each_as::<T>(operation, args).await?;
    let Some(records) = accept_records(&mut tally, entity, listed) else {
        return tally.finish();
    };
    let records: Vec<T> = records.into_iter().filter(|r| keep(r)).collect();
    let saved = save_collection(ctx, entity, &records).await?;
    tally.succeeded_many(saved);
    tally.finish()
}

/// Reads the stored collection for `entity`, counting records that do not
/// decode as failed.
///
/// Returns `None` once the tally's policy says to stop.
pub(crate) async fn read_stored<T: DeserializeOwned>(
    ctx: &RunContext,
    entity: &EntityName,
    tally: &mut RecordTally,
) -> Result<Option<Vec<T>>, EntityError> {
    let values = ctx.store().read_entity_collection(entity).await?;
    Ok(accept_records(tally, entity, model::decode_each(values)))
}

/// Records already present remotely, for restore's existence checks.
///
/// A remote record that does not convert cannot be matched and is ignored.
pub(crate) async fn list_existing<T: DeserializeOwned>(
    ctx: &RunContext,
    operation: &str,
    args: &CallArgs,
) -> Result<Vec<T>, EntityError> {
    let listed = ctx.invoker().invoke_each_as::<T>(operation, args).await?;
    Ok(listed
        .into_iter()
        .filter_map(|record| {
            record
                .map_err(|error| warn!(operation, %error, "ignoring unconvertible remote record"))
                .ok()
        })
        .collect())
}

/// Encodes `items` and replaces the stored collection for `entity`.
pub(crate) async fn save_collection<T: Serialize + Sync>(
    ctx: &RunContext,
    entity: &EntityName,
    items: &[T],
) -> Result<usize, EntityError> {
    let values = items
        .iter()
        .map(model::encode)
        .collect::<Result<Vec<_>, _>>()?;
    let count = values.len();
    ctx.store().write_entity_collection(entity, values).await?;
    info!(%entity, count, "collection saved");
    Ok(count)
}
