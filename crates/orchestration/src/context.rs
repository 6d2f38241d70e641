//! Per-run state handed to entity strategies.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::{
    CallArgs, Direction, EntityError, EntityStore, FailurePolicy, Invoker, RecordFailure,
    RepositoryId, RunId,
};

/// Everything a strategy may use during one run.
///
/// A fresh context (and with it a fresh invoker cache and id map) is created
/// for every run and dropped when the run ends.
pub struct RunContext {
    run_id: RunId,
    direction: Direction,
    repository: RepositoryId,
    policy: FailurePolicy,
    invoker: Invoker,
    store: Arc<dyn EntityStore>,
    ids: IdMap,
}

impl RunContext {
    /// Creates the context for a new run.
    pub fn new(
        run_id: RunId,
        direction: Direction,
        repository: RepositoryId,
        policy: FailurePolicy,
        invoker: Invoker,
        store: Arc<dyn EntityStore>,
    ) -> Self {
        Self {
            run_id,
            direction,
            repository,
            policy,
            invoker,
            store,
            ids: IdMap::default(),
        }
    }

    /// Identifier of this run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Whether this run saves or restores.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The repository being backed up or restored into.
    pub fn repository(&self) -> &RepositoryId {
        &self.repository
    }

    /// The run's failure policy.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// The run's invoker.
    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// Persisted storage.
    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    /// Cross-entity id remapping recorded during restore.
    pub fn ids(&self) -> &IdMap {
        &self.ids
    }

    /// `owner` and `repo` arguments for the run's repository.
    pub fn repo_args(&self) -> CallArgs {
        CallArgs::new()
            .with("owner", self.repository.owner())
            .with("repo", self.repository.name())
    }

    /// A record tally honouring the run's failure policy.
    pub fn tally(&self) -> RecordTally {
        RecordTally::new(self.policy)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("direction", &self.direction)
            .field("repository", &self.repository)
            .field("policy", &self.policy)
            .field("invoker", &self.invoker)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Id remapping
// ---------------------------------------------------------------------------

/// Maps ids from the backup to the ids assigned when records were recreated.
///
/// Restoring a milestone yields a new milestone number; issues restored later
/// look the old number up here. A missing entry means the referenced record
/// was not restored and the reference should be dropped.
#[derive(Debug, Default)]
pub struct IdMap {
    entries: Mutex<HashMap<(String, u64), u64>>,
}

impl IdMap {
    /// Records that `entity` record `old` now lives at `new`.
    pub fn record(&self, entity: &str, old: u64, new: u64) {
        self.entries.lock().insert((entity.to_string(), old), new);
    }

    /// The new id of `entity` record `old`, if it was restored.
    pub fn lookup(&self, entity: &str, old: u64) -> Option<u64> {
        self.entries.lock().get(&(entity.to_string(), old)).copied()
    }

    /// Number of recorded mappings.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Per-record failure accounting
// ---------------------------------------------------------------------------

/// Counts processed and failed records inside one entity.
///
/// Under [`FailurePolicy::ContinueOnError`] a failed record is logged and the
/// strategy moves on to its siblings; under [`FailurePolicy::AbortOnError`]
/// [`RecordTally::failed`] returns [`ControlFlow::Break`] and the strategy
/// stops.
#[derive(Debug)]
pub struct RecordTally {
    policy: FailurePolicy,
    total: usize,
    processed: usize,
    failures: Vec<RecordFailure>,
}

impl RecordTally {
    /// Creates an empty tally.
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            total: 0,
            processed: 0,
            failures: Vec::new(),
        }
    }

    /// Counts a successfully processed record.
    pub fn succeeded(&mut self) {
        self.total += 1;
        self.processed += 1;
    }

    /// Counts `count` successfully processed records.
    pub fn succeeded_many(&mut self, count: usize) {
        self.total += count;
        self.processed += count;
    }

    /// Counts a failed record and says whether to continue with its siblings.
    pub fn failed(
        &mut self,
        record: impl Into<String>,
        error: impl Into<EntityError>,
    ) -> ControlFlow<()> {
        let record = record.into();
        let error = error.into();
        warn!(%record, kind = %error.kind(), %error, "record failed");
        self.total += 1;
        self.failures.push(RecordFailure { record, error });
        if self.policy.aborts() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Records processed successfully so far.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// The processed count, or [`EntityError::Records`] if anything failed.
    pub fn finish(self) -> Result<usize, EntityError> {
        if self.failures.is_empty() {
            Ok(self.processed)
        } else {
            Err(EntityError::Records {
                total: self.total,
                processed: self.processed,
                failures: self.failures,
            })
        }
    }
}
