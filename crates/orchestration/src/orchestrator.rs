//! The save/restore orchestrator.
//!
//! A run moves through these states:
//!
//! ```text
//! Pending ─► Running(entity) ─► Succeeded(entity) | Failed(entity) ─► next entity …
//!                                                                   └► Completed | Aborted
//! ```
//!
//! Entities are processed strictly one after another in dependency order.
//! Under [`FailurePolicy::ContinueOnError`] a failed entity is recorded and the
//! run moves on; entities that depend on it are still attempted and are
//! expected to degrade gracefully (e.g. restore an issue without its
//! milestone). Under [`FailurePolicy::AbortOnError`] the first failure ends the
//! run and every remaining entity is reported as skipped. A cancellation is
//! honoured between entities in the same way.
//!
//! Whole entities are never retried; retries happen per call inside the
//! [`Invoker`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    BoundaryClient, ConverterCatalog, Direction, EntityError, EntityName, EntityStore,
    ExplicitOperation, FailurePolicy, GraphError, Invoker, Registry, RegistryError, RepositoryId,
    RetryConfig, RunContext, RunId, RunOutcome, RunReport, RunState, StrategyProvider, Timestamp,
};

/// Plain configuration values for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Repository to back up or restore into.
    pub repository: RepositoryId,
    /// What to do when an entity fails.
    pub policy: FailurePolicy,
    /// Retry budget for boundary calls.
    pub retry: RetryConfig,
    /// Entities to process; `None` means all declared entities.
    pub enabled: Option<BTreeSet<String>>,
}

impl RunConfig {
    /// A configuration processing every entity with default policy and retry.
    pub fn new(repository: RepositoryId) -> Self {
        Self {
            repository,
            policy: FailurePolicy::default(),
            retry: RetryConfig::default(),
            enabled: None,
        }
    }
}

/// Sequences entity strategies over the dependency order.
pub struct Orchestrator {
    registry: Arc<Registry>,
    boundary: Arc<dyn BoundaryClient>,
    catalog: Arc<ConverterCatalog>,
    store: Arc<dyn EntityStore>,
    config: RunConfig,
    overrides: Vec<(String, Arc<dyn ExplicitOperation>)>,
}

impl Orchestrator {
    /// Creates an orchestrator.
    ///
    /// # Errors
    ///
    /// Fails if `config.enabled` names an entity the registry does not know.
    pub fn new(
        registry: Arc<Registry>,
        boundary: Arc<dyn BoundaryClient>,
        catalog: Arc<ConverterCatalog>,
        store: Arc<dyn EntityStore>,
        config: RunConfig,
    ) -> Result<Self, RegistryError> {
        if let Some(enabled) = &config.enabled {
            if let Some(unknown) = enabled.iter().find(|e| !registry.graph().contains(e.as_str())) {
                return Err(GraphError::UnknownEntity {
                    entity: unknown.clone(),
                }
                .into());
            }
        }
        Ok(Self {
            registry,
            boundary,
            catalog,
            store,
            config,
            overrides: Vec::new(),
        })
    }

    /// Registers an explicit operation override installed on every run's
    /// invoker.
    #[must_use]
    pub fn with_override(
        mut self,
        operation: impl Into<String>,
        handler: Arc<dyn ExplicitOperation>,
    ) -> Self {
        self.overrides.push((operation.into(), handler));
        self
    }

    /// The run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The enabled entities in processing order for `direction`.
    pub fn plan(&self, direction: Direction) -> Vec<EntityName> {
        self.registry
            .graph()
            .order(direction)
            .iter()
            .filter(|entity| match &self.config.enabled {
                Some(enabled) => enabled.contains(entity.as_str()),
                None => true,
            })
            .cloned()
            .collect()
    }

    fn new_context(&self, run_id: RunId, direction: Direction) -> RunContext {
        let invoker = Invoker::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.boundary),
            Arc::clone(&self.catalog),
            self.config.retry,
        )
        .with_overrides(self.overrides.iter().cloned());

        RunContext::new(
            run_id,
            direction,
            self.config.repository.clone(),
            self.config.policy,
            invoker,
            Arc::clone(&self.store),
        )
    }

    /// Runs every enabled entity's strategy for `direction`.
    ///
    /// Always returns a report; per-entity errors are captured in the
    /// outcomes, never propagated.
    pub async fn run(
        &self,
        direction: Direction,
        strategies: &dyn StrategyProvider,
        cancel: &CancellationToken,
    ) -> RunReport {
        let run_id = RunId::new_random();
        let span = info_span!(
            "run",
            %run_id,
            %direction,
            repository = %self.config.repository,
        );
        self.run_inner(run_id, direction, strategies, cancel)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: RunId,
        direction: Direction,
        strategies: &dyn StrategyProvider,
        cancel: &CancellationToken,
    ) -> RunReport {
        let started_at = Timestamp::now();
        let order = self.plan(direction);
        let policy = self.config.policy;
        info!(entities = order.len(), ?policy, "run started");

        let ctx = self.new_context(run_id, direction);
        let mut outcomes = Vec::with_capacity(order.len());
        let mut state = RunState::Completed;
        let mut remaining = order.into_iter();

        for entity in remaining.by_ref() {
            if cancel.is_cancelled() {
                warn!(next = %entity, "run cancelled");
                outcomes.push(RunOutcome::skipped(entity));
                state = RunState::Aborted;
                break;
            }

            let outcome = self
                .run_entity(&entity, direction, strategies, &ctx)
                .instrument(info_span!("entity", entity = %entity))
                .await;
            let failed = outcome.is_failed();
            outcomes.push(outcome);

            if failed && policy.aborts() {
                warn!(%entity, "aborting run after entity failure");
                state = RunState::Aborted;
                break;
            }
        }
        outcomes.extend(remaining.map(RunOutcome::skipped));

        let stats = ctx.invoker().stats();
        ctx.invoker().clear_cache();
        let report = RunReport {
            run_id,
            direction,
            state,
            outcomes,
            stats,
            started_at,
            finished_at: Timestamp::now(),
        };

        info!(
            %state,
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            skipped = report.skipped().count(),
            remote_calls = stats.remote_calls,
            cache_hits = stats.cache_hits,
            retries = stats.retries,
            "run finished"
        );
        report
    }

    async fn run_entity(
        &self,
        entity: &EntityName,
        direction: Direction,
        strategies: &dyn StrategyProvider,
        ctx: &RunContext,
    ) -> RunOutcome {
        let Some(strategy) = strategies.strategy(entity) else {
            let error = EntityError::MissingStrategy {
                entity: entity.clone(),
                direction,
            };
            error!(%error, "entity failed");
            return RunOutcome::failed(entity.clone(), &error);
        };

        info!("entity started");
        let started = Instant::now();
        let result = match direction {
            Direction::Save => strategy.save(ctx).await,
            Direction::Restore => strategy.restore(ctx).await,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(items) => {
                info!(items, elapsed_ms, "entity succeeded");
                RunOutcome::succeeded(entity.clone(), items)
            }
            Err(error) => {
                error!(kind = %error.kind(), %error, elapsed_ms, "entity failed");
                RunOutcome::failed(entity.clone(), &error)
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("entities", &self.registry.graph().len())
            .finish_non_exhaustive()
    }
}
