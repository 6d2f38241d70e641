//! Port traits implemented by infrastructure and entity crates.
//!
//! This crate defines *what* it needs from the outside world; the `github`,
//! `store` and `entities` crates define *how* to supply it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    CallArgs, DomainValue, EntityError, EntityName, RawRecord, RemoteCallError, RemoteMethod,
    RunContext, StorageError,
};

/// The external collaborator through which remote calls are made.
///
/// Implementations expose a fixed set of named methods. The registry checks
/// every declared `remote_method` against [`BoundaryClient::supports`] once at
/// startup, so [`BoundaryClient::call`] is only ever invoked with supported
/// names.
#[async_trait]
pub trait BoundaryClient: Send + Sync {
    /// Returns `true` if `method` can be called.
    fn supports(&self, method: &RemoteMethod) -> bool;

    /// Calls `method` with `args` and returns the raw, unconverted result.
    async fn call(
        &self,
        method: &RemoteMethod,
        args: &CallArgs,
    ) -> Result<RawRecord, RemoteCallError>;
}

/// Persisted form of entity collections.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Replaces the stored collection for `entity`.
    async fn write_entity_collection(
        &self,
        entity: &EntityName,
        objects: Vec<DomainValue>,
    ) -> Result<(), StorageError>;

    /// Reads the stored collection for `entity`.
    ///
    /// An entity that was never written yields an empty collection.
    async fn read_entity_collection(
        &self,
        entity: &EntityName,
    ) -> Result<Vec<DomainValue>, StorageError>;
}

/// Entity-specific save and restore logic.
///
/// Both methods return the number of records processed. Individual record
/// failures are reported through [`crate::RecordTally`] so the run's
/// [`crate::FailurePolicy`] decides whether siblings still proceed.
#[async_trait]
pub trait EntityStrategy: Send + Sync {
    /// Reads from the remote side via the invoker and writes persisted storage.
    async fn save(&self, ctx: &RunContext) -> Result<usize, EntityError>;

    /// Reads persisted storage and writes to the remote side via the invoker.
    async fn restore(&self, ctx: &RunContext) -> Result<usize, EntityError>;
}

/// Looks up the strategy for an entity.
pub trait StrategyProvider: Send + Sync {
    /// The strategy for `entity`, if one is registered.
    fn strategy(&self, entity: &EntityName) -> Option<Arc<dyn EntityStrategy>>;
}

impl StrategyProvider for BTreeMap<EntityName, Arc<dyn EntityStrategy>> {
    fn strategy(&self, entity: &EntityName) -> Option<Arc<dyn EntityStrategy>> {
        self.get(entity).cloned()
    }
}

impl StrategyProvider for HashMap<EntityName, Arc<dyn EntityStrategy>> {
    fn strategy(&self, entity: &EntityName) -> Option<Arc<dyn EntityStrategy>> {
        self.get(entity).cloned()
    }
}
