use std::collections::BTreeMap;

use async_trait::async_trait;
use orchestration::{DomainValue, EntityName, EntityStore, StorageError};
use parking_lot::Mutex;

/// Keeps entity collections in memory for the lifetime of the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Vec<DomainValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the collection for `entity` directly.
    pub fn insert(&self, entity: &str, objects: Vec<DomainValue>) {
        self.collections.lock().insert(entity.to_string(), objects);
    }

    /// The collection stored for `entity`, if it was ever written.
    pub fn collection(&self, entity: &str) -> Option<Vec<DomainValue>> {
        self.collections.lock().get(entity).cloned()
    }

    /// Names of every stored collection.
    pub fn entities(&self) -> Vec<String> {
        self.collections.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn write_entity_collection(
        &self,
        entity: &EntityName,
        objects: Vec<DomainValue>,
    ) -> Result<(), StorageError> {
        self.insert(entity.as_str(), objects);
        Ok(())
    }

    async fn read_entity_collection(
        &self,
        entity: &EntityName,
    ) -> Result<Vec<DomainValue>, StorageError> {
        Ok(self.collection(entity.as_str()).unwrap_or_default())
    }
}
