//! In-crate fakes shared by the unit tests.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    BoundaryClient, CallArgs, DomainValue, EntityName, EntityStore, RawRecord, RemoteCallError,
    RemoteMethod, StorageError,
};

type Responder = Box<dyn Fn(&CallArgs) -> Result<RawRecord, RemoteCallError> + Send + Sync>;

enum Script {
    Fixed(Responder),
    Sequence(Mutex<VecDeque<Result<RawRecord, RemoteCallError>>>),
}

/// A boundary client with scripted responses that records every call.
///
/// Methods registered with [`FakeBoundary::supporting`] answer `null`.
#[derive(Default)]
pub(crate) struct FakeBoundary {
    methods: BTreeMap<String, Script>,
    calls: Mutex<Vec<(String, CallArgs)>>,
}

impl FakeBoundary {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn supporting<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for method in methods {
            self.methods
                .insert(method.into(), Script::Fixed(Box::new(|_| Ok(Value::Null))));
        }
        self
    }

    pub(crate) fn respond<F>(mut self, method: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<RawRecord, RemoteCallError> + Send + Sync + 'static,
    {
        self.methods
            .insert(method.into(), Script::Fixed(Box::new(responder)));
        self
    }

    /// Answers with `results` in order; the last one repeats once exhausted.
    pub(crate) fn respond_in_sequence(
        mut self,
        method: impl Into<String>,
        results: Vec<Result<RawRecord, RemoteCallError>>,
    ) -> Self {
        self.methods.insert(
            method.into(),
            Script::Sequence(Mutex::new(results.into_iter().collect())),
        );
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, CallArgs)> {
        self.calls.lock().clone()
    }

    pub(crate) fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl BoundaryClient for FakeBoundary {
    fn supports(&self, method: &RemoteMethod) -> bool {
        self.methods.contains_key(method.as_str())
    }

    async fn call(
        &self,
        method: &RemoteMethod,
        args: &CallArgs,
    ) -> Result<RawRecord, RemoteCallError> {
        self.calls
            .lock()
            .push((method.to_string(), args.clone()));
        // Lets concurrent callers interleave as they would over a network.
        tokio::task::yield_now().await;
        match self.methods.get(method.as_str()) {
            Some(Script::Fixed(responder)) => responder(args),
            Some(Script::Sequence(queue)) => {
                let mut queue = queue.lock();
                if queue.len() > 1 {
                    queue.pop_front().unwrap_or(Ok(Value::Null))
                } else {
                    queue.front().cloned().unwrap_or(Ok(Value::Null))
                }
            }
            None => Err(RemoteCallError::non_retryable(
                method.as_str(),
                "method not scripted",
            )),
        }
    }
}

/// An entity store holding collections in memory.
#[derive(Debug, Default)]
pub(crate) struct TestStore {
    collections: Mutex<BTreeMap<String, Vec<DomainValue>>>,
}

impl TestStore {
    pub(crate) fn collection(&self, entity: &str) -> Option<Vec<DomainValue>> {
        self.collections.lock().get(entity).cloned()
    }
}

#[async_trait]
impl EntityStore for TestStore {
    async fn write_entity_collection(
        &self,
        entity: &EntityName,
        objects: Vec<DomainValue>,
    ) -> Result<(), StorageError> {
        self.collections
            .lock()
            .insert(entity.to_string(), objects);
        Ok(())
    }

    async fn read_entity_collection(
        &self,
        entity: &EntityName,
    ) -> Result<Vec<DomainValue>, StorageError> {
        Ok(self
            .collections
            .lock()
            .get(entity.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

pub(crate) fn entity(name: &str) -> EntityName {
    EntityName::new(name).expect("test entity names are non-empty")
}
