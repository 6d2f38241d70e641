//! The cached, retrying operation invoker.
//!
//! `invoke(operation, args)` proceeds as follows:
//!
//! 1. Resolve the operation: an explicit override registered on this invoker
//!    wins; otherwise the registry entry is used. Unknown names fail with
//!    [`UnknownOperationError`] and are never retried.
//! 2. For reads, compute the cache key and return a cached value without any
//!    remote call on a hit.
//! 3. On a miss, or for any write, call the boundary, retrying retryable
//!    failures when the operation requires it (see [`RetryConfig`]).
//! 4. Apply the declared converter (identity when none is declared).
//! 5. For reads, store the converted value under the cache key.
//!
//! Values are cached only after a successful conversion, so a failed call or
//! a rejected record never leaves anything behind.
//!
//! [`Invoker::invoke_each`] follows the same steps but converts a list result
//! record by record, so strategies can count a rejected record as one failure
//! and carry on with the rest.
//!
//! The cache sits behind a mutex and the invoker is safe to share between
//! concurrent tasks. Two concurrent reads of the same key may both miss and
//! both call the boundary; there is no in-flight de-duplication.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    BoundaryClient, CallArgs, ConversionError, ConverterCatalog, DomainValue, InvokeError,
    OperationSpec, RawRecord, Registry, RetryConfig, UnknownOperationError,
};

/// A hand-written operation that bypasses the registry entry of the same name.
///
/// Overrides take full control of the call: they are neither cached nor
/// retried by the invoker.
#[async_trait]
pub trait ExplicitOperation: Send + Sync {
    /// Performs the operation and returns the converted result.
    async fn execute(&self, args: &CallArgs) -> Result<DomainValue, InvokeError>;
}

/// Counters describing one invoker's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokerStats {
    /// Calls to [`Invoker::invoke`].
    pub invocations: u64,
    /// Calls made to the boundary client, retries included.
    pub remote_calls: u64,
    /// Reads answered from the cache.
    pub cache_hits: u64,
    /// Boundary calls that were retries of an earlier failure.
    pub retries: u64,
}

enum Prepared<'a> {
    /// Answered by an override or the cache; already converted.
    Done(Arc<DomainValue>),
    /// Fetched from the boundary; still raw.
    Fetched {
        spec: &'a Arc<OperationSpec>,
        raw: RawRecord,
        cache_key: Option<String>,
    },
}

fn elements(value: &DomainValue) -> Vec<Result<DomainValue, ConversionError>> {
    match value {
        Value::Array(items) => items.iter().cloned().map(Ok).collect(),
        single => vec![Ok(single.clone())],
    }
}

fn decode_error<T>(e: serde_json::Error) -> ConversionError {
    ConversionError::Decode {
        target: std::any::type_name::<T>().to_string(),
        message: e.to_string(),
    }
}

enum Resolved<'a> {
    Explicit(&'a Arc<dyn ExplicitOperation>),
    Declared(&'a Arc<OperationSpec>),
}

/// Resolves, caches, retries and converts remote operations for one run.
pub struct Invoker {
    registry: Arc<Registry>,
    boundary: Arc<dyn BoundaryClient>,
    catalog: Arc<ConverterCatalog>,
    retry: RetryConfig,
    overrides: BTreeMap<String, Arc<dyn ExplicitOperation>>,
    cache: Mutex<HashMap<String, Arc<DomainValue>>>,
    invocations: AtomicU64,
    remote_calls: AtomicU64,
    cache_hits: AtomicU64,
    retries: AtomicU64,
}

impl Invoker {
    /// Creates an invoker with an empty cache.
    pub fn new(
        registry: Arc<Registry>,
        boundary: Arc<dyn BoundaryClient>,
        catalog: Arc<ConverterCatalog>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            registry,
            boundary,
            catalog,
            retry,
            overrides: BTreeMap::new(),
            cache: Mutex::new(HashMap::new()),
            invocations: AtomicU64::new(0),
            remote_calls: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Registers an explicit override for `operation`.
    #[must_use]
    pub fn with_override(
        mut self,
        operation: impl Into<String>,
        handler: Arc<dyn ExplicitOperation>,
    ) -> Self {
        self.overrides.insert(operation.into(), handler);
        self
    }

    /// Registers several overrides at once.
    #[must_use]
    pub fn with_overrides(
        mut self,
        overrides: impl IntoIterator<Item = (String, Arc<dyn ExplicitOperation>)>,
    ) -> Self {
        self.overrides.extend(overrides);
        self
    }

    fn resolve(&self, operation: &str) -> Result<Resolved<'_>, UnknownOperationError> {
        if let Some(handler) = self.overrides.get(operation) {
            return Ok(Resolved::Explicit(handler));
        }
        self.registry.resolve(operation).map(Resolved::Declared)
    }

    /// Invokes `operation` with `args` and returns the converted result.
    #[instrument(level = "debug", skip_all, fields(operation = %operation))]
    pub async fn invoke(
        &self,
        operation: &str,
        args: &CallArgs,
    ) -> Result<Arc<DomainValue>, InvokeError> {
        let (spec, raw, cache_key) = match self.prepare(operation, args).await? {
            Prepared::Done(value) => return Ok(value),
            Prepared::Fetched { spec, raw, cache_key } => (spec, raw, cache_key),
        };

        let converted = match spec.converter() {
            Some(converter) => self
                .catalog
                .convert_result(converter.as_str(), &raw)
                .map_err(|source| InvokeError::Conversion {
                    operation: operation.to_string(),
                    source,
                })?,
            None => raw,
        };
        let converted = Arc::new(converted);

        if let Some(key) = cache_key {
            self.cache.lock().insert(key, Arc::clone(&converted));
        }
        Ok(converted)
    }

    /// Invokes `operation` and converts its result record by record.
    ///
    /// A list result yields one entry per element, so a rejected record does
    /// not hide its siblings. The result is cached only when every record
    /// converted; a cached value is returned as all-`Ok` entries.
    #[instrument(level = "debug", skip_all, fields(operation = %operation))]
    pub async fn invoke_each(
        &self,
        operation: &str,
        args: &CallArgs,
    ) -> Result<Vec<Result<DomainValue, ConversionError>>, InvokeError> {
        let (spec, raw, cache_key) = match self.prepare(operation, args).await? {
            Prepared::Done(value) => return Ok(elements(&value)),
            Prepared::Fetched { spec, raw, cache_key } => (spec, raw, cache_key),
        };

        let converted = match spec.converter() {
            Some(converter) => self.catalog.convert_each(converter.as_str(), &raw),
            None => elements(&raw),
        };

        if let Some(key) = cache_key {
            if converted.iter().all(Result::is_ok) {
                let mut values = converted.iter().filter_map(|r| r.as_ref().ok().cloned());
                let value = if raw.is_array() {
                    Value::Array(values.collect())
                } else {
                    values.next().unwrap_or(Value::Null)
                };
                self.cache.lock().insert(key, Arc::new(value));
            }
        }
        Ok(converted)
    }

    /// Resolves `operation`, then answers from an override or the cache, or
    /// fetches the raw result from the boundary.
    async fn prepare<'a>(
        &'a self,
        operation: &str,
        args: &CallArgs,
    ) -> Result<Prepared<'a>, InvokeError> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let spec = match self.resolve(operation)? {
            Resolved::Explicit(handler) => {
                debug!("using explicit override");
                return handler.execute(args).await.map(|v| Prepared::Done(Arc::new(v)));
            }
            Resolved::Declared(spec) => spec,
        };

        let cache_key = (!spec.is_write_operation()).then(|| spec.cache_key(args));
        if let Some(key) = &cache_key {
            let hit = self.cache.lock().get(key).cloned();
            if let Some(value) = hit {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(cache_key = %key, "cache hit");
                return Ok(Prepared::Done(value));
            }
        }

        let (result, attempts) = self
            .retry
            .execute_with_retry(operation, spec.requires_retry(), || {
                self.remote_calls.fetch_add(1, Ordering::Relaxed);
                self.boundary.call(spec.remote_method(), args)
            })
            .await;
        if attempts > 1 {
            self.retries
                .fetch_add(u64::from(attempts - 1), Ordering::Relaxed);
        }

        let raw = result.map_err(|source| InvokeError::Remote {
            operation: operation.to_string(),
            attempts,
            source,
        })?;
        Ok(Prepared::Fetched {
            spec,
            raw,
            cache_key,
        })
    }

    /// Invokes `operation` and deserializes the converted result as `T`.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: &CallArgs,
    ) -> Result<T, InvokeError> {
        let value = self.invoke(operation, args).await?;
        T::deserialize(&*value).map_err(|e| InvokeError::Conversion {
            operation: operation.to_string(),
            source: decode_error::<T>(e),
        })
    }

    /// [`Invoker::invoke_each`] with every converted record deserialized as
    /// `T`.
    pub async fn invoke_each_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: &CallArgs,
    ) -> Result<Vec<Result<T, ConversionError>>, InvokeError> {
        let records = self.invoke_each(operation, args).await?;
        Ok(records
            .into_iter()
            .map(|record| record.and_then(|value| T::deserialize(value).map_err(decode_error::<T>)))
            .collect())
    }

    /// Drops every cached value.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Number of cached values.
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    /// Activity counters so far.
    pub fn stats(&self) -> InvokerStats {
        InvokerStats {
            invocations: self.invocations.load(Ordering::Relaxed),
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// The registry this invoker resolves against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("retry", &self.retry)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
