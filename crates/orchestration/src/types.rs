//! Shared value types for the orchestration domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! values that participate in orchestration decisions: the argument bag passed
//! to remote calls, the run direction, and the failure policy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw, unconverted record as returned by the boundary client.
pub type RawRecord = Value;

/// A converted domain object (or list of them) as produced by a converter.
///
/// Domain objects travel through the invoker and cache in their canonical JSON
/// shape; strategies turn them into typed models with
/// [`crate::Invoker::invoke_as`].
pub type DomainValue = Value;

// ---------------------------------------------------------------------------
// Call arguments
// ---------------------------------------------------------------------------

/// The structured argument bag passed to a remote operation.
///
/// Keys are kept sorted so that the canonical serialisation used for default
/// cache keys is deterministic regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs(BTreeMap<String, Value>);

impl CallArgs {
    /// Creates an empty argument bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bag with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value stored under `key` if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns the value stored under `key` if it is an unsigned integer.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over the arguments in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns `true` if the bag holds no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical compact JSON rendering of the arguments, keys in sorted order.
    pub fn canonical_json(&self) -> String {
        let object: serde_json::Map<String, Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(object).to_string()
    }
}

// ---------------------------------------------------------------------------
// Run direction and policy
// ---------------------------------------------------------------------------

/// Which way data flows during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Remote → persisted storage.
    Save,
    /// Persisted storage → remote.
    Restore,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Save => write!(f, "save"),
            Direction::Restore => write!(f, "restore"),
        }
    }
}

/// What the orchestrator does when an entity (or a record inside one) fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and carry on with the next entity.
    #[default]
    ContinueOnError,
    /// Stop immediately; every remaining entity is reported as skipped.
    AbortOnError,
}

impl FailurePolicy {
    /// Returns `true` for [`FailurePolicy::AbortOnError`].
    pub fn aborts(self) -> bool {
        matches!(self, FailurePolicy::AbortOnError)
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continue" | "continue-on-error" => Ok(FailurePolicy::ContinueOnError),
            "abort" | "abort-on-error" => Ok(FailurePolicy::AbortOnError),
            other => Err(format!("unknown failure policy '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parses an RFC 3339 timestamp as emitted by the GitHub API.
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
