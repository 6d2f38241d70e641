//! The converter catalog.
//!
//! Converters turn raw boundary records into domain objects. They are looked
//! up by name rather than referenced directly, so a converter for one entity
//! can convert a nested sub-record of another entity (an issue's milestone,
//! say) through the catalog without the two entity modules depending on each
//! other.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::{ConversionError, DomainValue, RawRecord};

/// A pure raw-record → domain-object mapping.
///
/// The catalog is passed in so the converter can delegate nested records.
pub type ConvertFn =
    dyn Fn(&RawRecord, &ConverterCatalog) -> Result<DomainValue, ConversionError> + Send + Sync;

/// Name → converter lookup table.
#[derive(Clone, Default)]
pub struct ConverterCatalog {
    converters: BTreeMap<String, Arc<ConvertFn>>,
}

impl ConverterCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the catalog with `converter` registered under `name`.
    ///
    /// Registering a name twice replaces the earlier converter.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, converter: F) -> Self
    where
        F: Fn(&RawRecord, &ConverterCatalog) -> Result<DomainValue, ConversionError>
            + Send
            + Sync
            + 'static,
    {
        self.converters.insert(name.into(), Arc::new(converter));
        self
    }

    /// Returns `true` if a converter is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    /// Registered converter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().map(String::as_str)
    }

    /// Converts a single record with the converter registered as `name`.
    ///
    /// Failures are wrapped in [`ConversionError::InvalidRecord`] naming the
    /// converter, so nested failures read as a chain.
    pub fn convert(&self, name: &str, raw: &RawRecord) -> Result<DomainValue, ConversionError> {
        let converter =
            self.converters
                .get(name)
                .ok_or_else(|| ConversionError::UnknownConverter {
                    converter: name.to_string(),
                })?;
        converter(raw, self).map_err(|source| ConversionError::InvalidRecord {
            converter: name.to_string(),
            index: None,
            source: Box::new(source),
        })
    }

    /// Like [`ConverterCatalog::convert`], but maps an absent or `null`
    /// record to `None`.
    pub fn convert_optional(
        &self,
        name: &str,
        raw: Option<&RawRecord>,
    ) -> Result<Option<DomainValue>, ConversionError> {
        match raw {
            None | Some(Value::Null) => Ok(None),
            Some(record) => self.convert(name, record).map(Some),
        }
    }

    /// Converts a result that is either one record or a list of records.
    ///
    /// Lists are converted element-wise; a failing element is reported with
    /// its index.
    pub fn convert_result(
        &self,
        name: &str,
        raw: &RawRecord,
    ) -> Result<DomainValue, ConversionError> {
        match raw {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.convert(name, item).map_err(|e| e.at_index(i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            single => self.convert(name, single),
        }
    }

    /// Converts a result record by record, keeping each element's outcome.
    ///
    /// A list yields one entry per element; any other value yields a single
    /// entry. A rejected element does not affect its siblings.
    pub fn convert_each(
        &self,
        name: &str,
        raw: &RawRecord,
    ) -> Vec<Result<DomainValue, ConversionError>> {
        match raw {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.convert(name, item).map_err(|e| e.at_index(i)))
                .collect(),
            single => vec![self.convert(name, single)],
        }
    }
}

impl std::fmt::Debug for ConverterCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterCatalog")
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Field accessors for converter implementations
// ---------------------------------------------------------------------------

/// Returns `raw[field]`, treating `null` as absent.
pub fn field<'a>(raw: &'a RawRecord, field: &str) -> Option<&'a Value> {
    match raw.get(field) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value),
    }
}

/// Returns the required string field `field`.
pub fn required_str<'a>(raw: &'a RawRecord, name: &str) -> Result<&'a str, ConversionError> {
    match field(raw, name) {
        None => Err(ConversionError::MissingField {
            field: name.to_string(),
        }),
        Some(value) => value
            .as_str()
            .ok_or_else(|| ConversionError::invalid(name, "expected a string")),
    }
}

/// Returns the optional string field `field`.
pub fn optional_str<'a>(
    raw: &'a RawRecord,
    name: &str,
) -> Result<Option<&'a str>, ConversionError> {
    match field(raw, name) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ConversionError::invalid(name, "expected a string")),
    }
}

/// Returns the required unsigned integer field `field`.
pub fn required_u64(raw: &RawRecord, name: &str) -> Result<u64, ConversionError> {
    match field(raw, name) {
        None => Err(ConversionError::MissingField {
            field: name.to_string(),
        }),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| ConversionError::invalid(name, "expected an unsigned integer")),
    }
}

#[cfg(test)]
mod tests;
