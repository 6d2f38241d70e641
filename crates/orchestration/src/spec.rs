//! Operation declarations and their validated form.
//!
//! An entity declares each remote operation as a raw [`OperationDecl`]. The
//! registry turns every declaration into an immutable [`OperationSpec`] exactly
//! once at startup; a declaration that cannot be validated is a
//! [`SpecValidationError`] and the registry is never built.
//!
//! Validation runs in a fixed order and stops at the first problem:
//!
//! 1. `remote_method` is present and non-empty;
//! 2. the boundary client supports that method;
//! 3. `converter`, if declared, resolves in the converter catalog;
//! 4. `cache_key_template`, if declared, parses and only references declared
//!    arguments.

use crate::{
    BoundaryClient, CallArgs, ConverterCatalog, ConverterName, EntityName, OperationName,
    RemoteMethod, SpecField, SpecValidationError,
};

/// Operation name prefixes that mark an operation as a write.
///
/// Matched case-insensitively against the start of the operation name; the
/// first matching prefix wins.
pub const WRITE_PREFIXES: [&str; 4] = ["create", "update", "delete", "close"];

/// Returns the write prefix `name` starts with, if any.
pub fn write_prefix(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    WRITE_PREFIXES
        .iter()
        .copied()
        .find(|prefix| lower.starts_with(prefix))
}

/// Returns `true` if `name` is classified as a write operation by prefix.
pub fn is_write_name(name: &str) -> bool {
    write_prefix(name).is_some()
}

// ---------------------------------------------------------------------------
// Raw declaration
// ---------------------------------------------------------------------------

/// An operation as declared by an entity, before validation.
///
/// Every field is optional at this stage so that a missing or malformed value
/// can be reported precisely by [`OperationSpec::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationDecl {
    /// Boundary method to call.
    pub remote_method: Option<String>,
    /// Converter applied to the raw result.
    pub converter: Option<String>,
    /// Cache key template with `{argument}` placeholders.
    pub cache_key_template: Option<String>,
    /// Argument names the operation accepts.
    pub arguments: Vec<String>,
    /// Explicit write classification, overriding prefix detection.
    pub is_write_operation: Option<bool>,
    /// Explicit retry flag, overriding the read/write default.
    pub requires_retry: Option<bool>,
}

impl OperationDecl {
    /// Starts a declaration calling `remote_method`.
    pub fn calls(remote_method: impl Into<String>) -> Self {
        Self {
            remote_method: Some(remote_method.into()),
            ..Self::default()
        }
    }

    /// Converts results with the named catalog converter.
    #[must_use]
    pub fn converter(mut self, name: impl Into<String>) -> Self {
        self.converter = Some(name.into());
        self
    }

    /// Declares the accepted argument names.
    #[must_use]
    pub fn arguments<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = names.into_iter().map(Into::into).collect();
        self
    }

    /// Uses `template` instead of the default cache key.
    #[must_use]
    pub fn cache_key(mut self, template: impl Into<String>) -> Self {
        self.cache_key_template = Some(template.into());
        self
    }

    /// Overrides write detection.
    #[must_use]
    pub fn write(mut self, is_write: bool) -> Self {
        self.is_write_operation = Some(is_write);
        self
    }

    /// Overrides the retry default.
    #[must_use]
    pub fn retry(mut self, requires_retry: bool) -> Self {
        self.requires_retry = Some(requires_retry);
        self
    }
}

// ---------------------------------------------------------------------------
// Cache key templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed cache key template such as `"{owner}/{repo}:{state}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl CacheKeyTemplate {
    /// Parses `template`, rejecting unbalanced braces and empty placeholders.
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err("contains a nested '{'".to_string()),
                            other => field.push(other),
                        }
                    }
                    if !closed {
                        return Err("has an unclosed '{'".to_string());
                    }
                    let field = field.trim();
                    if field.is_empty() {
                        return Err("has an empty placeholder".to_string());
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field.to_string()));
                }
                '}' => return Err("has an unmatched '}'".to_string()),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Placeholder names in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(f) => Some(f.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitutes argument values into the template.
    ///
    /// Every value is inserted as compact JSON, so strings keep their quotes
    /// and `"1"` never renders like `1`. A missing argument renders as `null`,
    /// the same as an explicit `null`.
    pub fn render(&self, args: &CallArgs) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => match args.get(field) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => out.push_str("null"),
                },
            }
        }
        out
    }

    /// The template as declared.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

// ---------------------------------------------------------------------------
// Validated operation
// ---------------------------------------------------------------------------

/// A validated, immutable description of one remote operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    entity: EntityName,
    name: OperationName,
    remote_method: RemoteMethod,
    converter: Option<ConverterName>,
    cache_key_template: Option<CacheKeyTemplate>,
    arguments: Vec<String>,
    is_write_operation: bool,
    requires_retry: bool,
}

impl OperationSpec {
    /// Validates `decl`, declared as `name` by `entity`.
    ///
    /// Checks run in the order listed in the module documentation and the
    /// first failure is returned.
    pub fn validate(
        entity: &EntityName,
        name: &str,
        decl: &OperationDecl,
        boundary: &dyn BoundaryClient,
        catalog: &ConverterCatalog,
    ) -> Result<Self, SpecValidationError> {
        let fail = |field: SpecField, reason: String| SpecValidationError {
            entity: entity.to_string(),
            operation: name.to_string(),
            field,
            reason,
        };

        let operation = OperationName::new(name)
            .ok_or_else(|| fail(SpecField::Name, "must not be empty".to_string()))?;

        let remote_method = decl
            .remote_method
            .as_deref()
            .and_then(|m| RemoteMethod::new(m.trim()))
            .ok_or_else(|| fail(SpecField::RemoteMethod, "is required".to_string()))?;
        if !boundary.supports(&remote_method) {
            return Err(fail(
                SpecField::RemoteMethod,
                format!("'{remote_method}' is not supported by the boundary client"),
            ));
        }

        let converter = match decl.converter.as_deref() {
            None => None,
            Some(raw) => {
                let converter = ConverterName::new(raw)
                    .ok_or_else(|| fail(SpecField::Converter, "must not be empty".to_string()))?;
                if !catalog.contains(converter.as_str()) {
                    return Err(fail(
                        SpecField::Converter,
                        format!("'{converter}' is not in the converter catalog"),
                    ));
                }
                Some(converter)
            }
        };

        let cache_key_template = match decl.cache_key_template.as_deref() {
            None => None,
            Some(raw) => {
                let template = CacheKeyTemplate::parse(raw)
                    .map_err(|reason| fail(SpecField::CacheKeyTemplate, reason))?;
                if let Some(unknown) = template
                    .fields()
                    .find(|f| !decl.arguments.iter().any(|a| a == f))
                {
                    return Err(fail(
                        SpecField::CacheKeyTemplate,
                        format!("references undeclared argument '{unknown}'"),
                    ));
                }
                Some(template)
            }
        };

        let is_write_operation = decl
            .is_write_operation
            .unwrap_or_else(|| is_write_name(name));
        let requires_retry = decl.requires_retry.unwrap_or(!is_write_operation);

        Ok(Self {
            entity: entity.clone(),
            name: operation,
            remote_method,
            converter,
            cache_key_template,
            arguments: decl.arguments.clone(),
            is_write_operation,
            requires_retry,
        })
    }

    /// The entity that declared this operation.
    pub fn entity(&self) -> &EntityName {
        &self.entity
    }

    /// The registry key.
    pub fn name(&self) -> &OperationName {
        &self.name
    }

    /// The boundary method invoked.
    pub fn remote_method(&self) -> &RemoteMethod {
        &self.remote_method
    }

    /// The converter applied to results, if any.
    pub fn converter(&self) -> Option<&ConverterName> {
        self.converter.as_ref()
    }

    /// The declared cache key template, if any.
    pub fn cache_key_template(&self) -> Option<&CacheKeyTemplate> {
        self.cache_key_template.as_ref()
    }

    /// Declared argument names.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Writes are never cached.
    pub fn is_write_operation(&self) -> bool {
        self.is_write_operation
    }

    /// Whether retryable boundary failures are retried.
    pub fn requires_retry(&self) -> bool {
        self.requires_retry
    }

    /// The cache key for a call with `args`.
    ///
    /// The declared template is rendered when present; otherwise the canonical
    /// argument JSON is used. Either way the key is prefixed with the operation
    /// name so two operations never share an entry.
    pub fn cache_key(&self, args: &CallArgs) -> String {
        match &self.cache_key_template {
            Some(template) => format!("{}:{}", self.name, template.render(args)),
            None => format!("{}:{}", self.name, args.canonical_json()),
        }
    }
}
