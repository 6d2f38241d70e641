//! Domain models for the built-in entities.
//!
//! Converters build these from raw GitHub records and emit them as JSON;
//! strategies decode them back with [`orchestration::Invoker::invoke_each_as`]
//! or [`decode_each`]. The JSON shape of each model is also its persisted
//! form.

use orchestration::convert::field;
use orchestration::{
    CommentId, ConversionError, ConverterCatalog, DomainValue, IssueNumber, MilestoneNumber,
    RawRecord,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Open/closed state shared by milestones, issues and pull requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Open,
    Closed,
}

impl State {
    pub fn is_closed(self) -> bool {
        self == State::Closed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Open => "open",
            State::Closed => "closed",
        }
    }
}

/// A GitHub account, reduced to its login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: MilestoneNumber,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub state: State,
    /// RFC 3339 due date, kept verbatim.
    #[serde(default)]
    pub due_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: IssueNumber,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: State,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub milestone: Option<Milestone>,
    #[serde(default)]
    pub user: Option<User>,
    /// GitHub's issues listing also returns pull requests; those carry this
    /// flag and are left to the `pull_request` entity.
    #[serde(default)]
    pub is_pull_request: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: IssueNumber,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: State,
    /// Source branch name.
    pub head: String,
    /// Target branch name.
    pub base: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub milestone: Option<Milestone>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    /// Number of the issue or pull request the comment belongs to.
    pub issue_number: IssueNumber,
    pub body: String,
    #[serde(default)]
    pub user: Option<User>,
}

// ---------------------------------------------------------------------------
// Codec helpers for converters and strategies
// ---------------------------------------------------------------------------

pub(crate) fn encode<T: Serialize>(model: &T) -> Result<DomainValue, ConversionError> {
    serde_json::to_value(model).map_err(|e| ConversionError::Decode {
        target: std::any::type_name::<T>().to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(value: DomainValue) -> Result<T, ConversionError> {
    serde_json::from_value(value).map_err(|e| ConversionError::Decode {
        target: std::any::type_name::<T>().to_string(),
        message: e.to_string(),
    })
}

/// Decodes a persisted collection record by record.
///
/// A record that does not decode leaves its siblings untouched.
pub fn decode_each<T: DeserializeOwned>(
    values: Vec<DomainValue>,
) -> Vec<Result<T, ConversionError>> {
    values.into_iter().map(decode).collect()
}

pub(crate) fn state(raw: &RawRecord) -> Result<State, ConversionError> {
    match field(raw, "state").and_then(|v| v.as_str()) {
        None => Ok(State::Open),
        Some(s) if s.eq_ignore_ascii_case("open") => Ok(State::Open),
        Some(s) if s.eq_ignore_ascii_case("closed") => Ok(State::Closed),
        Some(other) => Err(ConversionError::invalid(
            "state",
            format!("expected 'open' or 'closed', got '{other}'"),
        )),
    }
}

/// Converts the nested record at `raw[key]` through the catalog, if present.
pub(crate) fn nested<T: DeserializeOwned>(
    catalog: &ConverterCatalog,
    converter: &str,
    raw: &RawRecord,
    key: &str,
) -> Result<Option<T>, ConversionError> {
    catalog
        .convert_optional(converter, field(raw, key))?
        .map(decode)
        .transpose()
}

/// Converts every element of the nested list at `raw[key]`.
pub(crate) fn nested_list<T: DeserializeOwned>(
    catalog: &ConverterCatalog,
    converter: &str,
    raw: &RawRecord,
    key: &str,
) -> Result<Vec<T>, ConversionError> {
    match field(raw, key) {
        None => Ok(Vec::new()),
        Some(list @ serde_json::Value::Array(_)) => {
            decode(catalog.convert_result(converter, list)?)
        }
        Some(_) => Err(ConversionError::invalid(key, "expected a list")),
    }
}

pub(crate) fn convert_user(
    raw: &RawRecord,
    _catalog: &ConverterCatalog,
) -> Result<DomainValue, ConversionError> {
    encode(&User {
        login: orchestration::convert::required_str(raw, "login")?.to_string(),
    })
}
