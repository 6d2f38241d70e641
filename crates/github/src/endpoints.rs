//! The GitHub function table.
//!
//! Every remote method the built-in entities declare maps to one REST
//! endpoint. Path placeholders (`{owner}`, `{number}`, ...) are filled from the
//! call arguments; the remaining listed parameters travel in the query string
//! (for listings) or the JSON body (for writes).

use std::collections::BTreeMap;

use orchestration::{CallArgs, RemoteCallError};
use serde_json::{Map, Value};

/// How an endpoint is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Paginated `GET` returning a JSON array.
    List,
    /// `POST` with a JSON body.
    Create,
    /// `PATCH` with a JSON body.
    Update,
}

/// One row of the function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub verb: Verb,
    /// Path template relative to the API base, e.g. `/repos/{owner}/{repo}/labels`.
    pub path: &'static str,
    /// Arguments sent as query parameters or body fields.
    pub params: &'static [&'static str],
}

const fn endpoint(verb: Verb, path: &'static str, params: &'static [&'static str]) -> Endpoint {
    Endpoint { verb, path, params }
}

const TABLE: &[(&str, Endpoint)] = &[
    ("labels.list", endpoint(Verb::List, "/repos/{owner}/{repo}/labels", &[])),
    (
        "labels.create",
        endpoint(
            Verb::Create,
            "/repos/{owner}/{repo}/labels",
            &["name", "color", "description"],
        ),
    ),
    (
        "milestones.list",
        endpoint(Verb::List, "/repos/{owner}/{repo}/milestones", &["state"]),
    ),
    (
        "milestones.create",
        endpoint(
            Verb::Create,
            "/repos/{owner}/{repo}/milestones",
            &["title", "description", "state", "due_on"],
        ),
    ),
    (
        "issues.list",
        endpoint(Verb::List, "/repos/{owner}/{repo}/issues", &["state"]),
    ),
    (
        "issues.create",
        endpoint(
            Verb::Create,
            "/repos/{owner}/{repo}/issues",
            &["title", "body", "labels", "milestone"],
        ),
    ),
    (
        "issues.update",
        endpoint(
            Verb::Update,
            "/repos/{owner}/{repo}/issues/{number}",
            &["title", "body", "state", "labels", "milestone"],
        ),
    ),
    ("pulls.list", endpoint(Verb::List, "/repos/{owner}/{repo}/pulls", &["state"])),
    (
        "pulls.create",
        endpoint(
            Verb::Create,
            "/repos/{owner}/{repo}/pulls",
            &["title", "body", "head", "base"],
        ),
    ),
    (
        "pulls.update",
        endpoint(
            Verb::Update,
            "/repos/{owner}/{repo}/pulls/{number}",
            &["title", "body", "state", "base"],
        ),
    ),
    (
        "comments.list",
        endpoint(Verb::List, "/repos/{owner}/{repo}/issues/comments", &[]),
    ),
    (
        "comments.create",
        endpoint(
            Verb::Create,
            "/repos/{owner}/{repo}/issues/{number}/comments",
            &["body"],
        ),
    ),
];

/// The full function table keyed by remote method name.
pub fn function_table() -> BTreeMap<&'static str, Endpoint> {
    TABLE.iter().copied().collect()
}

impl Endpoint {
    /// Fills the path template from `args`.
    ///
    /// Every placeholder must have a string or integer argument; values are
    /// percent-encoded as single path segments.
    pub fn render_path(&self, method: &str, args: &CallArgs) -> Result<String, RemoteCallError> {
        let mut out = String::with_capacity(self.path.len());
        let mut rest = self.path;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let Some(len) = rest[start..].find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = &rest[start + 1..start + len];
            let value = match args.get(name) {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(RemoteCallError::non_retryable(
                        method,
                        format!("missing path argument '{name}'"),
                    ))
                }
            };
            out.push_str(&urlencoding::encode(&value));
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Query pairs for a listing. Absent and `null` arguments are left out.
    pub fn query(&self, args: &CallArgs) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter_map(|&name| {
                let value = match args.get(name)? {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((name.to_string(), value))
            })
            .collect()
    }

    /// JSON body for a write. Absent and `null` arguments are left out so
    /// GitHub keeps its defaults.
    pub fn body(&self, args: &CallArgs) -> Value {
        let fields: Map<String, Value> = self
            .params
            .iter()
            .filter_map(|&name| match args.get(name) {
                None | Some(Value::Null) => None,
                Some(value) => Some((name.to_string(), value.clone())),
            })
            .collect();
        Value::Object(fields)
    }
}
