//! An in-memory GitHub repository for exercising strategies end to end.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use orchestration::{
    BoundaryClient, CallArgs, Direction, EntityName, EntityStore, FailurePolicy, Invoker,
    RawRecord, Registry, RemoteCallError, RemoteMethod, RepositoryId, RetryConfig, RunContext,
    RunId,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use store::MemoryStore;

pub(crate) const METHODS: &[&str] = &[
    "labels.list",
    "labels.create",
    "milestones.list",
    "milestones.create",
    "issues.list",
    "issues.create",
    "issues.update",
    "pulls.list",
    "pulls.create",
    "pulls.update",
    "comments.list",
    "comments.create",
];

struct FakeLabel {
    name: String,
    color: String,
    description: Option<String>,
}

struct FakeMilestone {
    number: u64,
    title: String,
    description: Option<String>,
    state: String,
    due_on: Option<String>,
}

struct FakeBranches {
    head: String,
    base: String,
    merged: bool,
}

/// An issue, or the issue side of a pull request when `pull` is set.
struct FakeIssue {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    labels: Vec<String>,
    milestone: Option<u64>,
    pull: Option<FakeBranches>,
}

struct FakeComment {
    id: u64,
    number: u64,
    body: String,
}

#[derive(Default)]
struct Repo {
    labels: Vec<FakeLabel>,
    milestones: Vec<FakeMilestone>,
    issues: Vec<FakeIssue>,
    comments: Vec<FakeComment>,
    branches: BTreeSet<String>,
    next_number: u64,
    next_milestone: u64,
    next_comment: u64,
}

type FailWhen = Box<dyn Fn(&CallArgs) -> bool + Send + Sync>;

/// A single repository's issues, pull requests and metadata, answering the
/// GitHub function table with GitHub-shaped JSON.
///
/// Issues and pull requests share one number space. Creating a pull request
/// requires both branches to exist; everything else mirrors GitHub's
/// validation loosely (duplicate label names and milestone titles are
/// rejected with 422).
#[derive(Default)]
pub(crate) struct FakeGithub {
    repo: Mutex<Repo>,
    failures: Mutex<Vec<(String, FailWhen)>>,
    calls: Mutex<Vec<(String, CallArgs)>>,
}

impl FakeGithub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn label(self, name: &str, color: &str) -> Self {
        self.repo.lock().labels.push(FakeLabel {
            name: name.to_string(),
            color: color.to_string(),
            description: None,
        });
        self
    }

    pub(crate) fn milestone(self, number: u64, title: &str, state: &str) -> Self {
        {
            let mut repo = self.repo.lock();
            repo.milestones.push(FakeMilestone {
                number,
                title: title.to_string(),
                description: None,
                state: state.to_string(),
                due_on: None,
            });
            repo.next_milestone = repo.next_milestone.max(number);
        }
        self
    }

    pub(crate) fn issue(
        self,
        number: u64,
        title: &str,
        state: &str,
        labels: &[&str],
        milestone: Option<u64>,
    ) -> Self {
        self.push_issue(number, title, state, labels, milestone, None)
    }

    pub(crate) fn pull(
        self,
        number: u64,
        title: &str,
        state: &str,
        (head, base): (&str, &str),
        merged: bool,
    ) -> Self {
        let branches = FakeBranches {
            head: head.to_string(),
            base: base.to_string(),
            merged,
        };
        self.push_issue(number, title, state, &[], None, Some(branches))
    }

    fn push_issue(
        self,
        number: u64,
        title: &str,
        state: &str,
        labels: &[&str],
        milestone: Option<u64>,
        pull: Option<FakeBranches>,
    ) -> Self {
        {
            let mut repo = self.repo.lock();
            repo.issues.push(FakeIssue {
                number,
                title: title.to_string(),
                body: Some(format!("{title} body")),
                state: state.to_string(),
                labels: labels.iter().map(|l| l.to_string()).collect(),
                milestone,
                pull,
            });
            repo.next_number = repo.next_number.max(number);
        }
        self
    }

    pub(crate) fn comment(self, id: u64, number: u64, body: &str) -> Self {
        {
            let mut repo = self.repo.lock();
            repo.comments.push(FakeComment {
                id,
                number,
                body: body.to_string(),
            });
            repo.next_comment = repo.next_comment.max(id);
        }
        self
    }

    pub(crate) fn branch(self, name: &str) -> Self {
        self.repo.lock().branches.insert(name.to_string());
        self
    }

    /// Makes `method` fail with a non-retryable 422 whenever `when` matches.
    pub(crate) fn fail_when<F>(self, method: &str, when: F) -> Self
    where
        F: Fn(&CallArgs) -> bool + Send + Sync + 'static,
    {
        self.failures
            .lock()
            .push((method.to_string(), Box::new(when)));
        self
    }

    /// Makes `method` fail with a non-retryable 422 on every call.
    pub(crate) fn always_fail(self, method: &str) -> Self {
        self.fail_when(method, |_| true)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub(crate) fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }

    pub(crate) fn args_of(&self, method: &str) -> Vec<CallArgs> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub(crate) fn label_names(&self) -> Vec<String> {
        self.repo.lock().labels.iter().map(|l| l.name.clone()).collect()
    }

    /// `(number, title, state)` of every milestone.
    pub(crate) fn milestone_summaries(&self) -> Vec<(u64, String, String)> {
        self.repo
            .lock()
            .milestones
            .iter()
            .map(|m| (m.number, m.title.clone(), m.state.clone()))
            .collect()
    }

    /// Raw JSON of issue or pull request `number`, as the issues API shows it.
    pub(crate) fn issue_json(&self, number: u64) -> Option<Value> {
        let repo = self.repo.lock();
        repo.issues
            .iter()
            .find(|i| i.number == number)
            .map(|i| issue_json(&repo, i))
    }

    /// `(id, parent number, body)` of every comment.
    pub(crate) fn comment_summaries(&self) -> Vec<(u64, u64, String)> {
        self.repo
            .lock()
            .comments
            .iter()
            .map(|c| (c.id, c.number, c.body.clone()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Function table
    // -----------------------------------------------------------------------

    fn dispatch(&self, method: &str, args: &CallArgs) -> Result<RawRecord, RemoteCallError> {
        let mut repo = self.repo.lock();
        let repo = &mut *repo;
        let str_arg = |key: &str| args.get_str(key).map(str::to_string);

        match method {
            "labels.list" => Ok(Value::Array(repo.labels.iter().map(label_json).collect())),
            "labels.create" => {
                let name = str_arg("name").ok_or_else(|| invalid(method, "name is required"))?;
                if repo.labels.iter().any(|l| l.name.eq_ignore_ascii_case(&name)) {
                    return Err(invalid(method, "label already exists"));
                }
                repo.labels.push(FakeLabel {
                    name,
                    color: str_arg("color").unwrap_or_else(|| "ededed".to_string()),
                    description: str_arg("description"),
                });
                Ok(repo.labels.last().map(label_json).unwrap_or(Value::Null))
            }
            "milestones.list" => {
                let wanted = args.get_str("state").unwrap_or("open");
                Ok(Value::Array(
                    repo.milestones
                        .iter()
                        .filter(|m| wanted == "all" || m.state == wanted)
                        .map(milestone_json)
                        .collect(),
                ))
            }
            "milestones.create" => {
                let title =
                    str_arg("title").ok_or_else(|| invalid(method, "title is required"))?;
                if repo.milestones.iter().any(|m| m.title == title) {
                    return Err(invalid(method, "milestone already exists"));
                }
                repo.next_milestone += 1;
                repo.milestones.push(FakeMilestone {
                    number: repo.next_milestone,
                    title,
                    description: str_arg("description"),
                    state: str_arg("state").unwrap_or_else(|| "open".to_string()),
                    due_on: str_arg("due_on"),
                });
                Ok(repo.milestones.last().map(milestone_json).unwrap_or(Value::Null))
            }
            "issues.list" => {
                let wanted = args.get_str("state").unwrap_or("open");
                Ok(Value::Array(
                    repo.issues
                        .iter()
                        .filter(|i| wanted == "all" || i.state == wanted)
                        .map(|i| issue_json(repo, i))
                        .collect(),
                ))
            }
            "issues.create" => {
                let title =
                    str_arg("title").ok_or_else(|| invalid(method, "title is required"))?;
                let milestone = args.get_u64("milestone");
                if let Some(number) = milestone {
                    if !repo.milestones.iter().any(|m| m.number == number) {
                        return Err(invalid(method, "milestone does not exist"));
                    }
                }
                repo.next_number += 1;
                let issue = FakeIssue {
                    number: repo.next_number,
                    title,
                    body: str_arg("body"),
                    state: "open".to_string(),
                    labels: string_list(args.get("labels")),
                    milestone,
                    pull: None,
                };
                let created = issue_json(repo, &issue);
                repo.issues.push(issue);
                Ok(created)
            }
            "issues.update" | "pulls.update" => {
                let number = args
                    .get_u64("number")
                    .ok_or_else(|| invalid(method, "number is required"))?;
                let index = repo
                    .issues
                    .iter()
                    .position(|i| i.number == number)
                    .ok_or_else(|| not_found(method))?;
                let issue = &mut repo.issues[index];
                if let Some(state) = args.get_str("state") {
                    issue.state = state.to_string();
                }
                if args.get("labels").is_some_and(|v| !v.is_null()) {
                    issue.labels = string_list(args.get("labels"));
                }
                if args.contains("milestone") {
                    issue.milestone = args.get_u64("milestone");
                }
                let issue = &repo.issues[index];
                Ok(if method == "pulls.update" {
                    pull_json(repo, issue)
                } else {
                    issue_json(repo, issue)
                })
            }
            "pulls.list" => {
                let wanted = args.get_str("state").unwrap_or("open");
                Ok(Value::Array(
                    repo.issues
                        .iter()
                        .filter(|i| i.pull.is_some())
                        .filter(|i| wanted == "all" || i.state == wanted)
                        .map(|i| pull_json(repo, i))
                        .collect(),
                ))
            }
            "pulls.create" => {
                let head = str_arg("head").unwrap_or_default();
                let base = str_arg("base").unwrap_or_default();
                if !repo.branches.contains(&head) || !repo.branches.contains(&base) {
                    return Err(invalid(method, "head or base branch does not exist"));
                }
                repo.next_number += 1;
                let pull = FakeIssue {
                    number: repo.next_number,
                    title: str_arg("title").unwrap_or_default(),
                    body: str_arg("body"),
                    state: "open".to_string(),
                    labels: Vec::new(),
                    milestone: None,
                    pull: Some(FakeBranches {
                        head,
                        base,
                        merged: false,
                    }),
                };
                let created = pull_json(repo, &pull);
                repo.issues.push(pull);
                Ok(created)
            }
            "comments.list" => Ok(Value::Array(
                repo.comments.iter().map(comment_json).collect(),
            )),
            "comments.create" => {
                let number = args
                    .get_u64("number")
                    .ok_or_else(|| invalid(method, "number is required"))?;
                if !repo.issues.iter().any(|i| i.number == number) {
                    return Err(not_found(method));
                }
                repo.next_comment += 1;
                repo.comments.push(FakeComment {
                    id: repo.next_comment,
                    number,
                    body: str_arg("body").unwrap_or_default(),
                });
                Ok(repo.comments.last().map(comment_json).unwrap_or(Value::Null))
            }
            other => Err(RemoteCallError::non_retryable(other, "unsupported method")),
        }
    }
}

#[async_trait]
impl BoundaryClient for FakeGithub {
    fn supports(&self, method: &RemoteMethod) -> bool {
        METHODS.contains(&method.as_str())
    }

    async fn call(
        &self,
        method: &RemoteMethod,
        args: &CallArgs,
    ) -> Result<RawRecord, RemoteCallError> {
        let method = method.as_str();
        self.calls.lock().push((method.to_string(), args.clone()));
        let injected = self
            .failures
            .lock()
            .iter()
            .any(|(m, when)| m == method && when(args));
        if injected {
            return Err(invalid(method, "injected failure"));
        }
        self.dispatch(method, args)
    }
}

// ---------------------------------------------------------------------------
// GitHub-shaped JSON
// ---------------------------------------------------------------------------

fn invalid(method: &str, message: &str) -> RemoteCallError {
    RemoteCallError::non_retryable(method, message).with_status(422)
}

fn not_found(method: &str) -> RemoteCallError {
    RemoteCallError::non_retryable(method, "Not Found").with_status(404)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn user() -> Value {
    json!({ "login": "octocat", "id": 1, "type": "User" })
}

fn label_json(label: &FakeLabel) -> Value {
    json!({
        "name": label.name,
        "color": label.color,
        "description": label.description,
        "default": false,
    })
}

fn milestone_json(milestone: &FakeMilestone) -> Value {
    json!({
        "number": milestone.number,
        "title": milestone.title,
        "description": milestone.description,
        "state": milestone.state,
        "due_on": milestone.due_on,
        "open_issues": 0,
    })
}

fn labels_json(repo: &Repo, names: &[String]) -> Value {
    Value::Array(
        names
            .iter()
            .map(|name| {
                repo.labels
                    .iter()
                    .find(|l| &l.name == name)
                    .map(label_json)
                    .unwrap_or_else(|| json!({ "name": name, "color": "ededed" }))
            })
            .collect(),
    )
}

fn milestone_ref(repo: &Repo, number: Option<u64>) -> Value {
    number
        .and_then(|n| repo.milestones.iter().find(|m| m.number == n))
        .map(milestone_json)
        .unwrap_or(Value::Null)
}

fn issue_json(repo: &Repo, issue: &FakeIssue) -> Value {
    let mut value = json!({
        "number": issue.number,
        "title": issue.title,
        "body": issue.body,
        "state": issue.state,
        "labels": labels_json(repo, &issue.labels),
        "milestone": milestone_ref(repo, issue.milestone),
        "user": user(),
        "comments": 0,
    });
    if issue.pull.is_some() {
        value["pull_request"] = json!({
            "url": format!("https://api.github.com/repos/octo/hello/pulls/{}", issue.number),
        });
    }
    value
}

fn pull_json(repo: &Repo, issue: &FakeIssue) -> Value {
    let (head, base, merged) = issue
        .pull
        .as_ref()
        .map(|p| (p.head.as_str(), p.base.as_str(), p.merged))
        .unwrap_or_default();
    json!({
        "number": issue.number,
        "title": issue.title,
        "body": issue.body,
        "state": issue.state,
        "head": { "ref": head, "sha": "0000000" },
        "base": { "ref": base, "sha": "0000000" },
        "merged_at": merged.then_some("2024-01-02T03:04:05Z"),
        "labels": labels_json(repo, &issue.labels),
        "milestone": milestone_ref(repo, issue.milestone),
        "user": user(),
    })
}

fn comment_json(comment: &FakeComment) -> Value {
    json!({
        "id": comment.id,
        "issue_url": format!("https://api.github.com/repos/octo/hello/issues/{}", comment.number),
        "body": comment.body,
        "user": user(),
    })
}

// ---------------------------------------------------------------------------
// Run harness
// ---------------------------------------------------------------------------

pub(crate) fn entity(name: &str) -> EntityName {
    EntityName::new(name).expect("test entity names are non-empty")
}

pub(crate) fn repository() -> RepositoryId {
    RepositoryId::parse("octo/hello").expect("valid repository")
}

/// A run context over every built-in entity, talking to `github` and
/// persisting into `store`.
pub(crate) fn context(
    github: &Arc<FakeGithub>,
    store: &Arc<MemoryStore>,
    direction: Direction,
    policy: FailurePolicy,
) -> RunContext {
    let catalog = crate::converter_catalog();
    let registry = Registry::build(&crate::descriptors(), github.as_ref(), &catalog)
        .expect("built-in declarations are valid");
    let invoker = Invoker::new(
        Arc::new(registry),
        Arc::clone(github) as Arc<dyn BoundaryClient>,
        Arc::new(catalog),
        RetryConfig::immediate(2),
    );
    RunContext::new(
        RunId::new_random(),
        direction,
        repository(),
        policy,
        invoker,
        Arc::clone(store) as Arc<dyn EntityStore>,
    )
}

pub(crate) fn save_context(github: &Arc<FakeGithub>, store: &Arc<MemoryStore>) -> RunContext {
    context(github, store, Direction::Save, FailurePolicy::ContinueOnError)
}

pub(crate) fn restore_context(github: &Arc<FakeGithub>, store: &Arc<MemoryStore>) -> RunContext {
    context(github, store, Direction::Restore, FailurePolicy::ContinueOnError)
}
