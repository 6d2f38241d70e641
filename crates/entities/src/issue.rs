//! Issues.
//!
//! GitHub's issues listing also returns pull requests. Those records are
//! dropped on save; the `pull_request` entity owns them.
//!
//! On restore an issue is created open with its labels and (remapped)
//! milestone, then closed if it was closed in the backup. A milestone that
//! was not restored is dropped from the issue rather than failing it.

use async_trait::async_trait;
use orchestration::convert::{field, optional_str, required_str, required_u64};
use orchestration::{
    ConversionError, ConverterCatalog, DomainValue, EntityDescriptor, EntityError, EntityName,
    EntityStrategy, InvokeError, IssueNumber, OperationDecl, RawRecord, RunContext,
};
use serde_json::Value;
use tracing::debug;

use crate::model::{encode, nested, nested_list, state, Issue, Label, Milestone};
use crate::{list_args, read_stored, save_listing};

pub const ENTITY: &str = "issue";

pub fn descriptor() -> EntityDescriptor {
    EntityDescriptor::new(ENTITY)
        .depends_on(["label", "milestone"])
        .restore_after(["label", "milestone"])
        .operation(
            "list_issues",
            OperationDecl::calls("issues.list")
                .converter("issue")
                .arguments(["owner", "repo", "state"])
                .cache_key("{owner}/{repo}:{state}"),
        )
        .operation(
            "create_issue",
            OperationDecl::calls("issues.create")
                .converter("issue")
                .arguments(["owner", "repo", "title", "body", "labels", "milestone"]),
        )
        .operation(
            "update_issue",
            OperationDecl::calls("issues.update")
                .converter("issue")
                .arguments(["owner", "repo", "number", "labels", "milestone", "state"]),
        )
        .operation(
            "close_issue",
            OperationDecl::calls("issues.update")
                .converter("issue")
                .arguments(["owner", "repo", "number", "state"]),
        )
}

pub(crate) fn convert(
    raw: &RawRecord,
    catalog: &ConverterCatalog,
) -> Result<DomainValue, ConversionError> {
    encode(&Issue {
        number: IssueNumber::new(required_u64(raw, "number")?),
        title: required_str(raw, "title")?.to_string(),
        body: optional_str(raw, "body")?.map(str::to_string),
        state: state(raw)?,
        labels: nested_list(catalog, "label", raw, "labels")?,
        milestone: nested(catalog, "milestone", raw, "milestone")?,
        user: nested(catalog, "user", raw, "user")?,
        is_pull_request: field(raw, "pull_request").is_some(),
    })
}

/// The new number of a backed-up milestone, or `None` when it was not
/// restored in this run.
pub(crate) fn remap_milestone(ctx: &RunContext, milestone: Option<&Milestone>) -> Option<u64> {
    let milestone = milestone?;
    let remapped = ctx
        .ids()
        .lookup(crate::milestone::ENTITY, milestone.number.as_u64());
    if remapped.is_none() {
        debug!(
            milestone = %milestone.title,
            "milestone was not restored, dropping reference"
        );
    }
    remapped
}

pub(crate) fn label_names(labels: &[Label]) -> Value {
    Value::Array(
        labels
            .iter()
            .map(|l| Value::String(l.name.clone()))
            .collect(),
    )
}

pub struct IssueStrategy {
    entity: EntityName,
}

impl IssueStrategy {
    pub fn new(entity: EntityName) -> Self {
        Self { entity }
    }

    async fn restore_one(&self, ctx: &RunContext, issue: &Issue) -> Result<(), InvokeError> {
        let args = ctx
            .repo_args()
            .with("title", issue.title.as_str())
            .with("body", issue.body.clone())
            .with("labels", label_names(&issue.labels))
            .with("milestone", remap_milestone(ctx, issue.milestone.as_ref()));
        let created: Issue = ctx.invoker().invoke_as("create_issue", &args).await?;
        ctx.ids()
            .record(ENTITY, issue.number.as_u64(), created.number.as_u64());

        if issue.state.is_closed() {
            let args = ctx
                .repo_args()
                .with("number", created.number.as_u64())
                .with("state", "closed");
            ctx.invoker().invoke("close_issue", &args).await?;
        }
        debug!(old = %issue.number, new = %created.number, "issue restored");
        Ok(())
    }
}

#[async_trait]
impl EntityStrategy for IssueStrategy {
    async fn save(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        save_listing::<Issue>(ctx, &self.entity, "list_issues", &list_args(ctx), |i| {
            !i.is_pull_request
        })
        .await
    }

    async fn restore(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        let mut tally = ctx.tally();
        let Some(mut stored) = read_stored::<Issue>(ctx, &self.entity, &mut tally).await? else {
            return tally.finish();
        };
        stored.sort_by_key(|i| i.number);

        for issue in stored.iter().filter(|i| !i.is_pull_request) {
            match self.restore_one(ctx, issue).await {
                Ok(()) => tally.succeeded(),
                Err(error) => {
                    if tally
                        .failed(format!("issue #{}", issue.number), error)
                        .is_break()
                    {
                        break;
                    }
                }
            }
        }
        tally.finish()
    }
}
