//! Pull requests.
//!
//! A pull request can only be recreated when its head and base branches exist
//! in the target repository; GitHub rejects the rest with a validation error,
//! which is reported per record. Labels and milestone are applied through the
//! issue side of the pull request after creation. Merged pull requests come
//! back closed.

use async_trait::async_trait;
use orchestration::convert::{field, optional_str, required_str, required_u64};
use orchestration::{
    ConversionError, ConverterCatalog, DomainValue, EntityDescriptor, EntityError, EntityName,
    EntityStrategy, InvokeError, IssueNumber, OperationDecl, RawRecord, RunContext,
};
use tracing::debug;

use crate::issue::{label_names, remap_milestone};
use crate::model::{encode, nested, nested_list, state, PullRequest};
use crate::{list_args, read_stored, save_listing};

pub const ENTITY: &str = "pull_request";

pub fn descriptor() -> EntityDescriptor {
    EntityDescriptor::new(ENTITY)
        .depends_on(["label", "milestone"])
        .restore_after(["issue", "label", "milestone"])
        .operation(
            "list_pull_requests",
            OperationDecl::calls("pulls.list")
                .converter("pull_request")
                .arguments(["owner", "repo", "state"])
                .cache_key("{owner}/{repo}:{state}"),
        )
        .operation(
            "create_pull_request",
            OperationDecl::calls("pulls.create")
                .converter("pull_request")
                .arguments(["owner", "repo", "title", "body", "head", "base"]),
        )
        .operation(
            "close_pull_request",
            OperationDecl::calls("pulls.update")
                .converter("pull_request")
                .arguments(["owner", "repo", "number", "state"]),
        )
}

fn branch<'a>(raw: &'a RawRecord, key: &str) -> Result<&'a str, ConversionError> {
    let side = field(raw, key).ok_or_else(|| ConversionError::MissingField {
        field: key.to_string(),
    })?;
    required_str(side, "ref")
        .map_err(|_| ConversionError::invalid(key, "expected an object with a 'ref' string"))
}

pub(crate) fn convert(
    raw: &RawRecord,
    catalog: &ConverterCatalog,
) -> Result<DomainValue, ConversionError> {
    encode(&PullRequest {
        number: IssueNumber::new(required_u64(raw, "number")?),
        title: required_str(raw, "title")?.to_string(),
        body: optional_str(raw, "body")?.map(str::to_string),
        state: state(raw)?,
        head: branch(raw, "head")?.to_string(),
        base: branch(raw, "base")?.to_string(),
        merged: field(raw, "merged_at").is_some(),
        labels: nested_list(catalog, "label", raw, "labels")?,
        milestone: nested(catalog, "milestone", raw, "milestone")?,
        user: nested(catalog, "user", raw, "user")?,
    })
}

pub struct PullRequestStrategy {
    entity: EntityName,
}

impl PullRequestStrategy {
    pub fn new(entity: EntityName) -> Self {
        Self { entity }
    }

    async fn restore_one(&self, ctx: &RunContext, pr: &PullRequest) -> Result<(), InvokeError> {
        let args = ctx
            .repo_args()
            .with("title", pr.title.as_str())
            .with("body", pr.body.clone())
            .with("head", pr.head.as_str())
            .with("base", pr.base.as_str());
        let created: PullRequest = ctx
            .invoker()
            .invoke_as("create_pull_request", &args)
            .await?;
        let number = created.number.as_u64();
        ctx.ids().record(ENTITY, pr.number.as_u64(), number);

        let milestone = remap_milestone(ctx, pr.milestone.as_ref());
        if !pr.labels.is_empty() || milestone.is_some() {
            let args = ctx
                .repo_args()
                .with("number", number)
                .with("labels", label_names(&pr.labels))
                .with("milestone", milestone);
            ctx.invoker().invoke("update_issue", &args).await?;
        }

        if pr.state.is_closed() {
            let args = ctx
                .repo_args()
                .with("number", number)
                .with("state", "closed");
            ctx.invoker().invoke("close_pull_request", &args).await?;
        }
        debug!(old = %pr.number, new = number, merged = pr.merged, "pull request restored");
        Ok(())
    }
}

#[async_trait]
impl EntityStrategy for PullRequestStrategy {
    async fn save(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        save_listing::<PullRequest>(
            ctx,
            &self.entity,
            "list_pull_requests",
            &list_args(ctx),
            |_| true,
        )
        .await
    }

    async fn restore(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        let mut tally = ctx.tally();
        let Some(mut stored) = read_stored::<PullRequest>(ctx, &self.entity, &mut tally).await?
        else {
            return tally.finish();
        };
        stored.sort_by_key(|p| p.number);

        for pr in &stored {
            match self.restore_one(ctx, pr).await {
                Ok(()) => tally.succeeded(),
                Err(error) => {
                    if tally
                        .failed(format!("pull request #{}", pr.number), error)
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
