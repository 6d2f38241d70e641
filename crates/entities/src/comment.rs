//! Issue and pull request comments.
//!
//! Comments are listed repository-wide. GitHub identifies the parent only
//! through `issue_url`, whose last path segment is the issue (or pull
//! request) number. A comment whose parent was not restored in this run is
//! skipped with a warning and does not count as a failure.

use async_trait::async_trait;
use orchestration::convert::{required_str, required_u64};
use orchestration::{
    CommentId, ConversionError, ConverterCatalog, DomainValue, EntityDescriptor, EntityError,
    EntityName, EntityStrategy, IssueNumber, OperationDecl, RawRecord, RunContext,
};
use tracing::{debug, warn};

use crate::model::{encode, nested, Comment};
use crate::{issue, pull_request, read_stored, save_listing};

pub const ENTITY: &str = "comment";

pub fn descriptor() -> EntityDescriptor {
    EntityDescriptor::new(ENTITY)
        .depends_on(["issue", "pull_request"])
        .restore_after(["issue", "pull_request"])
        .operation(
            "list_comments",
            OperationDecl::calls("comments.list")
                .converter("comment")
                .arguments(["owner", "repo"])
                .cache_key("{owner}/{repo}"),
        )
        .operation(
            "create_comment",
            OperationDecl::calls("comments.create")
                .converter("comment")
                .arguments(["owner", "repo", "number", "body"]),
        )
}

fn parent_number(raw: &RawRecord) -> Result<u64, ConversionError> {
    let url = required_str(raw, "issue_url")?;
    url.rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .ok_or_else(|| {
            ConversionError::invalid("issue_url", format!("no issue number in '{url}'"))
        })
}

pub(crate) fn convert(
    raw: &RawRecord,
    catalog: &ConverterCatalog,
) -> Result<DomainValue, ConversionError> {
    encode(&Comment {
        id: CommentId::new(required_u64(raw, "id")?),
        issue_number: IssueNumber::new(parent_number(raw)?),
        body: required_str(raw, "body")?.to_string(),
        user: nested(catalog, "user", raw, "user")?,
    })
}

pub struct CommentStrategy {
    entity: EntityName,
}

impl CommentStrategy {
    pub fn new(entity: EntityName) -> Self {
        Self { entity }
    }
}

#[async_trait]
impl EntityStrategy for CommentStrategy {
    async fn save(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        save_listing::<Comment>(ctx, &self.entity, "list_comments", &ctx.repo_args(), |_| true)
            .await
    }

    async fn restore(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        let mut tally = ctx.tally();
        let Some(mut stored) = read_stored::<Comment>(ctx, &self.entity, &mut tally).await? else {
            return tally.finish();
        };
        stored.sort_by_key(|c| c.id);

        let mut orphaned = 0usize;
        for comment in &stored {
            let old = comment.issue_number.as_u64();
            let parent = ctx
                .ids()
                .lookup(issue::ENTITY, old)
                .or_else(|| ctx.ids().lookup(pull_request::ENTITY, old));
            let Some(parent) = parent else {
                warn!(
                    comment = %comment.id,
                    issue = old,
                    "parent issue was not restored, skipping comment"
                );
                orphaned += 1;
                continue;
            };

            let args = ctx
                .repo_args()
                .with("number", parent)
                .with("body", comment.body.as_str());
            match ctx.invoker().invoke("create_comment", &args).await {
                Ok(_) => tally.succeeded(),
                Err(error) => {
                    if tally
                        .failed(format!("comment {}", comment.id), error)
                        .is_break()
                    {
                        break;
                    }
                }
            }
        }
        if orphaned > 0 {
            debug!(orphaned, "comments skipped for missing parents");
        }
        tally.finish()
    }
}
