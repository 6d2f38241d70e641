//! Repository labels.
//!
//! Labels have no dependencies. Restore skips labels whose name already
//! exists in the target repository (compared case-insensitively, as GitHub
//! does) and creates the rest.

use std::collections::HashSet;

use async_trait::async_trait;
use orchestration::convert::{optional_str, required_str};
use orchestration::{
    ConversionError, ConverterCatalog, DomainValue, EntityDescriptor, EntityError, EntityName,
    EntityStrategy, OperationDecl, RawRecord, RunContext,
};
use tracing::debug;

use crate::model::{encode, Label};
use crate::{list_existing, read_stored, save_listing};

pub const ENTITY: &str = "label";

pub fn descriptor() -> EntityDescriptor {
    EntityDescriptor::new(ENTITY)
        .operation(
            "list_labels",
            OperationDecl::calls("labels.list")
                .converter("label")
                .arguments(["owner", "repo"])
                .cache_key("{owner}/{repo}"),
        )
        .operation(
            "create_label",
            OperationDecl::calls("labels.create")
                .converter("label")
                .arguments(["owner", "repo", "name", "color", "description"]),
        )
}

pub(crate) fn convert(
    raw: &RawRecord,
    _catalog: &ConverterCatalog,
) -> Result<DomainValue, ConversionError> {
    encode(&Label {
        name: required_str(raw, "name")?.to_string(),
        color: required_str(raw, "color")?.to_string(),
        description: optional_str(raw, "description")?
            .filter(|d| !d.is_empty())
            .map(str::to_string),
    })
}

pub struct LabelStrategy {
    entity: EntityName,
}

impl LabelStrategy {
    pub fn new(entity: EntityName) -> Self {
        Self { entity }
    }
}

#[async_trait]
impl EntityStrategy for LabelStrategy {
    async fn save(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        save_listing::<Label>(ctx, &self.entity, "list_labels", &ctx.repo_args(), |_| true).await
    }

    async fn restore(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        let mut tally = ctx.tally();
        let Some(stored) = read_stored::<Label>(ctx, &self.entity, &mut tally).await? else {
            return tally.finish();
        };
        if stored.is_empty() {
            return tally.finish();
        }

        let existing: Vec<Label> = list_existing(ctx, "list_labels", &ctx.repo_args()).await?;
        let existing: HashSet<String> = existing
            .iter()
            .map(|l| l.name.to_lowercase())
            .collect();

        for label in &stored {
            if existing.contains(&label.name.to_lowercase()) {
                debug!(label = %label.name, "label already exists, skipping");
                tally.succeeded();
                continue;
            }

            let args = ctx
                .repo_args()
                .with("name", label.name.as_str())
                .with("color", label.color.as_str())
                .with("description", label.description.clone());
            match ctx.invoker().invoke("create_label", &args).await {
                Ok(_) => tally.succeeded(),
                Err(error) => {
                    if tally
                        .failed(format!("label '{}'", label.name), error)
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

#[cfg(test)]
mod tests;
