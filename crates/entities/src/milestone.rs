//! Repository milestones.
//!
//! Milestone numbers are assigned by GitHub, so a restored milestone usually
//! gets a different number than it had in the backup. Every restored (or
//! already present) milestone is recorded in the run's id map so issues and
//! pull requests can point at the new number.

use std::collections::HashMap;

use async_trait::async_trait;
use orchestration::convert::{optional_str, required_str, required_u64};
use orchestration::{
    ConversionError, ConverterCatalog, DomainValue, EntityDescriptor, EntityError, EntityName,
    EntityStrategy, MilestoneNumber, OperationDecl, RawRecord, RunContext,
};
use tracing::debug;

use crate::model::{encode, state, Milestone};
use crate::{list_args, list_existing, read_stored, save_listing};

pub const ENTITY: &str = "milestone";

pub fn descriptor() -> EntityDescriptor {
    EntityDescriptor::new(ENTITY)
        .operation(
            "list_milestones",
            OperationDecl::calls("milestones.list")
                .converter("milestone")
                .arguments(["owner", "repo", "state"])
                .cache_key("{owner}/{repo}:{state}"),
        )
        .operation(
            "create_milestone",
            OperationDecl::calls("milestones.create")
                .converter("milestone")
                .arguments(["owner", "repo", "title", "description", "state", "due_on"]),
        )
}

pub(crate) fn convert(
    raw: &RawRecord,
    _catalog: &ConverterCatalog,
) -> Result<DomainValue, ConversionError> {
    encode(&Milestone {
        number: MilestoneNumber::new(required_u64(raw, "number")?),
        title: required_str(raw, "title")?.to_string(),
        description: optional_str(raw, "description")?.map(str::to_string),
        state: state(raw)?,
        due_on: optional_str(raw, "due_on")?.map(str::to_string),
    })
}

pub struct MilestoneStrategy {
    entity: EntityName,
}

impl MilestoneStrategy {
    pub fn new(entity: EntityName) -> Self {
        Self { entity }
    }
}

#[async_trait]
impl EntityStrategy for MilestoneStrategy {
    async fn save(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        save_listing::<Milestone>(ctx, &self.entity, "list_milestones", &list_args(ctx), |_| {
            true
        })
        .await
    }

    async fn restore(&self, ctx: &RunContext) -> Result<usize, EntityError> {
        let mut tally = ctx.tally();
        let Some(mut stored) = read_stored::<Milestone>(ctx, &self.entity, &mut tally).await?
        else {
            return tally.finish();
        };
        if stored.is_empty() {
            return tally.finish();
        }
        stored.sort_by_key(|m| m.number);

        let existing: Vec<Milestone> =
            list_existing(ctx, "list_milestones", &list_args(ctx)).await?;
        let existing: HashMap<&str, MilestoneNumber> = existing
            .iter()
            .map(|m| (m.title.as_str(), m.number))
            .collect();

        for milestone in &stored {
            let old = milestone.number.as_u64();
            if let Some(number) = existing.get(milestone.title.as_str()) {
                debug!(title = %milestone.title, %number, "milestone already exists, reusing");
                ctx.ids().record(ENTITY, old, number.as_u64());
                tally.succeeded();
                continue;
            }

            let args = ctx
                .repo_args()
                .with("title", milestone.title.as_str())
                .with("description", milestone.description.clone())
                .with("state", milestone.state.as_str())
                .with("due_on", milestone.due_on.clone());
            match ctx
                .invoker()
                .invoke_as::<Milestone>("create_milestone", &args)
                .await
            {
                Ok(created) => {
                    debug!(title = %milestone.title, old, new = %created.number, "milestone created");
                    ctx.ids().record(ENTITY, old, created.number.as_u64());
                    tally.succeeded();
                }
                Err(error) => {
                    if tally
                        .failed(format!("milestone '{}'", milestone.title), error)
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
