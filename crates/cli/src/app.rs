//! Wiring of one run from parsed arguments.

use std::sync::Arc;

use anyhow::{bail, Context};
use entities::BuiltinStrategies;
use github::{GithubClient, GithubConfig};
use orchestration::{
    BoundaryClient, Direction, EntityName, EntityStore, Orchestrator, Registry,
};
use store::{JsonDirStore, MemoryStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::args::{enabled, Cli, Command, RunArgs};
use crate::report;

/// Runs the selected command and returns the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Command::Plan { entities } => {
            print!("{}", render_plan(&entities)?);
            Ok(report::EXIT_OK)
        }
        Command::Save { run, dry_run } => {
            let store: Arc<dyn EntityStore> = if dry_run {
                info!("dry run, collections stay in memory");
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(JsonDirStore::new(&run.dir))
            };
            let report = execute(Direction::Save, &run, store).await?;
            emit(&run, &report)
        }
        Command::Restore { run } => {
            if !run.dir.is_dir() {
                bail!("backup directory '{}' does not exist", run.dir.display());
            }
            let store = Arc::new(JsonDirStore::new(&run.dir));
            let report = execute(Direction::Restore, &run, store).await?;
            emit(&run, &report)
        }
    }
}

/// Builds the orchestrator for `run` and executes one run in `direction`.
pub async fn execute(
    direction: Direction,
    run: &RunArgs,
    store: Arc<dyn EntityStore>,
) -> anyhow::Result<orchestration::RunReport> {
    let config = run.run_config()?;
    let client = GithubClient::new(&GithubConfig::new(run.token()?).with_api_url(&run.api_url))?;
    let boundary: Arc<dyn BoundaryClient> = Arc::new(client);

    let catalog = entities::converter_catalog();
    let registry = Registry::build(&entities::descriptors(), boundary.as_ref(), &catalog)
        .context("built-in entity declarations are invalid")?;
    let orchestrator =
        Orchestrator::new(Arc::new(registry), boundary, Arc::new(catalog), store, config)?;

    info!(
        repository = %orchestrator.config().repository,
        %direction,
        dir = %run.dir.display(),
        entities = %names(&orchestrator.plan(direction)),
        "starting run"
    );

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_interrupt(cancel.clone()));
    let report = orchestrator.run(direction, &BuiltinStrategies, &cancel).await;
    watcher.abort();
    Ok(report)
}

fn emit(run: &RunArgs, report: &orchestration::RunReport) -> anyhow::Result<u8> {
    let rendered = if run.report_json {
        report::render_json(report).context("failed to encode report")?
    } else {
        report::render_table(report)
    };
    println!("{rendered}");
    Ok(report::exit_code(report))
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, stopping after the current entity");
        cancel.cancel();
    }
}

/// The save and restore order of the selected entities.
///
/// Needs no token: the function table is checked without any request.
pub fn render_plan(selected: &[String]) -> anyhow::Result<String> {
    let client = GithubClient::new(&GithubConfig::new(""))?;
    let catalog = entities::converter_catalog();
    let registry = Registry::build(&entities::descriptors(), &client, &catalog)
        .context("built-in entity declarations are invalid")?;

    let selected = enabled(selected);
    if let Some(unknown) = selected
        .iter()
        .flatten()
        .find(|e| !registry.graph().contains(e.as_str()))
    {
        bail!("unknown entity '{unknown}'");
    }

    let mut out = String::new();
    for direction in [Direction::Save, Direction::Restore] {
        let order: Vec<EntityName> = registry
            .graph()
            .order(direction)
            .iter()
            .filter(|e| selected.as_ref().map_or(true, |s| s.contains(e.as_str())))
            .cloned()
            .collect();
        out.push_str(&format!("{:<8} {}\n", direction.to_string(), names(&order)));
    }
    Ok(out)
}

fn names(order: &[EntityName]) -> String {
    order
        .iter()
        .map(EntityName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
