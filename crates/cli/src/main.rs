//! `ghbackup` entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: command line flags with environment fallbacks
//!    (`GITHUB_TOKEN`, `GHBACKUP_*`), after loading a `.env` file if present.
//! 2. **Wire observability**: `tracing-subscriber` with a pretty or JSON
//!    layer, plus an OpenTelemetry OTLP exporter when `--otlp-endpoint` is
//!    given.
//! 3. **Construct infrastructure**: the GitHub client, the backup directory
//!    store and the built-in entity declarations, injected into the
//!    [`orchestration::Orchestrator`].
//! 4. **Run and report**: execute one save or restore run, cancel it between
//!    entities on Ctrl-C, print the report and exit with its status.
//!
//! Exit codes: `0` for a clean run, `1` when any entity failed or the run was
//! aborted, `2` when the run could not start.

use std::process::ExitCode;

use clap::Parser;

mod app;
mod args;
mod report;
mod telemetry;

use args::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is the normal case.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let telemetry = match telemetry::init(cli.log_format, cli.otlp_endpoint.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(report::EXIT_STARTUP);
        }
    };

    let code = match app::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "run could not start");
            eprintln!("error: {e:#}");
            report::EXIT_STARTUP
        }
    };

    telemetry.shutdown();
    ExitCode::from(code)
}
