//! Rendering of the run report and the matching exit code.

use std::fmt::Write as _;

use orchestration::{OutcomeStatus, RunReport};

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
pub const EXIT_STARTUP: u8 = 2;

/// `0` for a clean run, `1` when anything failed or the run was aborted.
pub fn exit_code(report: &RunReport) -> u8 {
    if report.is_clean() {
        EXIT_OK
    } else {
        EXIT_FAILED
    }
}

pub fn render_json(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// A plain-text table with one row per entity.
pub fn render_table(report: &RunReport) -> String {
    let elapsed = report.finished_at.as_datetime() - report.started_at.as_datetime();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} run {} {} in {:.1}s",
        report.direction,
        report.run_id,
        report.state,
        elapsed.num_milliseconds() as f64 / 1000.0
    );

    let width = report
        .outcomes
        .iter()
        .map(|o| o.entity().as_str().len())
        .max()
        .unwrap_or(0)
        .max("ENTITY".len());
    let _ = writeln!(out, "{:<width$}  {:<9}  {:>5}  ERROR", "ENTITY", "STATUS", "ITEMS");
    for outcome in &report.outcomes {
        let (status, error) = match outcome.status() {
            OutcomeStatus::Succeeded => ("succeeded", String::new()),
            OutcomeStatus::Failed { error } => ("failed", format!("{}: {}", error.kind, error.message)),
            OutcomeStatus::Skipped => ("skipped", String::new()),
        };
        let line = format!(
            "{:<width$}  {:<9}  {:>5}  {error}",
            outcome.entity().as_str(),
            status,
            outcome.item_count()
        );
        let _ = writeln!(out, "{}", line.trim_end());
    }

    let stats = report.stats;
    let _ = writeln!(
        out,
        "calls: {} invoked, {} remote, {} cached, {} retried",
        stats.invocations, stats.remote_calls, stats.cache_hits, stats.retries
    );
    out
}
