//! Command line and environment configuration.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use orchestration::{FailurePolicy, RepositoryId, RetryConfig, RunConfig};

#[derive(Debug, Parser)]
#[command(name = "ghbackup", version, about = "Back up and restore GitHub repository metadata")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(long, global = true, value_enum, env = "GHBACKUP_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// OTLP (gRPC) collector endpoint; traces are exported when set.
    #[arg(long, global = true, env = "GHBACKUP_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Copy repository metadata from GitHub into the backup directory.
    Save {
        #[command(flatten)]
        run: RunArgs,

        /// Keep collections in memory instead of writing the backup directory.
        #[arg(long)]
        dry_run: bool,
    },
    /// Recreate repository metadata on GitHub from the backup directory.
    Restore {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the save and restore entity order without contacting GitHub.
    Plan {
        /// Only include these entities.
        #[arg(long, value_delimiter = ',', env = "GHBACKUP_ENTITIES")]
        entities: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Record failures and carry on with the next entity.
    Continue,
    /// Stop at the first failure.
    Abort,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Continue => FailurePolicy::ContinueOnError,
            PolicyArg::Abort => FailurePolicy::AbortOnError,
        }
    }
}

/// Settings shared by `save` and `restore`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Repository as `owner/repo`.
    #[arg(long, env = "GHBACKUP_REPO")]
    pub repo: String,

    /// Backup directory holding one JSON file per entity.
    #[arg(long, env = "GHBACKUP_DIR", default_value = "backup")]
    pub dir: PathBuf,

    /// GitHub token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// GitHub API root (GitHub Enterprise: `https://host/api/v3`).
    #[arg(long, env = "GHBACKUP_API_URL", default_value = github::client::DEFAULT_API_URL)]
    pub api_url: String,

    /// Only process these entities (comma separated).
    #[arg(long, value_delimiter = ',', env = "GHBACKUP_ENTITIES")]
    pub entities: Vec<String>,

    /// What to do when an entity fails.
    #[arg(long, value_enum, env = "GHBACKUP_POLICY", default_value_t = PolicyArg::Continue)]
    pub policy: PolicyArg,

    /// Total attempts per remote call, including the first.
    #[arg(long, env = "GHBACKUP_MAX_ATTEMPTS", default_value_t = RetryConfig::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[arg(long, env = "GHBACKUP_INITIAL_BACKOFF_MS", default_value_t = 500)]
    pub initial_backoff_ms: u64,

    /// Upper bound for computed retry delays, in milliseconds.
    #[arg(long, env = "GHBACKUP_MAX_BACKOFF_MS", default_value_t = 30_000)]
    pub max_backoff_ms: u64,

    /// Print the run report as JSON instead of a table.
    #[arg(long)]
    pub report_json: bool,
}

impl RunArgs {
    /// The orchestrator configuration these flags describe.
    pub fn run_config(&self) -> anyhow::Result<RunConfig> {
        let repository = RepositoryId::parse(&self.repo)
            .ok_or_else(|| anyhow!("--repo must be 'owner/repo', got '{}'", self.repo))?;
        if self.max_attempts == 0 {
            bail!("--max-attempts must be at least 1");
        }
        let retry = RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            jitter: true,
        };
        Ok(RunConfig {
            policy: self.policy.into(),
            retry,
            enabled: enabled(&self.entities),
            ..RunConfig::new(repository)
        })
    }

    /// The token, which save and restore both need.
    pub fn token(&self) -> anyhow::Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .context("a GitHub token is required (--token or GITHUB_TOKEN)")
    }
}

/// `None` (everything) for an empty list.
pub fn enabled(entities: &[String]) -> Option<BTreeSet<String>> {
    let set: BTreeSet<String> = entities
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    (!set.is_empty()).then_some(set)
}
