//! diffpost command-line front-end.
//!
//! Plays the part of the chat bot: reads a diff file, hands it to the
//! `ProposalService`, and waits for the queue to report how the write went.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use diffpost_core::app::{CreateProposal, EditProposal, ProposalService, Submission};
use diffpost_core::domain::{Submitter, TaskId, normalize};
use diffpost_core::impls::{GithubClient, InMemoryHosting};
use diffpost_core::ports::{HostingApi, SystemClock};
use diffpost_core::queue::{DelayQueue, TaskOutcome, TaskReport, WorkerHandle};

use crate::config::ConfigArgs;

#[derive(Debug, Parser)]
#[command(name = "diffpost", version, about = "Queue diff proposals as pull requests")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Use an in-memory hosting backend instead of GitHub.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a diff file and print its canonical form.
    Check { file: PathBuf },
    /// Open a new proposal from a diff file.
    Create {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        submitter: SubmitterArgs,
    },
    /// Replace the diff of an existing proposal.
    Edit {
        file: PathBuf,
        /// Proposal branch, as shown by `list`.
        #[arg(long)]
        branch: String,
        #[command(flatten)]
        submitter: SubmitterArgs,
    },
    /// List open proposals.
    List {
        #[arg(long, default_value = "")]
        query: String,
        /// Maximum number of entries; defaults to `search_limit`.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Clone, Args)]
struct SubmitterArgs {
    #[arg(long)]
    submitter_id: u64,
    #[arg(long)]
    submitter_name: String,
    /// RFC 3339 timestamp, e.g. 2023-04-01T12:00:00Z.
    #[arg(long)]
    account_created_at: DateTime<Utc>,
}

impl From<SubmitterArgs> for Submitter {
    fn from(args: SubmitterArgs) -> Self {
        Submitter::new(args.submitter_id, args.submitter_name, args.account_created_at)
    }
}

/// Service plus the worker that drains its queue.
struct Bridge {
    service: ProposalService,
    worker: WorkerHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();
    init_tracing()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Check { file } => check(&file),
        Command::Create {
            file,
            title,
            submitter,
        } => {
            let bridge = start_bridge(&cli.config, cli.dry_run)?;
            let diff = read_diff(&file)?;
            let request = CreateProposal {
                submitter: submitter.into(),
                title,
                diff,
            };
            run_to_completion(bridge, |service| Ok(service.create(request)?)).await
        }
        Command::Edit {
            file,
            branch,
            submitter,
        } => {
            let bridge = start_bridge(&cli.config, cli.dry_run)?;
            let diff = read_diff(&file)?;
            let request = EditProposal {
                submitter: submitter.into(),
                branch,
                diff,
            };
            run_to_completion(bridge, |service| Ok(service.edit(request)?)).await
        }
        Command::List { query, limit } => {
            let bridge = start_bridge(&cli.config, cli.dry_run)?;
            let result = list(&bridge.service, &query, limit).await;
            bridge.worker.shutdown_and_join().await;
            result
        }
    }
}

fn check(file: &Path) -> anyhow::Result<()> {
    let text = read_diff(file)?;
    match normalize(&text) {
        Ok(fixed) => {
            println!("{fixed}");
            Ok(())
        }
        Err(err) => bail!("{err}"),
    }
}

fn read_diff(file: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))
}

fn start_bridge(args: &ConfigArgs, dry_run: bool) -> anyhow::Result<Bridge> {
    let config = args.resolve()?;
    let hosting: Arc<dyn HostingApi> = if dry_run {
        tracing::info!("dry run, using in-memory hosting");
        Arc::new(InMemoryHosting::new().with_branch(
            &config.head_repo(),
            &config.base_branch,
            "dry-run",
        ))
    } else {
        let token = args
            .github_token
            .as_deref()
            .context("GITHUB_TOKEN is required unless --dry-run is set")?;
        Arc::new(GithubClient::new(
            &config.api_base,
            token,
            config.request_timeout(),
        )?)
    };

    let (queue, worker) = DelayQueue::start(config.queue_config()?);
    let service = ProposalService::new(hosting, queue, config, Arc::new(SystemClock));
    Ok(Bridge { service, worker })
}

/// Submit through `submit`, then wait for that task's report (or Ctrl-C).
async fn run_to_completion<F>(bridge: Bridge, submit: F) -> anyhow::Result<()>
where
    F: FnOnce(&ProposalService) -> anyhow::Result<Submission>,
{
    let mut reports = bridge.service.queue().subscribe();
    let submission = match submit(&bridge.service) {
        Ok(submission) => submission,
        Err(err) => {
            bridge.worker.shutdown_and_join().await;
            return Err(err);
        }
    };
    println!("queued {} for branch {}", submission.task_id, submission.branch);

    let report = tokio::select! {
        report = wait_for_report(&mut reports, submission.task_id) => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    bridge.worker.shutdown_and_join().await;

    let Some(report) = report else {
        bail!("interrupted before {} ran", submission.task_id);
    };
    match report?.outcome {
        TaskOutcome::Succeeded => {
            println!("done: {}", submission.branch);
            Ok(())
        }
        TaskOutcome::Failed(message) | TaskOutcome::Panicked(message) => {
            bail!("{} failed: {message}", submission.task_id)
        }
    }
}

async fn wait_for_report(
    reports: &mut broadcast::Receiver<TaskReport>,
    task_id: TaskId,
) -> anyhow::Result<TaskReport> {
    loop {
        match reports.recv().await {
            Ok(report) if report.task_id == task_id => return Ok(report),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "report stream lagged");
            }
            Err(RecvError::Closed) => bail!("queue closed before {task_id} finished"),
        }
    }
}

async fn list(service: &ProposalService, query: &str, limit: Option<usize>) -> anyhow::Result<()> {
    service.refresh_catalog().await?;
    let summaries = match limit {
        Some(limit) => service.catalog().search(query, limit),
        None => service.search(query),
    };
    for summary in summaries {
        let author = summary.id.submitter_id().to_string();
        println!(
            "{}\t#{}\t{}",
            summary.branch,
            summary.pull_number,
            summary.id.describe(&author)
        );
    }
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new("info,diffpost=debug,diffpost_core=debug"),
    };
    let log_format = std::env::var("DIFFPOST_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .json()
                .flatten_event(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            bail!("unsupported DIFFPOST_LOG_FORMAT={other:?}; expected one of: json, pretty, compact");
        }
    }

    tracing::debug!(log_format = %log_format, "tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_create_with_submitter() {
        let cli = Cli::try_parse_from([
            "diffpost",
            "--dry-run",
            "create",
            "fire.diff",
            "--title",
            "fire trails",
            "--submitter-id",
            "42",
            "--submitter-name",
            "ana",
            "--account-created-at",
            "2023-04-01T12:00:00Z",
        ])
        .unwrap();
        assert!(cli.dry_run);
        let Command::Create {
            file,
            title,
            submitter,
        } = cli.command
        else {
            panic!("expected create");
        };
        assert_eq!(file, PathBuf::from("fire.diff"));
        assert_eq!(title.as_deref(), Some("fire trails"));
        let submitter = Submitter::from(submitter);
        assert_eq!(submitter.id, 42);
        assert_eq!(submitter.account_created_at.to_rfc3339(), "2023-04-01T12:00:00+00:00");
    }

    #[test]
    fn check_reports_the_offending_line() {
        let dir = std::env::temp_dir().join(format!("diffpost-check-{}", TaskId::generate()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("bad.diff");
        std::fs::write(&file, "+ ok\n-\n").unwrap();

        let err = check(&file).unwrap_err();
        assert_eq!(err.to_string(), "Invalid line at 2. No content after -.");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
