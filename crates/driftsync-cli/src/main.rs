//! driftsync - bidirectional replica synchronization over SSH
//!
//! Keeps a local directory tree and a remote one converged using
//! mtime/size reconciliation, batched archive transfers, and crash-safe
//! resume.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use driftsync_config::{load_profile, SyncConfig};
use driftsync_engine::{Orchestrator, RunOptions, RunSummary, SyncMode};
use driftsync_remote::{RetryPolicy, SshTransport};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::info;

mod prompt;

/// driftsync - bidirectional replica synchronization over SSH
#[derive(Parser)]
#[command(
    name = "driftsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Bidirectional replica synchronization over SSH",
    long_about = "driftsync keeps a local directory tree and a remote one converged.\n\
                  Change detection uses modification time and size against a persisted\n\
                  baseline; transfers move in compressed batches and every batch is\n\
                  checkpointed, so an interrupted run resumes where it stopped."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Profile file (YAML)
    #[arg(short, long)]
    profile: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize the replica pair
    Sync {
        /// Compute and report the plan without changing anything
        #[arg(short = 'n', long)]
        dry_run: bool,
        /// Discard the baseline and ledger, replan from scratch
        #[arg(short, long)]
        force: bool,
        /// Only modify the remote replica
        #[arg(long)]
        push_only: bool,
        /// Only modify the local replica
        #[arg(long)]
        pull_only: bool,
        /// Seconds between remote scan polls
        #[arg(long)]
        poll_interval: Option<u64>,
        /// Maximum seconds to wait for the remote scan
        #[arg(long)]
        poll_timeout: Option<u64>,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.quiet, cli.verbose)?;

    let config = load_profile(&cli.profile)
        .with_context(|| format!("cannot load profile {}", cli.profile.display()))?;

    match cli.command {
        Commands::Sync {
            dry_run,
            force,
            push_only,
            pull_only,
            poll_interval,
            poll_timeout,
        } => {
            if push_only && pull_only {
                bail!("--push-only and --pull-only are mutually exclusive");
            }
            let mode = if push_only {
                SyncMode::PushOnly
            } else if pull_only {
                SyncMode::PullOnly
            } else {
                SyncMode::Bidirectional
            };
            let options = RunOptions {
                dry_run,
                force,
                mode,
            };
            sync_command(config, options, poll_interval, poll_timeout, cli.quiet).await?;
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}

async fn sync_command(
    mut config: SyncConfig,
    options: RunOptions,
    poll_interval: Option<u64>,
    poll_timeout: Option<u64>,
    quiet: bool,
) -> Result<()> {
    if let Some(interval) = poll_interval {
        config.scan.poll_interval_secs = interval;
    }
    if let Some(timeout) = poll_timeout {
        config.scan.poll_timeout_secs = timeout;
    }

    if !quiet {
        println!(
            "{} {}  <->  {}:{}",
            style("sync").green().bold(),
            style(config.replica.local_root.display()).cyan(),
            style(config.connection.endpoint()).cyan(),
            style(&config.replica.remote_root).cyan()
        );
        if options.dry_run {
            println!("{}", style("dry-run: no files will be changed").yellow());
        }
    }

    info!("driftsync v{} starting", env!("CARGO_PKG_VERSION"));
    let transport = SshTransport::new(
        config.connection.clone(),
        RetryPolicy::from_config(&config.retry),
    );
    transport
        .connect()
        .await
        .with_context(|| format!("cannot connect to {}", config.connection.endpoint()))?;

    let orchestrator = Orchestrator::new(&transport, &config);
    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, finishing the in-flight batch then stopping");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let mut prompter = prompt::ConsolePrompter;
    let result = orchestrator.run(options, &mut prompter).await;
    transport.disconnect().await;

    match result {
        Ok(summary) => {
            if !quiet {
                print_summary(&summary);
            }
            Ok(())
        }
        Err(error) => Err(error).context("sync failed; progress saved, next run will resume"),
    }
}

fn print_summary(summary: &RunSummary) {
    if !summary.ran {
        return;
    }
    println!();
    println!("{}", style("summary").bold());
    println!("  pushed     : {}", summary.pushed);
    println!("  pulled     : {}", summary.pulled);
    println!("  del remote : {}", summary.deleted_remote);
    println!("  del local  : {}", summary.deleted_local);
    println!("  conflicts  : {}", summary.conflicts);

    if summary.conflicts > 0 {
        println!();
        println!(
            "{} look for *.conflict files in the local tree, merge manually,",
            style("conflicts detected:").yellow().bold()
        );
        println!("  delete the artifacts, then run sync again.");
    }
}

fn init_logging(debug: bool, quiet: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap();

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}
