//! Run sequencing and the failure/resume policy
//!
//! One run walks INIT, SCANNING, PLANNING, EXECUTING, FINALIZING, DONE.
//! Any failure lands in CRASHED after a best-effort persist of the
//! baseline and ledger, so the next invocation resumes from the last
//! checkpoint. Cancellation is honored only between coarse steps; an
//! in-flight batch always runs to completion or hard failure.

use crate::batch::BatchPlanner;
use crate::confirm::ConfirmationProvider;
use crate::conflict::ConflictResolver;
use crate::delete::DeletionHandler;
use crate::plan::{reconcile, SyncMode, SyncPlan};
use crate::transfer::BatchTransfer;
use driftsync_config::SyncConfig;
use driftsync_remote::Transport;
use driftsync_scan::{scan_local, IgnoreSet, RemoteScanner};
use driftsync_state::{ProgressLedger, SyncState};
use driftsync_types::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Coarse phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Pre-flight and state loading
    Init,
    /// Snapshot capture on both sides
    Scanning,
    /// Reconciliation
    Planning,
    /// Push, pull, delete, conflict phases
    Executing,
    /// Final persist and ledger clear
    Finalizing,
    /// Clean completion
    Done,
    /// Terminated by failure or interrupt; progress persisted
    Crashed,
}

/// Per-run options from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Compute and report the plan without mutating anything
    pub dry_run: bool,
    /// Discard baseline and ledger, replan from scratch
    pub force: bool,
    /// Direction restriction
    pub mode: SyncMode,
}

/// What a run planned and acted on
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    /// Files planned for push
    pub pushed: usize,
    /// Files planned for pull
    pub pulled: usize,
    /// Files planned for remote deletion
    pub deleted_remote: usize,
    /// Files planned for local deletion
    pub deleted_local: usize,
    /// Conflicts detected
    pub conflicts: usize,
    /// False when the pre-flight check stopped the run before planning
    pub ran: bool,
}

impl RunSummary {
    fn from_plan(plan: &SyncPlan) -> Self {
        Self {
            pushed: plan.to_push.len(),
            pulled: plan.to_pull.len(),
            deleted_remote: plan.to_delete_remote.len(),
            deleted_local: plan.to_delete_local.len(),
            conflicts: plan.conflicts.len(),
            ran: true,
        }
    }
}

/// Sequences one full synchronization run
pub struct Orchestrator<'a> {
    transport: &'a dyn Transport,
    config: &'a SyncConfig,
    cancel: Arc<AtomicBool>,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator bound to a transport and configuration
    pub fn new(transport: &'a dyn Transport, config: &'a SyncConfig) -> Self {
        Self {
            transport,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag an interrupt handler can set; checked between coarse steps
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Execute one run end to end.
    ///
    /// On failure the baseline and ledger are persisted best-effort
    /// before the error is returned, so the next run resumes.
    pub async fn run(
        &self,
        options: RunOptions,
        confirmer: &mut dyn ConfirmationProvider,
    ) -> Result<RunSummary> {
        let replica = &self.config.replica;
        info!(
            "sync {} <-> {}:{}",
            replica.local_root.display(),
            self.config.connection.endpoint(),
            replica.remote_root
        );
        if options.dry_run {
            info!("dry-run: no files will be changed");
        }

        let ignore = IgnoreSet::load(&replica.ignore_path());
        info!("{} ignore pattern(s) loaded", ignore.len());

        let resolver = ConflictResolver::new(self.transport, self.config);
        if !resolver.preflight(options.dry_run, confirmer)? {
            return Ok(RunSummary::default());
        }

        let (mut state, mut ledger) = if options.force {
            info!("force: discarding baseline and ledger");
            (SyncState::default(), ProgressLedger::default())
        } else {
            (
                SyncState::load(&replica.state_path()),
                ProgressLedger::load(&replica.progress_path()),
            )
        };
        if !ledger.is_empty() {
            info!(
                "resuming previous session (already pushed={}, pulled={})",
                ledger.pushed.len(),
                ledger.pulled.len()
            );
        }

        let result = self
            .run_phases(options, confirmer, &resolver, &ignore, &mut state, &mut ledger)
            .await;

        if let Err(error) = &result {
            if !options.dry_run {
                if let Err(save_error) = state.save(&replica.state_path()) {
                    warn!("cannot persist baseline after failure: {save_error}");
                }
                if let Err(save_error) = ledger.save(&replica.progress_path()) {
                    warn!("cannot persist ledger after failure: {save_error}");
                }
            }
            warn!("sync failed ({error}); progress saved, next run will resume");
        }
        result
    }

    async fn run_phases(
        &self,
        options: RunOptions,
        confirmer: &mut dyn ConfirmationProvider,
        resolver: &ConflictResolver<'_>,
        ignore: &IgnoreSet,
        state: &mut SyncState,
        ledger: &mut ProgressLedger,
    ) -> Result<RunSummary> {
        let replica = &self.config.replica;

        // SCANNING: fire the remote job, walk locally while it runs.
        let scanner = RemoteScanner::new(self.transport, self.config);
        let job = scanner.start(ignore).await?;

        info!("scanning local files");
        let local_snapshot = scan_local(replica, ignore)?;
        info!("{} local file(s) found", local_snapshot.len());

        info!(
            "waiting for remote scan (poll every {}s, timeout {}s)",
            self.config.scan.poll_interval_secs, self.config.scan.poll_timeout_secs
        );
        let remote_result = scanner.wait(&job, ignore).await;
        scanner.cleanup(&job).await;
        let remote_snapshot = remote_result?;
        info!("{} remote file(s) after filtering", remote_snapshot.len());
        self.check_cancel()?;

        // PLANNING
        let mut plan = reconcile(&local_snapshot, &remote_snapshot, state, ledger, options.mode);
        plan.strip_vcs_deletions();
        let summary = RunSummary::from_plan(&plan);
        info!(
            "plan: push={} pull={} del_remote={} del_local={} conflicts={}",
            summary.pushed,
            summary.pulled,
            summary.deleted_remote,
            summary.deleted_local,
            summary.conflicts
        );

        if plan.is_empty() {
            info!("nothing to do, already in sync");
            if !options.dry_run {
                // Race adoption may have extended the baseline.
                state.save(&replica.state_path())?;
                ProgressLedger::clear(&replica.progress_path());
            }
            return Ok(summary);
        }

        // EXECUTING: push, pull, deletions, conflicts, in that order.
        let planner = BatchPlanner::from_config(&self.config.transfer);
        let transfer = BatchTransfer::new(self.transport, self.config);

        let push_batches = planner.split(&plan.to_push, &local_snapshot);
        for (index, batch) in push_batches.iter().enumerate() {
            self.check_cancel()?;
            info!("push batch {}/{}: {} file(s)", index + 1, push_batches.len(), batch.len());
            transfer
                .push_batch(batch, options.dry_run, state, ledger)
                .await?;
        }

        let pull_batches = planner.split(&plan.to_pull, &remote_snapshot);
        for (index, batch) in pull_batches.iter().enumerate() {
            self.check_cancel()?;
            info!("pull batch {}/{}: {} file(s)", index + 1, pull_batches.len(), batch.len());
            transfer
                .pull_batch(batch, options.dry_run, state, ledger, &remote_snapshot)
                .await?;
        }

        self.check_cancel()?;
        let deletions = DeletionHandler::new(self.transport, self.config);
        deletions
            .delete_remote(&plan.to_delete_remote, options.dry_run, state, ledger, confirmer)
            .await?;

        self.check_cancel()?;
        deletions.delete_local(&plan.to_delete_local, options.dry_run, state, ledger, confirmer)?;

        self.check_cancel()?;
        for conflict in &plan.conflicts {
            resolver
                .resolve(&conflict.rel, &conflict.reason, options.dry_run)
                .await?;
        }

        // FINALIZING
        if !options.dry_run {
            state.save(&replica.state_path())?;
            ProgressLedger::clear(&replica.progress_path());
        }
        info!("sync complete");
        Ok(summary)
    }
}
