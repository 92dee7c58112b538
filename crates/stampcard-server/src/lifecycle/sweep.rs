//! Time-based transitions: completed -> expired -> deleted.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stampcard_core::db::{SECONDS_PER_DAY, days_to_secs, unix_timestamp};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{LifecycleError, LifecycleManager, LifecyclePolicy};

/// Parameters of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOptions {
    /// Fallback deadline for completed passes with no scheduled expiration.
    pub grace_days: u32,
    /// How long an expired pass is kept before it is soft deleted.
    pub retention_days: u32,
    /// Count what would change without writing anything.
    pub dry_run: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self::from(&LifecyclePolicy::default())
    }
}

impl From<&LifecyclePolicy> for SweepOptions {
    fn from(policy: &LifecyclePolicy) -> Self {
        Self {
            grace_days: policy.grace_days,
            retention_days: policy.retention_days,
            dry_run: false,
        }
    }
}

/// What one sweep did (or would do, for a dry run).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: u64,
    pub notified: u64,
    pub cleaned: u64,
    pub errors: u64,
    pub dry_run: bool,
}

impl SweepReport {
    pub const fn is_empty(&self) -> bool {
        self.expired == 0 && self.notified == 0 && self.cleaned == 0 && self.errors == 0
    }
}

impl LifecycleManager {
    pub async fn sweep(&self, options: &SweepOptions) -> Result<SweepReport, LifecycleError> {
        self.sweep_at(unix_timestamp(), options).await
    }

    /// Run one sweep as of `now`.
    ///
    /// Every transition is a compare-and-swap, so a pass another sweep (or a
    /// live update) already moved is skipped rather than processed twice.
    /// Failures on individual passes are counted in `errors` and do not stop
    /// the sweep; failing to list candidates does.
    pub async fn sweep_at(
        &self,
        now: i64,
        options: &SweepOptions,
    ) -> Result<SweepReport, LifecycleError> {
        let db = self.db();
        let grace_secs = days_to_secs(options.grace_days);
        let retention_secs = days_to_secs(options.retention_days);
        let mut report = SweepReport {
            dry_run: options.dry_run,
            ..SweepReport::default()
        };

        // Phase 1: expire completed passes past their deadline.
        let due = db.passes_due_for_expiry(now, grace_secs).await?;
        if options.dry_run {
            report.expired = due.len() as u64;
        } else {
            for pass in &due {
                match db.expire_pass(&pass.id, now).await {
                    Ok(true) => report.expired += 1,
                    Ok(false) => debug!(pass_id = %pass.id, "Pass already moved, skipping expiry"),
                    Err(e) => {
                        warn!(pass_id = %pass.id, error = %e, "Failed to expire pass");
                        report.errors += 1;
                    }
                }
            }
        }

        // Phase 2: one expiration notice per expired pass.
        let pending = db.passes_pending_expiry_notice().await?;
        if options.dry_run {
            report.notified = (due.len() + pending.len()) as u64;
        } else {
            for pass in &pending {
                match db.claim_expiration_notice(&pass.id).await {
                    Ok(true) => {
                        report.notified += 1;
                        self.notify_best_effort(&pass.id, now).await;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(pass_id = %pass.id, error = %e, "Failed to claim expiration notice");
                        report.errors += 1;
                    }
                }
            }
        }

        // Phase 3: soft delete expired passes past retention, with their
        // registrations.
        let stale = db.passes_due_for_deletion(now, retention_secs).await?;
        if options.dry_run {
            report.cleaned = stale.len() as u64;
        } else {
            for pass in &stale {
                match db.soft_delete_pass(&pass.id, now).await {
                    Ok(true) => report.cleaned += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(pass_id = %pass.id, error = %e, "Failed to delete pass");
                        report.errors += 1;
                    }
                }
            }

            match db.prune_notifications_before(now - SECONDS_PER_DAY).await {
                Ok(removed) if removed > 0 => debug!(removed, "Pruned notification ledger"),
                Err(e) => {
                    warn!(error = %e, "Failed to prune notification ledger");
                    report.errors += 1;
                }
                _ => {}
            }
        }

        if !report.is_empty() {
            info!(
                expired = report.expired,
                notified = report.notified,
                cleaned = report.cleaned,
                errors = report.errors,
                dry_run = report.dry_run,
                "Lifecycle sweep completed"
            );
        }

        Ok(report)
    }
}

/// Run [`LifecycleManager::sweep`] every `interval` until the task is
/// aborted. The first sweep happens one interval after spawning.
pub fn spawn_sweep_loop(
    manager: Arc<LifecycleManager>,
    interval: Duration,
    options: SweepOptions,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip first immediate tick
        loop {
            ticker.tick().await;
            if let Err(e) = manager.sweep(&options).await {
                warn!(error = %e, "Background lifecycle sweep failed");
            }
        }
    })
}
