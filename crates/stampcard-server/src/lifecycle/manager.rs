//! Lifecycle manager: issuance, progress events and notification policy.

use std::sync::Arc;

use rand::RngCore;
use stampcard_core::config::LifecycleConfig;
use stampcard_core::db::{SECONDS_PER_DAY, days_to_secs, unix_timestamp};
use tracing::{debug, info, instrument, warn};

use super::LifecycleError;
use crate::push::{BatchOutcome, PushDispatcher};
use crate::registry::DeviceRegistry;
use crate::storage::{NewPass, Pass, PassDatabase, PassStatus, ProgressUpdate, WalletKind};

/// Random bytes in an authentication token (hex encoded to 32 chars).
const AUTH_TOKEN_BYTES: usize = 16;

/// Time windows and notification ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub grace_days: u32,
    pub retention_days: u32,
    pub max_notifications_per_day: u32,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::from(&LifecycleConfig::default())
    }
}

impl From<&LifecycleConfig> for LifecyclePolicy {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            grace_days: config.grace_days,
            retention_days: config.retention_days,
            max_notifications_per_day: config.max_notifications_per_day,
        }
    }
}

/// Result of a progress event.
#[derive(Debug, Clone)]
pub enum ProgressOutcome {
    /// Earned count changed, pass still active.
    Updated(Pass),
    /// The event reached the required count.
    Completed(Pass),
    /// The clamped count equals the stored one; nothing was written.
    Unchanged(Pass),
}

impl ProgressOutcome {
    pub const fn pass(&self) -> &Pass {
        match self {
            Self::Updated(pass) | Self::Completed(pass) | Self::Unchanged(pass) => pass,
        }
    }

    pub fn into_pass(self) -> Pass {
        match self {
            Self::Updated(pass) | Self::Completed(pass) | Self::Unchanged(pass) => pass,
        }
    }
}

/// Result of a notification attempt for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent(BatchOutcome),
    /// The rolling daily ceiling was reached.
    RateLimited,
    /// No device is subscribed to the pass.
    NoDevices,
}

/// Owns every pass state transition.
pub struct LifecycleManager {
    db: PassDatabase,
    registry: DeviceRegistry,
    push: Arc<dyn PushDispatcher>,
    policy: LifecyclePolicy,
}

impl LifecycleManager {
    pub fn new(db: PassDatabase, push: Arc<dyn PushDispatcher>, policy: LifecyclePolicy) -> Self {
        Self {
            registry: DeviceRegistry::new(db.clone()),
            db,
            push,
            policy,
        }
    }

    pub const fn db(&self) -> &PassDatabase {
        &self.db
    }

    pub const fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Issue a pass, or return the live pass the customer already holds for
    /// the offer.
    #[instrument(skip(self))]
    pub async fn issue_pass(
        &self,
        owner_customer_id: &str,
        offer_id: &str,
        wallet_kind: WalletKind,
        required_count: i64,
    ) -> Result<Pass, LifecycleError> {
        if owner_customer_id.trim().is_empty() || offer_id.trim().is_empty() {
            return Err(LifecycleError::InvalidInput(
                "owner and offer ids are required".to_string(),
            ));
        }

        if let Some(existing) = self.db.find_live_pass(owner_customer_id, offer_id).await? {
            debug!(pass_id = %existing.id, "Customer already holds a live pass");
            return Ok(existing);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let token = generate_auth_token();
        let pass = self
            .db
            .create_pass(&NewPass {
                id: &id,
                owner_customer_id,
                offer_id,
                wallet_kind,
                required_count: required_count.max(1),
                authentication_token: &token,
            })
            .await?;

        if pass.id != id {
            debug!(pass_id = %pass.id, "Concurrent issue resolved to the live pass");
            return Ok(pass);
        }

        info!(
            pass_id = %pass.id,
            wallet = %wallet_kind,
            required = pass.required_count,
            "Pass issued"
        );
        Ok(pass)
    }

    /// Set the earned count of an active pass.
    pub async fn record_progress(
        &self,
        pass_id: &str,
        earned_count: i64,
    ) -> Result<ProgressOutcome, LifecycleError> {
        self.record_progress_at(pass_id, earned_count, unix_timestamp())
            .await
    }

    /// [`record_progress`](Self::record_progress) with an explicit clock.
    ///
    /// The count is clamped to `[0, required]`. Reaching the required count
    /// completes the pass and schedules its expiration `grace_days` later.
    /// Subscribed devices are notified after the write commits; delivery
    /// problems are logged and never undo the transition.
    #[instrument(skip(self))]
    pub async fn record_progress_at(
        &self,
        pass_id: &str,
        earned_count: i64,
        now: i64,
    ) -> Result<ProgressOutcome, LifecycleError> {
        let pass = self.db.get_pass(pass_id).await?;
        let status = parse_status(&pass)?;
        if status != PassStatus::Active {
            return Err(LifecycleError::NotActive {
                pass_id: pass.id,
                status,
            });
        }

        let earned = earned_count.clamp(0, pass.required_count);
        if earned == pass.earned_count {
            return Ok(ProgressOutcome::Unchanged(pass));
        }

        let completes = earned >= pass.required_count;
        let update = ProgressUpdate {
            earned_count: earned,
            new_status: if completes {
                PassStatus::Completed
            } else {
                PassStatus::Active
            },
            completed_at: completes.then_some(now),
            scheduled_expiration_at: completes
                .then(|| now + days_to_secs(self.policy.grace_days)),
        };

        if !self.db.apply_progress(pass_id, &update).await? {
            let current = self.db.get_pass(pass_id).await?;
            return Err(LifecycleError::NotActive {
                status: parse_status(&current)?,
                pass_id: current.id,
            });
        }

        let updated = self.db.get_pass(pass_id).await?;
        info!(
            pass_id,
            earned,
            required = updated.required_count,
            update_tag = updated.update_tag,
            completed = completes,
            "Progress recorded"
        );

        self.notify_best_effort(pass_id, now).await;

        Ok(if completes {
            ProgressOutcome::Completed(updated)
        } else {
            ProgressOutcome::Updated(updated)
        })
    }

    /// Add `delta` stamps (may be negative) to an active pass.
    pub async fn add_stamps(
        &self,
        pass_id: &str,
        delta: i64,
    ) -> Result<ProgressOutcome, LifecycleError> {
        let pass = self.db.get_pass(pass_id).await?;
        self.record_progress(pass_id, pass.earned_count.saturating_add(delta))
            .await
    }

    /// Wake every device subscribed to the pass, honouring the rolling
    /// daily ceiling. Invalid push tokens are pruned.
    ///
    /// The ledger slot is reserved before the push goes out.
    pub async fn notify_pass(
        &self,
        pass_id: &str,
        now: i64,
    ) -> Result<NotifyOutcome, LifecycleError> {
        let tokens = self.db.push_tokens_for_pass(pass_id).await?;
        if tokens.is_empty() {
            return Ok(NotifyOutcome::NoDevices);
        }

        let window_start = now - SECONDS_PER_DAY + 1;
        let reserved = self
            .db
            .reserve_notification(
                pass_id,
                now,
                window_start,
                self.policy.max_notifications_per_day,
            )
            .await?;
        if !reserved {
            debug!(pass_id, "Daily notification ceiling reached");
            return Ok(NotifyOutcome::RateLimited);
        }

        let batch = self.push.notify_batch(&tokens).await;

        if !batch.invalid_tokens.is_empty() {
            self.registry.prune_push_tokens(&batch.invalid_tokens).await?;
        }

        debug!(
            pass_id,
            delivered = batch.delivered,
            failed = batch.failed,
            "Devices notified"
        );
        Ok(NotifyOutcome::Sent(batch))
    }

    pub(super) async fn notify_best_effort(&self, pass_id: &str, now: i64) {
        if let Err(e) = self.notify_pass(pass_id, now).await {
            warn!(pass_id, error = %e, "Notification failed");
        }
    }
}

fn parse_status(pass: &Pass) -> Result<PassStatus, LifecycleError> {
    pass.status().ok_or_else(|| {
        LifecycleError::InvalidInput(format!("pass {} has unknown status {}", pass.id, pass.status))
    })
}

/// 32 hex chars from the thread-local CSPRNG.
fn generate_auth_token() -> String {
    let mut bytes = [0u8; AUTH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
