//! Pass queries.
//!
//! `update_tag` is one sequence across all passes: every content-affecting
//! write sets it to `MAX(update_tag) + 1` inside the same statement, so a
//! device asking "what changed since T" gets a meaningful answer across
//! all of its passes.

use stampcard_core::db::unix_timestamp;

use super::db::{DatabaseError, PassDatabase};
use super::models::{Pass, PassStatus, WalletKind};

const NEXT_UPDATE_TAG: &str = "(SELECT COALESCE(MAX(update_tag), 0) + 1 FROM passes)";

/// Parameters for inserting a new pass.
pub struct NewPass<'a> {
    pub id: &'a str,
    pub owner_customer_id: &'a str,
    pub offer_id: &'a str,
    pub wallet_kind: WalletKind,
    pub required_count: i64,
    pub authentication_token: &'a str,
}

/// A progress write against an active pass.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub earned_count: i64,
    pub new_status: PassStatus,
    pub completed_at: Option<i64>,
    pub scheduled_expiration_at: Option<i64>,
}

impl PassDatabase {
    // =========================================================================
    // Pass CRUD
    // =========================================================================

    /// Insert a new active pass.
    ///
    /// A customer holds at most one live pass per offer. When one already
    /// exists the insert is skipped and the live pass is returned instead,
    /// so callers compare ids to tell the two apart.
    pub async fn create_pass(&self, params: &NewPass<'_>) -> Result<Pass, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(&format!(
            "INSERT INTO passes (id, owner_customer_id, offer_id, wallet_kind, status, \
             earned_count, required_count, authentication_token, update_tag, \
             expiration_notified, created_at, last_updated_at) \
             VALUES (?, ?, ?, ?, 'active', 0, ?, ?, {NEXT_UPDATE_TAG}, 0, ?, ?) \
             ON CONFLICT DO NOTHING"
        ))
        .bind(params.id)
        .bind(params.owner_customer_id)
        .bind(params.offer_id)
        .bind(params.wallet_kind.as_str())
        .bind(params.required_count)
        .bind(params.authentication_token)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        if result.rows_affected() > 0 {
            return self.get_pass(params.id).await;
        }

        self.find_live_pass(params.owner_customer_id, params.offer_id)
            .await?
            .ok_or_else(|| {
                DatabaseError::Query(format!("Pass {} conflicts with an existing row", params.id))
            })
    }

    pub async fn get_pass(&self, id: &str) -> Result<Pass, DatabaseError> {
        self.find_pass(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Pass {id}")))
    }

    pub async fn find_pass(&self, id: &str) -> Result<Option<Pass>, DatabaseError> {
        let pass = sqlx::query_as::<_, Pass>("SELECT * FROM passes WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(pass)
    }

    /// The live (active or completed) pass a customer holds for an offer.
    pub async fn find_live_pass(
        &self,
        owner_customer_id: &str,
        offer_id: &str,
    ) -> Result<Option<Pass>, DatabaseError> {
        let pass = sqlx::query_as::<_, Pass>(
            "SELECT * FROM passes WHERE owner_customer_id = ? AND offer_id = ? \
             AND status IN ('active', 'completed') ORDER BY created_at DESC LIMIT 1",
        )
        .bind(owner_customer_id)
        .bind(offer_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(pass)
    }

    pub async fn count_passes_by_status(
        &self,
        status: PassStatus,
    ) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM passes WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.pool())
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Guarded transitions
    // =========================================================================

    /// Apply a progress update if the pass is still active.
    ///
    /// Returns `false` when the precondition no longer holds.
    pub async fn apply_progress(
        &self,
        id: &str,
        update: &ProgressUpdate,
    ) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(&format!(
            "UPDATE passes SET earned_count = ?, status = ?, \
             completed_at = COALESCE(?, completed_at), \
             scheduled_expiration_at = COALESCE(?, scheduled_expiration_at), \
             update_tag = {NEXT_UPDATE_TAG}, last_updated_at = ? \
             WHERE id = ? AND status = 'active'"
        ))
        .bind(update.earned_count)
        .bind(update.new_status.as_str())
        .bind(update.completed_at)
        .bind(update.scheduled_expiration_at)
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// completed -> expired.
    pub async fn expire_pass(&self, id: &str, now: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(&format!(
            "UPDATE passes SET status = 'expired', expired_at = ?, \
             update_tag = {NEXT_UPDATE_TAG}, last_updated_at = ? \
             WHERE id = ? AND status = 'completed'"
        ))
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Claim the single expiration notice for an expired pass.
    ///
    /// Only one caller ever sees `true` for a given pass.
    pub async fn claim_expiration_notice(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE passes SET expiration_notified = 1 \
             WHERE id = ? AND status = 'expired' AND expiration_notified = 0",
        )
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// expired -> deleted. The row stays; only `deleted_at` marks it.
    ///
    /// The pass's device registrations are removed in the same transaction.
    pub async fn soft_delete_pass(&self, id: &str, now: i64) -> Result<bool, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(&format!(
            "UPDATE passes SET status = 'deleted', deleted_at = ?, \
             update_tag = {NEXT_UPDATE_TAG}, last_updated_at = ? \
             WHERE id = ? AND status = 'expired'"
        ))
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM device_registrations WHERE pass_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    // =========================================================================
    // Sweep candidates
    // =========================================================================

    /// Completed passes whose deadline has passed. Unscheduled passes fall
    /// back to `completed_at + grace_secs`.
    pub async fn passes_due_for_expiry(
        &self,
        now: i64,
        grace_secs: i64,
    ) -> Result<Vec<Pass>, DatabaseError> {
        let passes = sqlx::query_as::<_, Pass>(
            "SELECT * FROM passes WHERE status = 'completed' \
             AND COALESCE(scheduled_expiration_at, completed_at + ?) <= ? ORDER BY id",
        )
        .bind(grace_secs)
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        Ok(passes)
    }

    /// Expired passes whose expiration notice was never claimed.
    pub async fn passes_pending_expiry_notice(&self) -> Result<Vec<Pass>, DatabaseError> {
        let passes = sqlx::query_as::<_, Pass>(
            "SELECT * FROM passes WHERE status = 'expired' AND expiration_notified = 0 \
             ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(passes)
    }

    /// Expired passes past the retention window.
    pub async fn passes_due_for_deletion(
        &self,
        now: i64,
        retention_secs: i64,
    ) -> Result<Vec<Pass>, DatabaseError> {
        let passes = sqlx::query_as::<_, Pass>(
            "SELECT * FROM passes WHERE status = 'expired' \
             AND expired_at IS NOT NULL AND expired_at + ? <= ? ORDER BY id",
        )
        .bind(retention_secs)
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        Ok(passes)
    }

    // =========================================================================
    // Update protocol
    // =========================================================================

    /// `(pass_id, update_tag)` of the device's passes changed after `since`,
    /// oldest change first.
    pub async fn passes_updated_since(
        &self,
        device_id: &str,
        since: i64,
    ) -> Result<Vec<(String, i64)>, DatabaseError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT p.id, p.update_tag FROM passes p \
             JOIN device_registrations r ON r.pass_id = p.id \
             WHERE r.device_id = ? AND p.update_tag > ? \
             ORDER BY p.update_tag",
        )
        .bind(device_id)
        .bind(since)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use stampcard_core::db::SECONDS_PER_DAY;

    async fn test_db() -> PassDatabase {
        PassDatabase::open_in_memory().await.unwrap()
    }

    fn new_pass<'a>(id: &'a str, required: i64) -> NewPass<'a> {
        NewPass {
            id,
            owner_customer_id: id,
            offer_id: "offer-1",
            wallet_kind: WalletKind::Apple,
            required_count: required,
            authentication_token: "0123456789abcdef0123456789abcdef",
        }
    }

    const COMPLETE: ProgressUpdate = ProgressUpdate {
        earned_count: 3,
        new_status: PassStatus::Completed,
        completed_at: Some(1_000),
        scheduled_expiration_at: Some(1_000 + 30 * SECONDS_PER_DAY),
    };

    #[tokio::test]
    async fn update_tags_are_global_and_increasing() {
        let db = test_db().await;
        let a = db.create_pass(&new_pass("a", 3)).await.unwrap();
        let b = db.create_pass(&new_pass("b", 3)).await.unwrap();
        assert!(b.update_tag > a.update_tag);

        db.apply_progress("a", &ProgressUpdate {
            earned_count: 1,
            new_status: PassStatus::Active,
            completed_at: None,
            scheduled_expiration_at: None,
        })
        .await
        .unwrap();
        let a = db.get_pass("a").await.unwrap();
        assert!(a.update_tag > b.update_tag);
        assert_eq!(a.earned_count, 1);
    }

    #[tokio::test]
    async fn progress_requires_active() {
        let db = test_db().await;
        db.create_pass(&new_pass("p", 3)).await.unwrap();

        assert!(db.apply_progress("p", &COMPLETE).await.unwrap());
        assert!(!db.apply_progress("p", &COMPLETE).await.unwrap());

        let pass = db.get_pass("p").await.unwrap();
        assert_eq!(pass.status(), Some(PassStatus::Completed));
        assert_eq!(pass.completed_at, Some(1_000));
    }

    #[tokio::test]
    async fn transitions_are_compare_and_swap() {
        let db = test_db().await;
        db.create_pass(&new_pass("p", 3)).await.unwrap();

        assert!(!db.expire_pass("p", 10).await.unwrap(), "active cannot expire");
        db.apply_progress("p", &COMPLETE).await.unwrap();
        assert!(db.expire_pass("p", 10).await.unwrap());
        assert!(!db.expire_pass("p", 11).await.unwrap());

        assert!(db.claim_expiration_notice("p").await.unwrap());
        assert!(!db.claim_expiration_notice("p").await.unwrap());

        assert!(db.soft_delete_pass("p", 20).await.unwrap());
        assert!(!db.soft_delete_pass("p", 21).await.unwrap());
        let pass = db.get_pass("p").await.unwrap();
        assert_eq!(pass.status(), Some(PassStatus::Deleted));
        assert_eq!(pass.deleted_at, Some(20));
        assert_eq!(pass.expired_at, Some(10));
    }

    #[tokio::test]
    async fn expiry_candidates_respect_deadline() {
        let db = test_db().await;
        db.create_pass(&new_pass("p", 3)).await.unwrap();
        db.apply_progress("p", &COMPLETE).await.unwrap();
        let deadline = COMPLETE.scheduled_expiration_at.unwrap();

        assert!(db.passes_due_for_expiry(deadline - 1, 0).await.unwrap().is_empty());
        assert_eq!(db.passes_due_for_expiry(deadline, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deletion_candidates_respect_retention() {
        let db = test_db().await;
        db.create_pass(&new_pass("p", 3)).await.unwrap();
        db.apply_progress("p", &COMPLETE).await.unwrap();
        db.expire_pass("p", 5_000).await.unwrap();

        let retention = 90 * SECONDS_PER_DAY;
        let early = db.passes_due_for_deletion(5_000 + retention - 1, retention).await;
        assert!(early.unwrap().is_empty());
        let due = db.passes_due_for_deletion(5_000 + retention, retention).await;
        assert_eq!(due.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_live_pass_ignores_finished() {
        let db = test_db().await;
        db.create_pass(&new_pass("p", 3)).await.unwrap();
        assert!(db.find_live_pass("p", "offer-1").await.unwrap().is_some());

        db.apply_progress("p", &COMPLETE).await.unwrap();
        db.expire_pass("p", 1).await.unwrap();
        assert!(db.find_live_pass("p", "offer-1").await.unwrap().is_none());
        assert_eq!(db.count_passes_by_status(PassStatus::Expired).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn one_live_pass_per_customer_and_offer() {
        let db = test_db().await;
        let first = db.create_pass(&new_pass("p", 3)).await.unwrap();
        let again = db
            .create_pass(&NewPass {
                id: "q",
                ..new_pass("p", 3)
            })
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert!(db.find_pass("q").await.unwrap().is_none());

        db.apply_progress("p", &COMPLETE).await.unwrap();
        db.expire_pass("p", 1).await.unwrap();
        let next = db
            .create_pass(&NewPass {
                id: "q",
                ..new_pass("p", 3)
            })
            .await
            .unwrap();
        assert_eq!(next.id, "q");
    }

    #[tokio::test]
    async fn get_missing_pass_is_not_found() {
        let db = test_db().await;
        let err = db.get_pass("nope").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }
}
