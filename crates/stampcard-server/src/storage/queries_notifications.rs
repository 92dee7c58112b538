//! Notification ledger queries.
//!
//! The ledger only backs the per-pass daily ceiling; rows older than a day
//! are pruned by the sweep.

use stampcard_core::db::day_bucket;

use super::db::{DatabaseError, PassDatabase};
use super::models::NotificationRecord;

impl PassDatabase {
    /// Reserve a ledger slot for a notification sent at `sent_at`.
    ///
    /// The row is only inserted while fewer than `limit` notifications exist
    /// for the pass at or after `window_start`. Check and insert are one
    /// statement, so concurrent callers cannot both take the last slot.
    /// Returns `false` when the ceiling is already reached.
    pub async fn reserve_notification(
        &self,
        pass_id: &str,
        sent_at: i64,
        window_start: i64,
        limit: u32,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO notifications (pass_id, sent_at, day_bucket) \
             SELECT ?, ?, ? WHERE \
             (SELECT COUNT(*) FROM notifications WHERE pass_id = ? AND sent_at >= ?) < ?",
        )
        .bind(pass_id)
        .bind(sent_at)
        .bind(day_bucket(sent_at))
        .bind(pass_id)
        .bind(window_start)
        .bind(i64::from(limit))
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn notifications_for_pass(
        &self,
        pass_id: &str,
    ) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, NotificationRecord>(
            "SELECT * FROM notifications WHERE pass_id = ? ORDER BY sent_at",
        )
        .bind(pass_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Delete ledger rows sent before `cutoff`. Returns the number removed.
    pub async fn prune_notifications_before(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM notifications WHERE sent_at < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
