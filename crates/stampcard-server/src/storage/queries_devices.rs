//! Device registration queries.

use stampcard_core::db::unix_timestamp;

use super::db::{DatabaseError, PassDatabase};
use super::models::DeviceRegistration;

impl PassDatabase {
    // =========================================================================
    // Device registration queries
    // =========================================================================

    /// Register a device for a pass, or refresh an existing registration.
    ///
    /// `registered_at` of an existing row is left untouched. The push token
    /// is refreshed on every row of the device, since a device has a single
    /// token at any time. Returns `true` if a new row was created.
    pub async fn upsert_registration(
        &self,
        device_id: &str,
        pass_id: &str,
        push_token: &str,
    ) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT registered_at FROM device_registrations WHERE device_id = ? AND pass_id = ?",
        )
        .bind(device_id)
        .bind(pass_id)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO device_registrations \
             (device_id, pass_id, push_token, registered_at, last_checked_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(device_id, pass_id) DO UPDATE SET \
             push_token = excluded.push_token, last_checked_at = excluded.last_checked_at",
        )
        .bind(device_id)
        .bind(pass_id)
        .bind(push_token)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE device_registrations SET push_token = ? WHERE device_id = ?")
            .bind(push_token)
            .bind(device_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(existing.is_none())
    }

    /// Remove one device/pass registration.
    ///
    /// Returns `true` if a row was deleted.
    pub async fn delete_registration(
        &self,
        device_id: &str,
        pass_id: &str,
    ) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("DELETE FROM device_registrations WHERE device_id = ? AND pass_id = ?")
                .bind(device_id)
                .bind(pass_id)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every registration carrying one of `push_tokens`.
    pub async fn delete_registrations_by_push_token(
        &self,
        push_tokens: &[String],
    ) -> Result<u64, DatabaseError> {
        if push_tokens.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;
        let mut removed = 0;
        for token in push_tokens {
            let result = sqlx::query("DELETE FROM device_registrations WHERE push_token = ?")
                .bind(token)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;

        Ok(removed)
    }

    /// Whether the device has at least one registration.
    pub async fn device_exists(&self, device_id: &str) -> Result<bool, DatabaseError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM device_registrations WHERE device_id = ?")
                .bind(device_id)
                .fetch_one(self.pool())
                .await?;

        Ok(count > 0)
    }

    /// Record that the device just polled for updates.
    pub async fn touch_device(&self, device_id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE device_registrations SET last_checked_at = ? WHERE device_id = ?")
            .bind(unix_timestamp())
            .bind(device_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    pub async fn get_registration(
        &self,
        device_id: &str,
        pass_id: &str,
    ) -> Result<Option<DeviceRegistration>, DatabaseError> {
        let row = sqlx::query_as::<_, DeviceRegistration>(
            "SELECT * FROM device_registrations WHERE device_id = ? AND pass_id = ?",
        )
        .bind(device_id)
        .bind(pass_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    pub async fn registrations_for_pass(
        &self,
        pass_id: &str,
    ) -> Result<Vec<DeviceRegistration>, DatabaseError> {
        let rows = sqlx::query_as::<_, DeviceRegistration>(
            "SELECT * FROM device_registrations WHERE pass_id = ? ORDER BY registered_at",
        )
        .bind(pass_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Distinct push tokens subscribed to a pass.
    pub async fn push_tokens_for_pass(&self, pass_id: &str) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT push_token FROM device_registrations WHERE pass_id = ? \
             ORDER BY push_token",
        )
        .bind(pass_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(|(token,)| token).collect())
    }
}
