//! Device registry: which devices follow which passes.
//!
//! Devices prove access to a pass with its authentication token. Every
//! failure mode (missing pass, deleted pass, wrong token, unknown device)
//! collapses into [`ProtocolError::Unauthorized`].

use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument};

use crate::protocol::ProtocolError;
use crate::storage::{DatabaseError, Pass, PassDatabase, PassStatus};

/// Result of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created,
    AlreadyRegistered,
}

/// Passes changed since a device last asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedPasses {
    pub pass_ids: Vec<String>,
    /// Highest update tag among `pass_ids`; the device sends it back as
    /// `passesUpdatedSince` next time.
    pub last_updated: Option<i64>,
}

#[derive(Clone)]
pub struct DeviceRegistry {
    db: PassDatabase,
}

impl DeviceRegistry {
    pub const fn new(db: PassDatabase) -> Self {
        Self { db }
    }

    /// Subscribe a device to a pass. Repeating the call is harmless.
    #[instrument(skip(self, token, push_token))]
    pub async fn register(
        &self,
        device_id: &str,
        pass_id: &str,
        token: &str,
        push_token: &str,
    ) -> Result<RegistrationOutcome, ProtocolError> {
        authenticate(&self.db, pass_id, token).await?;
        if device_id.is_empty() || push_token.is_empty() {
            return Err(ProtocolError::Unauthorized);
        }

        let created = self
            .db
            .upsert_registration(device_id, pass_id, push_token)
            .await?;
        if created {
            info!(device_id, pass_id, "Device registered");
            Ok(RegistrationOutcome::Created)
        } else {
            debug!(device_id, pass_id, "Device registration refreshed");
            Ok(RegistrationOutcome::AlreadyRegistered)
        }
    }

    /// Remove the device/pass subscription. The pass itself is untouched.
    #[instrument(skip(self, token))]
    pub async fn unregister(
        &self,
        device_id: &str,
        pass_id: &str,
        token: &str,
    ) -> Result<(), ProtocolError> {
        authenticate(&self.db, pass_id, token).await?;
        if self.db.delete_registration(device_id, pass_id).await? {
            info!(device_id, pass_id, "Device unregistered");
        }
        Ok(())
    }

    /// Passes of this device whose update tag is greater than `since`.
    #[instrument(skip(self))]
    pub async fn updated_since(
        &self,
        device_id: &str,
        since: Option<i64>,
    ) -> Result<UpdatedPasses, ProtocolError> {
        if !self.db.device_exists(device_id).await? {
            return Err(ProtocolError::Unauthorized);
        }

        let rows = self
            .db
            .passes_updated_since(device_id, since.unwrap_or(0))
            .await?;
        self.db.touch_device(device_id).await?;

        let last_updated = rows.iter().map(|(_, tag)| *tag).max();
        Ok(UpdatedPasses {
            pass_ids: rows.into_iter().map(|(id, _)| id).collect(),
            last_updated,
        })
    }

    /// Drop every registration using one of `push_tokens`.
    pub async fn prune_push_tokens(&self, push_tokens: &[String]) -> Result<u64, DatabaseError> {
        let removed = self.db.delete_registrations_by_push_token(push_tokens).await?;
        if removed > 0 {
            info!(removed, "Pruned registrations with invalid push tokens");
        }
        Ok(removed)
    }

    pub async fn authenticate(&self, pass_id: &str, token: &str) -> Result<Pass, ProtocolError> {
        authenticate(&self.db, pass_id, token).await
    }
}

/// Resolve a pass the caller holds the token for.
///
/// Deleted passes are treated as missing.
pub async fn authenticate(
    db: &PassDatabase,
    pass_id: &str,
    token: &str,
) -> Result<Pass, ProtocolError> {
    let pass = db
        .find_pass(pass_id)
        .await?
        .ok_or(ProtocolError::Unauthorized)?;

    let matches: bool = pass
        .authentication_token
        .as_bytes()
        .ct_eq(token.as_bytes())
        .into();
    if !matches || pass.status() == Some(PassStatus::Deleted) {
        return Err(ProtocolError::Unauthorized);
    }

    Ok(pass)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{NewPass, WalletKind};

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    async fn setup() -> (PassDatabase, DeviceRegistry) {
        let db = PassDatabase::open_in_memory().await.unwrap();
        for id in ["p1", "p2"] {
            db.create_pass(&NewPass {
                id,
                owner_customer_id: "cust",
                offer_id: id,
                wallet_kind: WalletKind::Apple,
                required_count: 5,
                authentication_token: TOKEN,
            })
            .await
            .unwrap();
        }
        let registry = DeviceRegistry::new(db.clone());
        (db, registry)
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let (db, registry) = setup().await;
        assert_eq!(
            registry.register("dev", "p1", TOKEN, "push-a").await.unwrap(),
            RegistrationOutcome::Created
        );
        let first = db.get_registration("dev", "p1").await.unwrap().unwrap();

        assert_eq!(
            registry.register("dev", "p1", TOKEN, "push-b").await.unwrap(),
            RegistrationOutcome::AlreadyRegistered
        );
        let second = db.get_registration("dev", "p1").await.unwrap().unwrap();
        assert_eq!(first.registered_at, second.registered_at);
        assert_eq!(second.push_token, "push-b");
    }

    #[tokio::test]
    async fn wrong_token_and_missing_pass_look_the_same() {
        let (_, registry) = setup().await;
        let wrong = registry.register("dev", "p1", "nope", "push").await.unwrap_err();
        let missing = registry.register("dev", "ghost", TOKEN, "push").await.unwrap_err();
        assert_eq!(wrong.to_string(), missing.to_string());
        assert!(matches!(wrong, ProtocolError::Unauthorized));
    }

    #[tokio::test]
    async fn deleted_pass_is_unauthorized() {
        let (db, registry) = setup().await;
        sqlx::query("UPDATE passes SET status = 'deleted' WHERE id = 'p1'")
            .execute(db.pool())
            .await
            .unwrap();
        assert!(matches!(
            registry.authenticate("p1", TOKEN).await,
            Err(ProtocolError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn updated_since_scopes_to_device() {
        let (db, registry) = setup().await;
        registry.register("dev", "p1", TOKEN, "push").await.unwrap();
        registry.register("other", "p2", TOKEN, "push-2").await.unwrap();

        let all = registry.updated_since("dev", None).await.unwrap();
        assert_eq!(all.pass_ids, vec!["p1".to_string()]);
        let p1 = db.get_pass("p1").await.unwrap();
        assert_eq!(all.last_updated, Some(p1.update_tag));

        let none = registry.updated_since("dev", all.last_updated).await.unwrap();
        assert!(none.pass_ids.is_empty());
        assert_eq!(none.last_updated, None);
    }

    #[tokio::test]
    async fn unknown_device_is_unauthorized() {
        let (_, registry) = setup().await;
        assert!(matches!(
            registry.updated_since("ghost", None).await,
            Err(ProtocolError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn unregister_keeps_pass() {
        let (db, registry) = setup().await;
        registry.register("dev", "p1", TOKEN, "push").await.unwrap();
        registry.unregister("dev", "p1", TOKEN).await.unwrap();
        assert!(db.get_registration("dev", "p1").await.unwrap().is_none());
        assert!(db.find_pass("p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn prune_push_tokens_removes_rows() {
        let (db, registry) = setup().await;
        registry.register("dev", "p1", TOKEN, "dead").await.unwrap();
        registry.register("dev", "p2", TOKEN, "dead").await.unwrap();
        assert_eq!(registry.prune_push_tokens(&["dead".to_string()]).await.unwrap(), 2);
        assert!(!db.device_exists("dev").await.unwrap());
    }
}
