//! Data models for pass storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stampcard_render::CanvasKind;

/// Lifecycle state of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Active,
    Completed,
    Expired,
    Deleted,
}

impl PassStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Deleted => "deleted",
        }
    }

    /// Whether the pass still shows progress to its holder.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Completed)
    }
}

impl fmt::Display for PassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown pass status: {other}")),
        }
    }
}

/// Wallet ecosystem a pass is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    Apple,
    Google,
}

impl WalletKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Apple => "apple",
            Self::Google => "google",
        }
    }

    /// Canvas the progress image is rendered for.
    pub const fn canvas_kind(self) -> CanvasKind {
        match self {
            Self::Apple => CanvasKind::Strip,
            Self::Google => CanvasKind::Thumbnail,
        }
    }

    /// Bundle file name of the progress image.
    pub const fn image_name(self) -> &'static str {
        match self {
            Self::Apple => "strip@3x.png",
            Self::Google => "thumbnail.png",
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apple" => Ok(Self::Apple),
            "google" => Ok(Self::Google),
            other => Err(format!("unknown wallet kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pass {
    pub id: String,
    pub owner_customer_id: String,
    pub offer_id: String,
    pub wallet_kind: String,
    pub status: String,
    pub earned_count: i64,
    pub required_count: i64,
    #[serde(skip_serializing)]
    pub authentication_token: String,
    pub update_tag: i64,
    pub expiration_notified: i64,
    pub created_at: i64,
    pub last_updated_at: i64,
    pub completed_at: Option<i64>,
    pub scheduled_expiration_at: Option<i64>,
    pub expired_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

impl Pass {
    /// Parsed status. The column is constrained by the schema, so an
    /// unknown value only appears if the row was written by hand.
    pub fn status(&self) -> Option<PassStatus> {
        self.status.parse().ok()
    }

    pub fn wallet(&self) -> Option<WalletKind> {
        self.wallet_kind.parse().ok()
    }

    pub const fn is_expiration_notified(&self) -> bool {
        self.expiration_notified != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceRegistration {
    pub device_id: String,
    pub pass_id: String,
    pub push_token: String,
    pub registered_at: i64,
    pub last_checked_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub pass_id: String,
    pub sent_at: i64,
    pub day_bucket: i64,
}
