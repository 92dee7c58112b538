//! Wallet update protocol: pass bundles, manifests and content tags.

pub mod bundle;
pub mod manifest;
pub mod service;

pub use bundle::{PassBundle, PassIdentity, build_bundle};
pub use manifest::{BundleFile, bundle_etag, etag_matches, manifest_lines};
pub use service::{PassContent, PassContentService};

use crate::storage::DatabaseError;

/// Errors surfaced to devices.
///
/// Every authentication-class failure is the same variant, so a response
/// never reveals whether a pass or device exists.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DatabaseError> for ProtocolError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(_) => Self::Unauthorized,
            other => Self::Storage(other.to_string()),
        }
    }
}
