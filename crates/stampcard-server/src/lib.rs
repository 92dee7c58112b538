//! stampcard pass service.
//!
//! - [`storage`] `SQLite` persistence for passes, registrations and the
//!   notification ledger
//! - [`lifecycle`] issuance, progress events and the periodic sweep
//! - [`registry`] device subscriptions and token checks
//! - [`protocol`] pass bundles and content tags
//! - [`push`] silent update notifications
//! - [`routes`] the wallet web service over axum

pub mod catalog;
pub mod lifecycle;
pub mod protocol;
pub mod push;
pub mod registry;
pub mod routes;
pub mod storage;

use stampcard_core::Config;
use stampcard_render::StampRenderer;

use crate::catalog::OfferCatalog;
use crate::protocol::{PassContentService, PassIdentity};
use crate::registry::DeviceRegistry;
use crate::routes::AppState;
use crate::storage::PassDatabase;

/// Wire the HTTP state from configuration.
pub fn app_state(config: &Config, db: PassDatabase, renderer: StampRenderer) -> AppState {
    let identity = PassIdentity::from(&config.server);
    AppState {
        registry: DeviceRegistry::new(db.clone()),
        content: PassContentService::new(
            db,
            renderer,
            OfferCatalog::from_config(config),
            identity,
        ),
        pass_type_identifier: config.server.pass_type_identifier.clone(),
    }
}
