//! `SQLite` storage for stampcard.
//!
//! Persists passes, device registrations and the rolling notification
//! ledger. Every state transition is a conditional `UPDATE ... WHERE
//! status = ?` so concurrent writers skip rows that already moved on.

mod db;
mod models;
mod queries_devices;
mod queries_notifications;
mod queries_passes;


pub use db::{DatabaseError, PassDatabase};
pub use models::*;
pub use queries_passes::{NewPass, ProgressUpdate};
