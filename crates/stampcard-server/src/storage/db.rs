//! `SQLite` database for pass state.

pub use stampcard_core::db::DatabaseError;

stampcard_core::define_database!(PassDatabase, "Pass database migrations complete");

impl std::fmt::Debug for PassDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassDatabase")
            .field("connections", &self.pool().size())
            .finish()
    }
}
