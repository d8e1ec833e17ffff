//! Challenge-publication server.
//!
//! Serves the three well-known endpoints: authenticated publication and
//! retraction of validation challenges, and unauthenticated resolution for
//! the validator that reads them back. Principals and challenge records
//! live in SQLite; the authorization gate from `wellknown-auth` sits in
//! front of every mutating route.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod registry;
pub mod routes;
pub mod store;

pub use registry::{PrincipalSummary, RegistryError, SqlRegistry};
pub use routes::{app, AppState};
pub use store::ChallengeStore;

/// Open or create the server database.
pub async fn open_database(path: impl AsRef<Path>) -> Result<SqlitePool, sqlx::Error> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            sqlx::Error::Configuration(format!("Failed to create db directory: {}", e).into())
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        // WAL mode for better concurrent read performance
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1) // SQLite performs best with a single writer
        .connect_with(options)
        .await
}

/// Seconds since the Unix epoch.
pub(crate) fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
