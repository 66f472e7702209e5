//! Embedded schema migrations.

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

type MigrationError = Box<dyn std::error::Error + Send + Sync>;

/// Apply every pending migration and return the names of the ones applied.
///
/// Uses a blocking connection; call it from `spawn_blocking` inside a runtime.
pub fn run_pending(database_url: &str) -> Result<Vec<String>, MigrationError> {
    let mut conn = PgConnection::establish(database_url)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)?
        .into_iter()
        .map(|version| version.to_string())
        .collect();
    Ok(applied)
}
