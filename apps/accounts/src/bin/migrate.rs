//! Standalone migration runner for the accounts schema.
//!
//! Usage:
//!   cargo run -p accounts --bin migrate
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = accounts::config::Config::from_env();

    tracing::info!("running pending migrations");
    match accounts::db::migrate::run_pending(&config.database_url) {
        Ok(applied) if applied.is_empty() => {
            tracing::info!("no pending migrations");
            ExitCode::SUCCESS
        }
        Ok(applied) => {
            for migration in &applied {
                tracing::info!(%migration, "applied");
            }
            tracing::info!(count = applied.len(), "migrations applied");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "migration failed");
            ExitCode::FAILURE
        }
    }
}
