use diesel_async::pooled_connection::deadpool::{BuildError, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

pub type DbPool = Pool<AsyncPgConnection>;

/// Create a Diesel async connection pool.
///
/// Connections are opened lazily, so this succeeds even when the database is
/// not reachable yet; the first checkout reports the failure.
pub fn connect(database_url: &str, max_size: usize) -> Result<DbPool, BuildError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager).max_size(max_size).build()?;

    tracing::info!(max_size, "database pool created");

    Ok(pool)
}
