//! Postgres access for the notification store: pool construction, schema
//! migrations, and the round-trip probe used by the readiness endpoint.

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

pub type DbPool = PgPool;

/// Opens the connection pool shared by the repositories and the report API
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    log::info!(
        "Opening Postgres pool ({}..{} connections)",
        config.min_connections,
        config.max_connections
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Notification timestamps are stored and compared in UTC;
                // pin every session so keyset cursors order consistently
                sqlx::query("SET timezone = 'UTC'").execute(conn).await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await?;

    log::info!("Postgres pool ready");

    Ok(pool)
}

/// Applies pending notification-store migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("Applying notification store migrations");

    sqlx::migrate!("./migrations").run(pool).await?;

    log::info!("Notification store schema is up to date");
    Ok(())
}

/// Cheap round-trip against the pool; false means not ready
pub async fn ping(pool: &DbPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
