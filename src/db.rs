use std::time::Duration;

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sqlx::migrate::Migrator;

/// SQL migrations embedded at build time. Applied versions are recorded in
/// `_sqlx_migrations`, so each file runs once per database.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Create a SeaORM connection. Variant writes run concurrently inside one
/// transaction, so a small pool is enough.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .max_connections(10)
        .connect_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    let conn = Database::connect(options)
        .await
        .context("failed to connect to the catalog database")?;
    Ok(conn)
}

/// Apply pending migrations on the pool underlying `conn`.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    MIGRATOR
        .run(conn.get_postgres_connection_pool())
        .await
        .context("failed to apply migrations")?;
    Ok(())
}
