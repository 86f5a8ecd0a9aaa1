use anyhow::{Context, Result};
use async_std::future;
use sqlx::{postgres::PgPoolOptions, Connection, PgPool};
use std::time::Duration;
use tide::log::{info, warn};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS todos (
        id SERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        status TEXT NOT NULL
    )
"#;

/// Opens the shared pool and checks that the database answers.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("could not connect to the database")?;

    ping(&pool).await?;
    info!("connected to the database");

    Ok(pool)
}

pub async fn ping(pool: &PgPool) -> Result<()> {
    let mut conn = pool
        .acquire()
        .await
        .context("could not acquire a database connection")?;
    conn.ping().await.context("database did not answer ping")?;
    Ok(())
}

/// Creates the `todos` table unless it already exists. Safe to run on every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(CREATE_TABLE)
        .execute(pool)
        .await
        .context("could not create the todos table")?;

    info!("todos table ready");
    Ok(())
}

/// Closes the pool, giving checked-out connections at most `timeout` to come back.
///
/// Returns false if some were still busy; those are released at process exit.
pub async fn close(pool: &PgPool, timeout: Duration) -> bool {
    let closed = future::timeout(timeout, pool.close()).await.is_ok();
    if !closed {
        warn!("database connections still busy after {:?}", timeout);
    }
    closed
}
