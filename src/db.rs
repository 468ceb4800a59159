use std::time::Duration;

use anyhow::Context;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use tracing::info;

use crate::config::PostgresConfig;

const MAX_CONNECTIONS: u32 = 5;

pub fn connect_options(cfg: &PostgresConfig) -> anyhow::Result<PgConnectOptions> {
    let ssl_mode = cfg
        .ssl_mode
        .parse::<PgSslMode>()
        .with_context(|| format!("invalid POSTGRES_SSL_MODE {:?}", cfg.ssl_mode))?;

    // password goes through the options builder, so special characters need no URL encoding
    Ok(PgConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .username(&cfg.user)
        .password(&cfg.password)
        .database(&cfg.database)
        .ssl_mode(ssl_mode)
        .options([("search_path", cfg.schema.as_str())]))
}

/// Builds the shared pool without opening a connection; the user path never
/// touches Postgres, so startup must not depend on it being reachable.
pub fn connect_lazy(cfg: &PostgresConfig) -> anyhow::Result<PgPool> {
    let options = connect_options(cfg)?;
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy_with(options);
    info!(host = %cfg.host, port = cfg.port, database = %cfg.database, schema = %cfg.schema, "postgres pool configured");
    Ok(pool)
}

pub async fn ping(db: &PgPool) -> anyhow::Result<()> {
    sqlx::query("SELECT 1")
        .execute(db)
        .await
        .context("postgres health check")?;
    Ok(())
}
