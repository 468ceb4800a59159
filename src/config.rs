use anyhow::Context;
use serde::Deserialize;

use crate::storage::MissingKeyPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Dynamodb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamoConfig {
    pub region: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub table_name: String,
    /// Use the explicit region/endpoint/credentials instead of the AWS default chain.
    pub offline: bool,
    pub update_policy: MissingKeyPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub schema: String,
    pub ssl_mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub storage: StorageBackend,
    pub dynamodb: DynamoConfig,
    pub postgres: PostgresConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let storage = match var("STORAGE_BACKEND", "dynamodb").to_lowercase().as_str() {
            "dynamodb" => StorageBackend::Dynamodb,
            "memory" => StorageBackend::Memory,
            other => anyhow::bail!("unknown STORAGE_BACKEND {other:?}"),
        };

        let update_policy = var("DYNAMODB_UPDATE_POLICY", "reject")
            .parse::<MissingKeyPolicy>()
            .context("parse DYNAMODB_UPDATE_POLICY")?;

        let dynamodb = DynamoConfig {
            region: var("AWS_REGION", "ca-central-1"),
            endpoint: var("DYNAMODB_ENDPOINT", "http://localhost:8000"),
            access_key_id: var("AWS_ACCESS_KEY_ID", "dummy"),
            secret_access_key: var("AWS_SECRET_ACCESS_KEY", "dummy"),
            table_name: var("DYNAMODB_TABLE_NAME", "users"),
            offline: lookup("IS_OFFLINE").is_some_and(|v| !v.is_empty()),
            update_policy,
        };

        // PostgreSQL 17+ requires SSL by default; local runs and unit tests only prefer it.
        let ssl_mode = lookup("POSTGRES_SSL_MODE").unwrap_or_else(|| {
            match lookup("APP_ENV").as_deref() {
                None | Some("local") | Some("unittest") => "prefer".into(),
                Some(_) => "require".into(),
            }
        });

        let postgres = PostgresConfig {
            host: var("POSTGRES_HOST", "localhost"),
            port: var("POSTGRES_PORT", "5432")
                .parse::<u16>()
                .context("parse POSTGRES_PORT")?,
            user: var("POSTGRES_USER", "postgres"),
            password: var("POSTGRES_PASSWORD", "default"),
            database: var("POSTGRES_DATABASE", "postgres"),
            schema: var("POSTGRES_SCHEMA", "app"),
            ssl_mode,
        };

        Ok(Self {
            storage,
            dynamodb,
            postgres,
        })
    }
}
