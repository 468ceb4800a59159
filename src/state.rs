use crate::config::{AppConfig, StorageBackend};
use crate::db;
use crate::storage::{DynamoTable, KvTable, MemoryTable};
use crate::users::UserService;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = db::connect_lazy(&config.postgres)?;

        let table = match config.storage {
            StorageBackend::Dynamodb => {
                let table = DynamoTable::connect(&config.dynamodb).await?;
                info!(table = table.table_name(), "using dynamodb storage");
                Arc::new(table) as Arc<dyn KvTable>
            }
            StorageBackend::Memory => {
                warn!("using in-memory storage; data is lost on restart");
                Arc::new(MemoryTable::new("id", config.dynamodb.update_policy)) as Arc<dyn KvTable>
            }
        };

        Ok(Self::from_parts(db, config, table))
    }

    pub fn from_parts(db: PgPool, config: Arc<AppConfig>, table: Arc<dyn KvTable>) -> Self {
        Self {
            db,
            config,
            users: UserService::new(table),
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = AppConfig::from_lookup(|k| (k == "STORAGE_BACKEND").then(|| "memory".into()))
            .expect("default config");
        let table = Arc::new(MemoryTable::new("id", config.dynamodb.update_policy));
        let db = db::connect_lazy(&config.postgres).expect("lazy pool ok");
        Self::from_parts(db, Arc::new(config), table)
    }
}
