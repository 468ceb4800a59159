//! Key-value table access.
//!
//! Items are schemaless attribute maps, the same shape the DynamoDB document
//! client works with. `KvTable` is the seam between the user service and the
//! backend: `DynamoTable` in production, `MemoryTable` for tests and local runs.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

mod dynamodb;
mod expr;
mod memory;

pub use dynamodb::DynamoTable;
pub use memory::MemoryTable;

pub type Item = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `update` targeted a key that does not exist under `MissingKeyPolicy::Reject`.
    #[error("item does not exist")]
    MissingKey,
    #[error("{0}")]
    Backend(String),
    #[error("attribute conversion failed: {0}")]
    Codec(String),
    #[error("invalid expression: {0}")]
    Expression(String),
}

/// What `update` does when the key is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingKeyPolicy {
    #[default]
    Reject,
    /// Create a partial item holding the key and the assigned attributes.
    Upsert,
}

impl FromStr for MissingKeyPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "upsert" => Ok(Self::Upsert),
            other => anyhow::bail!("unknown update policy {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub limit: Option<u32>,
    pub start_key: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub items: Vec<Item>,
    pub count: usize,
    /// Continuation key; present when the scan stopped at `limit` with rows left.
    pub last_evaluated_key: Option<Item>,
}

/// Equality key condition, e.g. `#id = :id`.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub struct QueryInput {
    pub key_condition: String,
    pub values: Item,
    pub names: HashMap<String, String>,
    pub limit: Option<u32>,
}

/// `SET` update, e.g. `SET #name = :name, updatedAt = :updatedAt`.
#[derive(Debug, Clone, Default)]
pub struct UpdateExpression {
    pub expression: String,
    pub values: Item,
    pub names: HashMap<String, String>,
}

#[async_trait]
pub trait KvTable: Send + Sync {
    async fn get(&self, key: &Item) -> Result<Option<Item>, StoreError>;
    async fn put(&self, item: Item) -> Result<(), StoreError>;
    async fn scan(&self, options: ScanOptions) -> Result<ScanOutput, StoreError>;
    #[allow(dead_code)]
    async fn query(&self, input: QueryInput) -> Result<ScanOutput, StoreError>;
    /// Applies `update` and returns the item as it is after the write.
    async fn update(&self, key: &Item, update: UpdateExpression) -> Result<Item, StoreError>;
    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &Item) -> Result<(), StoreError>;
}
