use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    CreateUserRequest, FilterSpec, RemoveResult, SearchResult, SortSpec, UpdateUserRequest,
    UserView,
};
use super::repo_types::UserRecord;
use crate::storage::{Item, KvTable, ScanOptions, StoreError, UpdateExpression};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("User with id {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("malformed user record: {0}")]
    Record(String),
}

impl From<serde_json::Error> for UserError {
    fn from(e: serde_json::Error) -> Self {
        Self::Record(e.to_string())
    }
}

#[derive(Clone)]
pub struct UserService {
    table: Arc<dyn KvTable>,
}

impl UserService {
    pub fn new(table: Arc<dyn KvTable>) -> Self {
        Self { table }
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, input: CreateUserRequest) -> Result<UserView, UserError> {
        let now = OffsetDateTime::now_utc();
        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            email: input.email,
            created_at: now,
            updated_at: now,
        };
        let view = UserView {
            id: record.id.clone(),
            name: record.name.clone(),
            email: record.email.clone(),
        };
        self.table.put(record.into_item()?).await?;
        info!(user_id = %view.id, "user created");
        Ok(view)
    }

    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<UserView>, UserError> {
        let out = self.table.scan(ScanOptions::default()).await?;
        let mut users = out
            .items
            .into_iter()
            .map(to_view)
            .collect::<Result<Vec<_>, _>>()?;
        // the backend gives no ordering guarantee
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    #[instrument(skip(self))]
    pub async fn find_one(&self, id: &str) -> Result<UserView, UserError> {
        match self.table.get(&key(id)).await? {
            Some(item) => to_view(item),
            None => Err(UserError::NotFound(id.to_string())),
        }
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: &str, input: UpdateUserRequest) -> Result<UserView, UserError> {
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| UserError::Record(e.to_string()))?;
        let update = update_expression(input, now);
        let item = self
            .table
            .update(&key(id), update)
            .await
            .map_err(|e| match e {
                StoreError::MissingKey => UserError::NotFound(id.to_string()),
                other => UserError::Store(other),
            })?;
        info!(user_id = %id, "user updated");
        to_view(item)
    }

    /// Storage failures are reported in the result instead of as an error.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> RemoveResult {
        match self.table.delete(&key(id)).await {
            Ok(()) => {
                info!(user_id = %id, "user deleted");
                RemoveResult {
                    deleted: true,
                    message: None,
                }
            }
            Err(e) => {
                warn!(user_id = %id, error = %e, "user delete failed");
                RemoveResult {
                    deleted: false,
                    message: Some(e.to_string()),
                }
            }
        }
    }

    /// Single bounded scan. `total_count` is the size of that one page, not of
    /// the table, and every page number yields the same first rows. `sort` and
    /// `filter` are accepted but not applied.
    #[instrument(skip(self))]
    pub async fn search_users(
        &self,
        page: Option<u64>,
        limit: Option<u64>,
        sort: SortSpec,
        filter: FilterSpec,
    ) -> Result<SearchResult, UserError> {
        let page = normalize_page(page);
        let limit = normalize_limit(limit);
        if !sort.0.is_empty() || !filter.0.is_empty() {
            debug!("sort and filter are not applied to scans");
        }

        let out = self
            .table
            .scan(ScanOptions {
                limit: Some(limit),
                start_key: None,
            })
            .await?;
        debug!(
            count = out.count,
            has_more = out.last_evaluated_key.is_some(),
            "search scan finished"
        );

        let users = out
            .items
            .into_iter()
            .map(to_view)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SearchResult {
            users,
            total_count: out.count,
            page,
            limit,
        })
    }
}

pub fn normalize_page(page: Option<u64>) -> u64 {
    match page {
        None | Some(0) => 1,
        Some(p) => p,
    }
}

pub fn normalize_limit(limit: Option<u64>) -> u32 {
    match limit.and_then(|l| u32::try_from(l).ok()) {
        Some(l) if l > 0 && l <= MAX_PAGE_SIZE => l,
        _ => DEFAULT_PAGE_SIZE,
    }
}

fn key(id: &str) -> Item {
    let mut key = Item::new();
    key.insert("id".into(), Value::String(id.to_string()));
    key
}

fn update_expression(input: UpdateUserRequest, updated_at: String) -> UpdateExpression {
    let mut clauses = Vec::new();
    let mut values = Item::new();
    let mut names = HashMap::new();
    for (attr, value) in [("name", input.name), ("email", input.email)] {
        if let Some(value) = value {
            clauses.push(format!("#{attr} = :{attr}"));
            values.insert(format!(":{attr}"), json!(value));
            names.insert(format!("#{attr}"), attr.to_string());
        }
    }
    clauses.push("updatedAt = :updatedAt".into());
    values.insert(":updatedAt".into(), json!(updated_at));

    UpdateExpression {
        expression: format!("SET {}", clauses.join(", ")),
        values,
        names,
    }
}

fn to_view(item: Item) -> Result<UserView, UserError> {
    Ok(serde_json::from_value(Value::Object(item))?)
}
