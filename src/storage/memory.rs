use std::sync::RwLock;

use async_trait::async_trait;

use super::expr::{parse_key_condition, parse_set};
use super::{
    Item, KvTable, MissingKeyPolicy, QueryInput, ScanOptions, ScanOutput, StoreError,
    UpdateExpression,
};

/// In-process table. Rows keep insertion order, so scans are not sorted by key.
pub struct MemoryTable {
    key_attributes: Vec<String>,
    policy: MissingKeyPolicy,
    rows: RwLock<Vec<Item>>,
}

impl MemoryTable {
    pub fn new(key_attribute: impl Into<String>, policy: MissingKeyPolicy) -> Self {
        Self {
            key_attributes: vec![key_attribute.into()],
            policy,
            rows: RwLock::new(Vec::new()),
        }
    }

    fn key_of(&self, item: &Item) -> Result<Item, StoreError> {
        self.key_attributes
            .iter()
            .map(|attr| {
                item.get(attr)
                    .map(|v| (attr.clone(), v.clone()))
                    .ok_or_else(|| StoreError::Backend(format!("missing key attribute {attr}")))
            })
            .collect()
    }

    fn has_key(&self, item: &Item, key: &Item) -> bool {
        self.key_attributes
            .iter()
            .all(|attr| item.get(attr) == key.get(attr))
    }

    fn lock_err<T>(_: T) -> StoreError {
        StoreError::Backend("memory table lock poisoned".into())
    }
}

#[async_trait]
impl KvTable for MemoryTable {
    async fn get(&self, key: &Item) -> Result<Option<Item>, StoreError> {
        let key = self.key_of(key)?;
        let rows = self.rows.read().map_err(Self::lock_err)?;
        Ok(rows.iter().find(|row| self.has_key(row, &key)).cloned())
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        let key = self.key_of(&item)?;
        let mut rows = self.rows.write().map_err(Self::lock_err)?;
        match rows.iter_mut().find(|row| self.has_key(row, &key)) {
            Some(row) => *row = item,
            None => rows.push(item),
        }
        Ok(())
    }

    async fn scan(&self, options: ScanOptions) -> Result<ScanOutput, StoreError> {
        let rows = self.rows.read().map_err(Self::lock_err)?;
        let start = match &options.start_key {
            Some(start_key) => rows
                .iter()
                .position(|row| self.has_key(row, start_key))
                .map_or(rows.len(), |pos| pos + 1),
            None => 0,
        };
        let remaining = &rows[start..];
        let take = options
            .limit
            .map_or(remaining.len(), |l| remaining.len().min(l as usize));
        let items: Vec<Item> = remaining[..take].to_vec();
        let last_evaluated_key = match items.last() {
            Some(last) if take < remaining.len() => Some(self.key_of(last)?),
            _ => None,
        };
        Ok(ScanOutput {
            count: items.len(),
            items,
            last_evaluated_key,
        })
    }

    async fn query(&self, input: QueryInput) -> Result<ScanOutput, StoreError> {
        let conditions = parse_key_condition(&input.key_condition, &input.values, &input.names)?;
        let rows = self.rows.read().map_err(Self::lock_err)?;
        let items: Vec<Item> = rows
            .iter()
            .filter(|row| {
                conditions
                    .iter()
                    .all(|c| row.get(&c.attribute) == Some(&c.value))
            })
            .take(input.limit.map_or(usize::MAX, |l| l as usize))
            .cloned()
            .collect();
        Ok(ScanOutput {
            count: items.len(),
            items,
            last_evaluated_key: None,
        })
    }

    async fn update(&self, key: &Item, update: UpdateExpression) -> Result<Item, StoreError> {
        let key = self.key_of(key)?;
        let assignments = parse_set(&update.expression, &update.values, &update.names)?;
        if let Some(a) = assignments
            .iter()
            .find(|a| self.key_attributes.contains(&a.attribute))
        {
            return Err(StoreError::Expression(format!(
                "cannot update key attribute {}",
                a.attribute
            )));
        }

        let mut rows = self.rows.write().map_err(Self::lock_err)?;
        let index = match rows.iter().position(|row| self.has_key(row, &key)) {
            Some(index) => index,
            None => match self.policy {
                MissingKeyPolicy::Reject => return Err(StoreError::MissingKey),
                MissingKeyPolicy::Upsert => {
                    rows.push(key.clone());
                    rows.len() - 1
                }
            },
        };
        let row = &mut rows[index];
        for a in assignments {
            row.insert(a.attribute, a.value);
        }
        Ok(row.clone())
    }

    async fn delete(&self, key: &Item) -> Result<(), StoreError> {
        let key = self.key_of(key)?;
        let mut rows = self.rows.write().map_err(Self::lock_err)?;
        rows.retain(|row| !self.has_key(row, &key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn item(v: serde_json::Value) -> Item {
        v.as_object().cloned().unwrap()
    }

    fn key(id: &str) -> Item {
        item(json!({ "id": id }))
    }

    fn rename(name: &str) -> UpdateExpression {
        UpdateExpression {
            expression: "SET #name = :name".into(),
            values: item(json!({ ":name": name })),
            names: HashMap::from([("#name".to_string(), "name".to_string())]),
        }
    }

    async fn seeded(policy: MissingKeyPolicy) -> MemoryTable {
        let table = MemoryTable::new("id", policy);
        for (id, name) in [("c", "Cy"), ("a", "Al"), ("b", "Bo")] {
            table
                .put(item(json!({ "id": id, "name": name })))
                .await
                .unwrap();
        }
        table
    }

    #[tokio::test]
    async fn put_overwrites_and_get_finds() {
        let table = seeded(MissingKeyPolicy::Reject).await;
        table
            .put(item(json!({ "id": "a", "name": "Alan" })))
            .await
            .unwrap();
        let got = table.get(&key("a")).await.unwrap().unwrap();
        assert_eq!(got["name"], "Alan");
        assert!(table.get(&key("zz")).await.unwrap().is_none());
        assert_eq!(table.scan(ScanOptions::default()).await.unwrap().count, 3);
    }

    #[tokio::test]
    async fn put_requires_key_attribute() {
        let table = MemoryTable::new("id", MissingKeyPolicy::Reject);
        let err = table.put(item(json!({ "name": "x" }))).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn scan_keeps_insertion_order_and_pages_with_start_key() {
        let table = seeded(MissingKeyPolicy::Reject).await;

        let first = table
            .scan(ScanOptions {
                limit: Some(2),
                start_key: None,
            })
            .await
            .unwrap();
        let ids: Vec<_> = first.items.iter().map(|i| i["id"].clone()).collect();
        assert_eq!(ids, vec![json!("c"), json!("a")]);
        assert_eq!(first.count, 2);
        assert_eq!(first.last_evaluated_key, Some(key("a")));

        let second = table
            .scan(ScanOptions {
                limit: Some(2),
                start_key: first.last_evaluated_key,
            })
            .await
            .unwrap();
        assert_eq!(second.count, 1);
        assert_eq!(second.items[0]["id"], "b");
        assert!(second.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn query_matches_equality_conditions() {
        let table = seeded(MissingKeyPolicy::Reject).await;
        let out = table
            .query(QueryInput {
                key_condition: "#id = :id".into(),
                values: item(json!({ ":id": "b" })),
                names: HashMap::from([("#id".to_string(), "id".to_string())]),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(out.count, 1);
        assert_eq!(out.items[0]["name"], "Bo");
    }

    #[tokio::test]
    async fn update_existing_returns_all_new_attributes() {
        let table = seeded(MissingKeyPolicy::Reject).await;
        let updated = table.update(&key("b"), rename("Bob")).await.unwrap();
        assert_eq!(updated, item(json!({ "id": "b", "name": "Bob" })));
    }

    #[tokio::test]
    async fn update_missing_key_rejected_under_reject_policy() {
        let table = seeded(MissingKeyPolicy::Reject).await;
        let err = table.update(&key("nope"), rename("X")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingKey));
        assert!(table.get(&key("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_missing_key_creates_partial_item_under_upsert_policy() {
        let table = seeded(MissingKeyPolicy::Upsert).await;
        let created = table.update(&key("new"), rename("Nu")).await.unwrap();
        assert_eq!(created, item(json!({ "id": "new", "name": "Nu" })));
        assert_eq!(table.get(&key("new")).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn update_cannot_touch_key_attribute() {
        let table = seeded(MissingKeyPolicy::Reject).await;
        let err = table
            .update(
                &key("a"),
                UpdateExpression {
                    expression: "SET id = :id".into(),
                    values: item(json!({ ":id": "z" })),
                    names: HashMap::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Expression(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let table = seeded(MissingKeyPolicy::Reject).await;
        table.delete(&key("a")).await.unwrap();
        table.delete(&key("a")).await.unwrap();
        assert!(table.get(&key("a")).await.unwrap().is_none());
        assert_eq!(table.scan(ScanOptions::default()).await.unwrap().count, 2);
    }
}
