use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{defaults, retry::RetryConfig, BehaviorVersion, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::{
    config::Region,
    error::{DisplayErrorContext, SdkError},
    operation::update_item::UpdateItemError,
    types::{AttributeValue, ReturnValue},
    Client,
};
use serde_json::{Number, Value};
use tracing::debug;

use super::{
    Item, KvTable, MissingKeyPolicy, QueryInput, ScanOptions, ScanOutput, StoreError,
    UpdateExpression,
};
use crate::config::DynamoConfig;

type AttributeMap = HashMap<String, AttributeValue>;

#[derive(Clone)]
pub struct DynamoTable {
    client: Client,
    table_name: String,
    policy: MissingKeyPolicy,
}

impl DynamoTable {
    pub fn new(client: Client, table_name: impl Into<String>, policy: MissingKeyPolicy) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            policy,
        }
    }

    pub async fn connect(cfg: &DynamoConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!cfg.table_name.is_empty(), "DYNAMODB_TABLE_NAME is empty");
        let shared = sdk_config(cfg).await;
        debug!(table = %cfg.table_name, offline = cfg.offline, "dynamodb client configured");
        Ok(Self::new(
            Client::new(&shared),
            cfg.table_name.clone(),
            cfg.update_policy,
        ))
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl KvTable for DynamoTable {
    async fn get(&self, key: &Item) -> Result<Option<Item>, StoreError> {
        let out = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(to_attribute_map(key)))
            .send()
            .await
            .map_err(|e| sdk_error("GetItem", e))?;
        out.item.as_ref().map(from_attribute_map).transpose()
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_attribute_map(&item)))
            .send()
            .await
            .map_err(|e| sdk_error("PutItem", e))?;
        Ok(())
    }

    async fn scan(&self, options: ScanOptions) -> Result<ScanOutput, StoreError> {
        let out = self
            .client
            .scan()
            .table_name(&self.table_name)
            .set_limit(options.limit.map(to_limit).transpose()?)
            .set_exclusive_start_key(options.start_key.as_ref().map(to_attribute_map))
            .send()
            .await
            .map_err(|e| sdk_error("Scan", e))?;
        to_output(out.items, out.count, out.last_evaluated_key)
    }

    async fn query(&self, input: QueryInput) -> Result<ScanOutput, StoreError> {
        let out = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression(&input.key_condition)
            .set_expression_attribute_values(non_empty(to_attribute_map(&input.values)))
            .set_expression_attribute_names(non_empty(input.names))
            .set_limit(input.limit.map(to_limit).transpose()?)
            .send()
            .await
            .map_err(|e| sdk_error("Query", e))?;
        to_output(out.items, out.count, out.last_evaluated_key)
    }

    async fn update(&self, key: &Item, update: UpdateExpression) -> Result<Item, StoreError> {
        let mut names = update.names;
        let condition = match self.policy {
            MissingKeyPolicy::Reject => Some(
                key.keys()
                    .enumerate()
                    .map(|(i, attr)| {
                        let alias = format!("#__key{i}");
                        names.insert(alias.clone(), attr.clone());
                        format!("attribute_exists({alias})")
                    })
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
            MissingKeyPolicy::Upsert => None,
        };

        let out = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(to_attribute_map(key)))
            .update_expression(&update.expression)
            .set_condition_expression(condition)
            .set_expression_attribute_values(non_empty(to_attribute_map(&update.values)))
            .set_expression_attribute_names(non_empty(names))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                UpdateItemError::ConditionalCheckFailedException(_) => StoreError::MissingKey,
                other => StoreError::Backend(format!(
                    "UpdateItem failed: {}",
                    DisplayErrorContext(&other)
                )),
            })?;

        match out.attributes {
            Some(attrs) => from_attribute_map(&attrs),
            None => Err(StoreError::Codec("UpdateItem returned no attributes".into())),
        }
    }

    async fn delete(&self, key: &Item) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(to_attribute_map(key)))
            .send()
            .await
            .map_err(|e| sdk_error("DeleteItem", e))?;
        Ok(())
    }
}

/// Offline mode pins region, endpoint and static credentials; otherwise the
/// AWS default provider chain decides. Retries are off in both cases: each
/// storage call is sent exactly once.
pub(crate) async fn sdk_config(cfg: &DynamoConfig) -> SdkConfig {
    let loader = defaults(BehaviorVersion::latest()).retry_config(RetryConfig::disabled());
    if cfg.offline {
        loader
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key_id,
                &cfg.secret_access_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await
    } else {
        loader.load().await
    }
}

fn sdk_error<E, R>(op: &str, err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StoreError::Backend(format!("{op} failed: {}", DisplayErrorContext(&err)))
}

fn to_limit(limit: u32) -> Result<i32, StoreError> {
    i32::try_from(limit).map_err(|_| StoreError::Backend(format!("limit {limit} out of range")))
}

fn non_empty<V>(map: HashMap<String, V>) -> Option<HashMap<String, V>> {
    (!map.is_empty()).then_some(map)
}

fn to_output(
    items: Option<Vec<AttributeMap>>,
    count: i32,
    last_evaluated_key: Option<AttributeMap>,
) -> Result<ScanOutput, StoreError> {
    let items = items
        .unwrap_or_default()
        .iter()
        .map(from_attribute_map)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ScanOutput {
        items,
        count: usize::try_from(count).unwrap_or_default(),
        last_evaluated_key: last_evaluated_key
            .as_ref()
            .map(from_attribute_map)
            .transpose()?,
    })
}

pub(crate) fn to_attribute_map(item: &Item) -> AttributeMap {
    item.iter()
        .map(|(k, v)| (k.clone(), to_attribute(v)))
        .collect()
}

pub(crate) fn from_attribute_map(map: &AttributeMap) -> Result<Item, StoreError> {
    map.iter()
        .map(|(k, v)| Ok::<_, StoreError>((k.clone(), from_attribute(v)?)))
        .collect()
}

fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(to_attribute_map(map)),
    }
}

fn from_attribute(value: &AttributeValue) -> Result<Value, StoreError> {
    Ok(match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => Value::Number(parse_number(n)?),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::Ss(ss) => Value::Array(ss.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(ns) => Value::Array(
            ns.iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::L(items) => {
            Value::Array(items.iter().map(from_attribute).collect::<Result<_, _>>()?)
        }
        AttributeValue::M(map) => Value::Object(from_attribute_map(map)?),
        other => {
            return Err(StoreError::Codec(format!(
                "unsupported attribute type {other:?}"
            )))
        }
    })
}

fn parse_number(raw: &str) -> Result<Number, StoreError> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(i.into());
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(u.into());
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| StoreError::Codec(format!("invalid number {raw:?}")))
}
