use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::{Item, StoreError};

lazy_static! {
    static ref SET_PREFIX: Regex = Regex::new(r"(?i)^\s*SET\s+").unwrap();
    static ref AND_SEP: Regex = Regex::new(r"(?i)\s+AND\s+").unwrap();
}

/// One `attribute = :placeholder` pair with the alias already resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignment {
    pub attribute: String,
    pub value: Value,
}

pub(crate) fn parse_set(
    expression: &str,
    values: &Item,
    names: &HashMap<String, String>,
) -> Result<Vec<Assignment>, StoreError> {
    let body = SET_PREFIX
        .find(expression)
        .map(|m| &expression[m.end()..])
        .ok_or_else(|| StoreError::Expression(format!("expected SET clause: {expression}")))?;
    body.split(',')
        .map(|clause| parse_pair(clause, values, names))
        .collect()
}

#[allow(dead_code)]
pub(crate) fn parse_key_condition(
    expression: &str,
    values: &Item,
    names: &HashMap<String, String>,
) -> Result<Vec<Assignment>, StoreError> {
    AND_SEP
        .split(expression.trim())
        .map(|clause| parse_pair(clause, values, names))
        .collect()
}

fn parse_pair(
    clause: &str,
    values: &Item,
    names: &HashMap<String, String>,
) -> Result<Assignment, StoreError> {
    let (lhs, rhs) = clause
        .split_once('=')
        .ok_or_else(|| StoreError::Expression(format!("expected `a = :v`, got {clause:?}")))?;
    Ok(Assignment {
        attribute: resolve_name(lhs.trim(), names)?,
        value: resolve_value(rhs.trim(), values)?,
    })
}

fn resolve_name(token: &str, names: &HashMap<String, String>) -> Result<String, StoreError> {
    if token.is_empty() {
        return Err(StoreError::Expression("empty attribute name".into()));
    }
    if token.starts_with('#') {
        return names
            .get(token)
            .cloned()
            .ok_or_else(|| StoreError::Expression(format!("undefined name alias {token}")));
    }
    Ok(token.to_string())
}

fn resolve_value(token: &str, values: &Item) -> Result<Value, StoreError> {
    if !token.starts_with(':') {
        return Err(StoreError::Expression(format!(
            "expected value placeholder, got {token:?}"
        )));
    }
    values
        .get(token)
        .cloned()
        .ok_or_else(|| StoreError::Expression(format!("undefined value placeholder {token}")))
}
