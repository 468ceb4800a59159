use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::storage::Item;

/// Row stored in the users table. Timestamps never leave the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserRecord {
    pub fn into_item(self) -> Result<Item, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            // a struct always serializes to an object
            other => Err(serde::ser::Error::custom(format!(
                "expected object, got {other}"
            ))),
        }
    }

    #[cfg(test)]
    pub fn from_item(item: Item) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn item_uses_camel_case_and_iso_timestamps() {
        let record = UserRecord {
            id: "u-1".into(),
            name: "Ann".into(),
            email: "ann@x.com".into(),
            created_at: datetime!(2024-01-01 0:00 UTC),
            updated_at: datetime!(2024-01-02 12:30 UTC),
        };
        let item = record.clone().into_item().unwrap();
        assert_eq!(item["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(item["updatedAt"], "2024-01-02T12:30:00Z");
        assert_eq!(UserRecord::from_item(item).unwrap(), record);
    }
}
