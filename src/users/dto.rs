use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

/// Omitted fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Public shape of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: String,
    // partial items written by an upserting update may lack these
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResult {
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Raw `/users/search` query string; validated in the handler.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub filter: Option<String>,
}

/// JSON object describing sort order, e.g. `{"name":"asc"}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec(pub Map<String, Value>);

/// JSON object of attribute constraints, e.g. `{"email":"a@b.c"}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec(pub Map<String, Value>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub users: Vec<UserView>,
    pub total_count: usize,
    pub page: u64,
    pub limit: u32,
}
