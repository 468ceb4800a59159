use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{instrument, warn};

use super::dto::{
    CreateUserRequest, FilterSpec, RemoveResult, SearchQuery, SearchResult, SortSpec,
    UpdateUserRequest, UserView,
};
use crate::{
    error::{ApiError, INVALID_QUERY},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/search", get(search_users))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(remove_user),
        )
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        warn!("empty name");
        return Err(ApiError::BadRequest("Name must not be empty".into()));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), ApiError> {
    if !is_valid_email(email) {
        warn!(%email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    Ok(())
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let mut input = body(payload)?;
    input.email = input.email.trim().to_string();
    check_name(&input.name)?;
    check_email(&input.email)?;

    let user = state.users.create(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserView>>, ApiError> {
    Ok(Json(state.users.find_all().await?))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(state.users.find_one(&id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserView>, ApiError> {
    let mut input = body(payload)?;
    if let Some(name) = &input.name {
        check_name(name)?;
    }
    if let Some(email) = input.email.take() {
        let email = email.trim().to_string();
        check_email(&email)?;
        input.email = Some(email);
    }

    Ok(Json(state.users.update(&id, input).await?))
}

#[instrument(skip(state))]
pub async fn remove_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<RemoveResult> {
    Json(state.users.remove(&id).await)
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    Query(raw): Query<SearchQuery>,
) -> Result<Json<SearchResult>, ApiError> {
    let page = parse_number(raw.page)?;
    let limit = parse_number(raw.limit)?;
    let sort = SortSpec(parse_spec(raw.sort)?);
    let filter = FilterSpec(parse_spec(raw.filter)?);

    let result = state.users.search_users(page, limit, sort, filter).await?;
    Ok(Json(result))
}

fn invalid_query() -> ApiError {
    ApiError::BadRequest(INVALID_QUERY.into())
}

/// Digits that overflow `u64` are still numeric; they saturate and get
/// normalized by the service like any other oversized value.
fn parse_number(raw: Option<String>) -> Result<Option<u64>, ApiError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.bytes().all(|b| b.is_ascii_digit()) => {
            Ok(Some(s.parse::<u64>().unwrap_or(u64::MAX)))
        }
        Some(s) => {
            warn!(value = %s, "non-numeric pagination parameter");
            Err(invalid_query())
        }
    }
}

fn parse_spec(raw: Option<String>) -> Result<Map<String, Value>, ApiError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(Map::new()),
        Some(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            _ => {
                warn!(value = %s, "malformed sort/filter parameter");
                Err(invalid_query())
            }
        },
    }
}
