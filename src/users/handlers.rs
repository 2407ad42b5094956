use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, instrument, warn};

use crate::{
    error::UserError,
    state::AppState,
    users::{
        dto::{CreateUserRequest, HealthResponse, ListUsersQuery, UpdateUserRequest, UpdatedResponse},
        repo_types::{Page, User},
        services::UserPage,
    },
};

type ApiError = (StatusCode, String);

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", put(update_user).delete(remove_user))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn status_for(e: &UserError) -> StatusCode {
    match e {
        UserError::NotFound => StatusCode::NOT_FOUND,
        UserError::AlreadyExists => StatusCode::CONFLICT,
        UserError::NoChanges | UserError::InvalidPage(_) => StatusCode::BAD_REQUEST,
        UserError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        UserError::Store(_) | UserError::Notification(_) | UserError::PasswordHash(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn api_error(e: UserError) -> ApiError {
    let status = status_for(&e);
    if status.is_server_error() {
        error!(error = %e, "request failed");
    } else {
        warn!(error = %e, "request rejected");
    }
    (status, e.to_string())
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }
    if payload.nick_name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "nick_name is required".into()));
    }

    let (draft, password) = payload.into_parts();
    let user = state.users.create(draft, &password).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut payload): Json<UpdateUserRequest>,
) -> Result<Json<UpdatedResponse>, ApiError> {
    if let Some(email) = payload.email.as_mut() {
        *email = email.trim().to_lowercase();
        if !email.is_empty() && !is_valid_email(email) {
            return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
        }
    }
    if let Some(password) = payload.password.as_deref() {
        if !password.is_empty() && password.len() < 8 {
            return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
        }
    }

    let (changes, password) = payload.into_parts(id);
    state
        .users
        .update(changes, password.as_deref())
        .await
        .map_err(api_error)?;
    Ok(Json(UpdatedResponse { id, updated: true }))
}

#[instrument(skip(state))]
pub async fn remove_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.users.remove(id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(q): Query<ListUsersQuery>,
) -> Result<Json<UserPage>, ApiError> {
    let page = Page::new(q.page, q.page_size).map_err(api_error)?;
    let found = state.users.get(q.filter(), page).await.map_err(api_error)?;
    Ok(Json(found))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse { store: "up" })),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { store: "down" }),
            )
        }
    }
}
