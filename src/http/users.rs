//! User registration and auth check.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{
    error::{AppError, AppResult},
    extract::AuthUser,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    username: String,
    /// Already a digest on the client side.
    #[serde(default)]
    password: String,
}

/// `POST /users/create`
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<impl IntoResponse> {
    if body.username.is_empty() || body.password.is_empty() {
        return Err(AppError::bad_request("Username and password are required"));
    }
    let password_hash = state.auth.hash_credential(&body.password)?;
    match state.store.create_user(&body.username, &password_hash) {
        Ok(user) => {
            info!(username = %user.username, "user created");
            Ok((StatusCode::CREATED, Json(json!({ "status": "success" }))))
        }
        // UsernameTaken surfaces as 402, see the From impl
        Err(err) => Err(err.into()),
    }
}

/// `GET /users/auth`
pub async fn auth(_user: AuthUser) -> impl IntoResponse {
    Json(json!({ "status": "authenticated" }))
}
