//! Authentication extractor for protected routes.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::AppError;
use crate::{state::AppState, store::User};

/// Header carrying the username.
pub const AUTH_USER_HEADER: &str = "x-auth-user";
/// Header carrying the pre-digested client credential.
pub const AUTH_KEY_HEADER: &str = "x-auth-key";

/// The authenticated user, extracted from the auth header pair.
///
/// Rejects with the generic unauthorized response on any failure: missing
/// headers, unknown username and credential mismatch are indistinguishable
/// to the caller. A storage failure is a 500, not a 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(AUTH_USER_HEADER)
            .and_then(|value| value.to_str().ok());
        let credential = parts
            .headers
            .get(AUTH_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        match state.auth.authenticate(username, credential)? {
            Some(user) => Ok(AuthUser(user)),
            None => Err(AppError::unauthorized()),
        }
    }
}
