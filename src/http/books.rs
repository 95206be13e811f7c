//! Document link management, book listing and labels.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::{
    error::{AppError, AppResult},
    extract::AuthUser,
};
use crate::{
    books::{collect_books, list_page},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    #[serde(default)]
    hashes: Vec<String>,
}

/// `POST /documents/link`
pub async fn create_links(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<LinkRequest>,
) -> AppResult<impl IntoResponse> {
    let Some(outcome) = state.resolver.merge(&user.id, &body.hashes)? else {
        return Err(AppError::bad_request("At least two hashes are required"));
    };
    Ok((
        StatusCode::CREATED,
        Json(json!({ "canonical": outcome.canonical, "linked": outcome.linked })),
    ))
}

/// `GET /documents/links`
pub async fn list_links(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<impl IntoResponse> {
    let links = state.store.get_all_links(&user.id)?;
    Ok(Json(links))
}

/// `DELETE /documents/link/{hash}`
pub async fn delete_link(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(hash): Path<String>,
) -> AppResult<impl IntoResponse> {
    if !state.resolver.unlink(&user.id, &hash)? {
        return Err(AppError::not_found("Link not found"));
    }
    Ok(Json(json!({ "status": "success" })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

/// `GET /books`
pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<ListParams>,
) -> AppResult<impl IntoResponse> {
    let books = collect_books(state.store.as_ref(), &user.id)?;
    let books = list_page(
        books,
        params.offset.unwrap_or(0),
        params.limit.unwrap_or(usize::MAX),
    );
    Ok(Json(json!({ "books": books })))
}

#[derive(Debug, Deserialize)]
pub struct LabelRequest {
    #[serde(default)]
    canonical_hash: String,
    #[serde(default)]
    label: String,
}

/// `PUT /books/label`
pub async fn set_label(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<LabelRequest>,
) -> AppResult<impl IntoResponse> {
    if body.canonical_hash.is_empty() || body.label.is_empty() {
        return Err(AppError::bad_request("Canonical hash and label are required"));
    }
    // a label attaches to a known book: a canonical with progress, or one
    // that other hashes link to
    let known = state
        .store
        .get_progress(&user.id, &body.canonical_hash)?
        .is_some()
        || state
            .store
            .get_all_links(&user.id)?
            .iter()
            .any(|link| link.canonical_hash == body.canonical_hash);
    if !known {
        return Err(AppError::not_found("Book not found"));
    }
    state
        .store
        .set_label(&user.id, &body.canonical_hash, &body.label)?;
    Ok(Json(json!({
        "canonical_hash": body.canonical_hash,
        "label": body.label,
    })))
}

/// `DELETE /books/label/{hash}`
pub async fn delete_label(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(hash): Path<String>,
) -> AppResult<impl IntoResponse> {
    if !state.store.delete_label(&user.id, &hash)? {
        return Err(AppError::not_found("Label not found"));
    }
    Ok(Json(json!({ "status": "success" })))
}
