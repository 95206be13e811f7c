//! Public progress-card route.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;

use super::error::{AppError, AppResult};
use crate::{
    books::{card_selection, collect_books},
    card::render_progress_card,
    state::AppState,
};

/// Books shown when no limit is given.
const DEFAULT_CARD_BOOKS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct CardParams {
    limit: Option<usize>,
}

/// `GET /card/{username}`
///
/// Unauthenticated: the card is meant to be embedded in a readme. The
/// response is cacheable to keep repeated embeds cheap.
pub async fn get(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<CardParams>,
) -> AppResult<impl IntoResponse> {
    let Some(user) = state.store.get_user_by_name(&username)? else {
        return Err(AppError::not_found("User not found"));
    };
    let books = collect_books(state.store.as_ref(), &user.id)?;
    let books = card_selection(books, params.limit.unwrap_or(DEFAULT_CARD_BOOKS));
    let svg = render_progress_card(&books);
    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=300"),
        ],
        svg,
    ))
}
