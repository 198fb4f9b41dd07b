//! # cx-api Handlers
//!
//! Each handler resolves the caller, checks the access table and hands off
//! to a service. No domain logic lives here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use cx_core::models::{
    CreateMovie, Director, Genre, Movie, MoviePage, MovieView, NewDirector, NewGenre, ReactionOutcome, TokenPair,
    UpdateMovie, User,
};
use cx_core::pagination::PageRequest;
use cx_services::{AuthService, MovieService, ReactionService};
use serde::{Deserialize, Serialize};

use crate::middleware::{authorization, ApiError, Caller};

/// State shared across all request handlers.
pub struct AppState {
    pub movies: MovieService,
    pub reactions: ReactionService,
    pub auth: AuthService,
}

type ApiResult<T> = Result<T, ApiError>;

// ── Auth ─────────────────────────────────────────────────────────────────────

pub async fn register(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.auth.register(authorization(&headers)?).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<TokenPair>> {
    Ok(Json(state.auth.login(authorization(&headers)?).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    access_token: String,
}

/// Authenticated by the refresh token in the header rather than an access token.
pub async fn rotate_access(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<AccessToken>> {
    let access_token = state.auth.rotate_access(authorization(&headers)?).await?;
    Ok(Json(AccessToken { access_token }))
}

#[derive(Deserialize)]
pub struct RevokeRequest {
    token: String,
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<RevokeRequest>,
) -> ApiResult<StatusCode> {
    caller.require("auth.revoke")?;
    state.auth.revoke(&body.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Movies ───────────────────────────────────────────────────────────────────

/// `?title=&cursor=&order=likeCount_DESC,id_DESC&take=`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    title: Option<String>,
    cursor: Option<String>,
    order: Option<String>,
    take: Option<i64>,
}

impl ListQuery {
    fn page_request(&self) -> PageRequest {
        let order = self
            .order
            .as_deref()
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        PageRequest { cursor: self.cursor.clone(), order, take: self.take }
    }
}

pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<MoviePage>> {
    let acting = caller.permit("movie.list")?;
    let page = state
        .movies
        .list(query.title.as_deref(), &query.page_request(), acting.map(|identity| identity.user_id))
        .await?;
    Ok(Json(page))
}

pub async fn recent_movies(State(state): State<Arc<AppState>>, caller: Caller) -> ApiResult<Json<Vec<Movie>>> {
    caller.require("movie.recent")?;
    Ok(Json(state.movies.recent().await?))
}

pub async fn movie_detail(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<MovieView>> {
    caller.permit("movie.detail")?;
    Ok(Json(state.movies.detail(id).await?))
}

pub async fn create_movie(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<CreateMovie>,
) -> ApiResult<(StatusCode, Json<MovieView>)> {
    let identity = caller.require("movie.create")?;
    let view = state.movies.create(input, identity.user_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn update_movie(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(input): Json<UpdateMovie>,
) -> ApiResult<Json<MovieView>> {
    caller.require("movie.update")?;
    Ok(Json(state.movies.update(id, input).await?))
}

pub async fn remove_movie(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<i64>> {
    caller.require("movie.remove")?;
    Ok(Json(state.movies.remove(id).await?))
}

pub async fn like_movie(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<ReactionOutcome>> {
    let identity = caller.require("movie.like")?;
    Ok(Json(state.reactions.toggle(id, identity.user_id, true).await?))
}

pub async fn dislike_movie(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<Json<ReactionOutcome>> {
    let identity = caller.require("movie.dislike")?;
    Ok(Json(state.reactions.toggle(id, identity.user_id, false).await?))
}

// ── Reference data ───────────────────────────────────────────────────────────

pub async fn list_directors(State(state): State<Arc<AppState>>, caller: Caller) -> ApiResult<Json<Vec<Director>>> {
    caller.permit("director.list")?;
    Ok(Json(state.movies.directors().await?))
}

pub async fn create_director(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<NewDirector>,
) -> ApiResult<(StatusCode, Json<Director>)> {
    caller.require("director.create")?;
    Ok((StatusCode::CREATED, Json(state.movies.create_director(input).await?)))
}

pub async fn list_genres(State(state): State<Arc<AppState>>, caller: Caller) -> ApiResult<Json<Vec<Genre>>> {
    caller.permit("genre.list")?;
    Ok(Json(state.movies.genres().await?))
}

pub async fn create_genre(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(input): Json<NewGenre>,
) -> ApiResult<(StatusCode, Json<Genre>)> {
    caller.require("genre.create")?;
    Ok((StatusCode::CREATED, Json(state.movies.create_genre(input).await?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_comma_separated() {
        let query = ListQuery {
            order: Some("likeCount_DESC, id_DESC,".into()),
            take: Some(3),
            ..Default::default()
        };
        let request = query.page_request();
        assert_eq!(request.order, vec!["likeCount_DESC", "id_DESC"]);
        assert_eq!(request.take, Some(3));
        assert!(ListQuery::default().page_request().order.is_empty());
    }
}
