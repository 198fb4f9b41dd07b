//! # cx-api
//!
//! The HTTP routing layer for cinedex.

pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

pub use handlers::AppState;

/// Builds the full router with tracing and CORS applied.
///
/// # Developer Note
/// The binary can `nest` this under a prefix (e.g., `/api/v1`) if needed.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Accounts
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/token/access", post(handlers::rotate_access))
        .route("/auth/token/block", post(handlers::revoke))
        // Movies
        .route("/movie", get(handlers::list_movies).post(handlers::create_movie))
        .route("/movie/recent", get(handlers::recent_movies))
        .route(
            "/movie/{id}",
            get(handlers::movie_detail)
                .patch(handlers::update_movie)
                .delete(handlers::remove_movie),
        )
        .route("/movie/{id}/like", post(handlers::like_movie))
        .route("/movie/{id}/dislike", post(handlers::dislike_movie))
        // Reference data
        .route("/director", get(handlers::list_directors).post(handlers::create_director))
        .route("/genre", get(handlers::list_genres).post(handlers::create_genre))
        .with_state(state)
        .layer(middleware::trace_layer())
        .layer(middleware::cors_policy())
}
