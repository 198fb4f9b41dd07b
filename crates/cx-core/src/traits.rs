//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! Store and cache ports report infrastructure failures as `anyhow::Error`;
//! the services translate them into [`AppError`](crate::error::AppError).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    BasicCredentials, Director, Genre, Movie, MovieAggregate, MovieFieldUpdate, MovieInsert,
    MovieView, NewDirector, NewGenre, NewUser, Reaction, Role, TokenClaims, TokenKind, User,
};
use crate::pagination::PageWindow;

/// Persistence contract for movies and their reference data.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Opens a transactional session held by the caller until commit or rollback.
    async fn begin(&self) -> anyhow::Result<Box<dyn CatalogTx>>;

    // Movie reads
    async fn find_movie(&self, id: i64) -> anyhow::Result<Option<Movie>>;
    /// Single-row join across director, genres, detail and creator.
    async fn find_movie_view(&self, id: i64) -> anyhow::Result<Option<MovieView>>;
    /// One keyset window of movies joined with director and genres.
    async fn list_movies(&self, title: Option<&str>, window: &PageWindow) -> anyhow::Result<Vec<MovieView>>;
    async fn count_movies(&self, title: Option<&str>) -> anyhow::Result<i64>;
    async fn recent_movies(&self, limit: i64) -> anyhow::Result<Vec<Movie>>;

    // Movie deletes (join rows cascade in the store)
    async fn delete_movie(&self, id: i64) -> anyhow::Result<()>;
    async fn delete_detail(&self, id: i64) -> anyhow::Result<()>;

    // Reference data
    async fn insert_director(&self, director: &NewDirector) -> anyhow::Result<Director>;
    async fn list_directors(&self) -> anyhow::Result<Vec<Director>>;
    async fn insert_genre(&self, genre: &NewGenre) -> anyhow::Result<Genre>;
    async fn list_genres(&self) -> anyhow::Result<Vec<Genre>>;
}

/// Operations available inside one write transaction.
///
/// Dropping a session without committing discards its writes.
#[async_trait]
pub trait CatalogTx: Send {
    async fn find_director(&mut self, id: i64) -> anyhow::Result<Option<Director>>;
    /// Returns only the genres that exist; callers compare against the request.
    async fn find_genres(&mut self, ids: &[i64]) -> anyhow::Result<Vec<Genre>>;
    async fn load_aggregate(&mut self, id: i64) -> anyhow::Result<Option<MovieAggregate>>;

    async fn insert_detail(&mut self, body: &str) -> anyhow::Result<i64>;
    async fn insert_movie(&mut self, row: &MovieInsert) -> anyhow::Result<i64>;
    async fn update_movie(&mut self, id: i64, fields: &MovieFieldUpdate) -> anyhow::Result<()>;
    async fn update_detail(&mut self, id: i64, body: &str) -> anyhow::Result<()>;

    // Movie-genre join rows
    async fn add_genres(&mut self, movie_id: i64, genre_ids: &[i64]) -> anyhow::Result<()>;
    async fn remove_genres(&mut self, movie_id: i64, genre_ids: &[i64]) -> anyhow::Result<()>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}

/// Per-(movie, user) reaction records.
#[async_trait]
pub trait ReactionRepo: Send + Sync {
    async fn find_reaction(&self, movie_id: i64, user_id: i64) -> anyhow::Result<Option<Reaction>>;
    /// Batched lookup of one user's reactions on the given movies.
    async fn reactions_for_user(&self, user_id: i64, movie_ids: &[i64]) -> anyhow::Result<Vec<Reaction>>;
    async fn insert_reaction(&self, reaction: &Reaction) -> anyhow::Result<()>;
    async fn update_reaction(&self, movie_id: i64, user_id: i64, is_like: bool) -> anyhow::Result<()>;
    async fn delete_reaction(&self, movie_id: i64, user_id: i64) -> anyhow::Result<()>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_user(&self, id: i64) -> anyhow::Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn insert_user(&self, user: &NewUser) -> anyhow::Result<User>;
}

/// Shared key-value store with per-key expiry. Last write wins.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;
}

/// Media storage contract for uploaded movie files.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Path recorded on the movie row for a file once it is promoted.
    fn permanent_path(&self, file_name: &str) -> String;
    /// Moves an upload from temporary to permanent storage.
    async fn promote(&self, file_name: &str) -> anyhow::Result<()>;
}

/// Issuance, verification and revocation of credentials.
#[async_trait]
pub trait CredentialManager: Send + Sync {
    /// Signs a token of the given kind for `subject`.
    fn issue(&self, subject: i64, role: Role, kind: TokenKind) -> Result<String>;

    /// Validates a raw `Bearer <token>` value, including the revocation list.
    async fn verify(&self, raw_bearer: &str, kind: TokenKind) -> Result<TokenClaims>;

    /// Rejects `token` until its own expiry, even though its signature stays valid.
    async fn revoke(&self, token: &str) -> Result<()>;

    async fn is_revoked(&self, token: &str) -> Result<bool>;

    /// Decodes a raw `Basic <base64(email:password)>` value.
    fn parse_basic(&self, raw_basic: &str) -> Result<BasicCredentials>;

    fn hash_password(&self, password: &str) -> Result<String>;

    /// Verifies a password against a stored hash.
    fn verify_password(&self, password: &str, hash: &str) -> bool;
}
