//! # Domain Models
//!
//! These structs represent the core entities of cinedex.
//! Identifiers are store-generated integers; every persisted entity embeds
//! [`AuditFields`] instead of inheriting a base record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Timestamps and optimistic version shared by every persisted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFields {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl AuditFields {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { created_at: now, updated_at: now, version: 1 }
    }
}

/// Privilege rank of a user. Lower rank = higher privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Role {
    Admin = 0,
    PaidUser = 1,
    User = 2,
}

impl Role {
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// True when this role is at least as privileged as `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self.rank() <= required.rank()
    }
}

impl From<Role> for u8 {
    fn from(role: Role) -> Self {
        role.rank()
    }
}

impl TryFrom<u8> for Role {
    type Error = String;

    fn try_from(rank: u8) -> Result<Self, Self::Error> {
        match rank {
            0 => Ok(Role::Admin),
            1 => Ok(Role::PaidUser),
            2 => Ok(Role::User),
            other => Err(format!("unknown role rank {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Director {
    pub id: i64,
    pub name: String,
    pub dob: NaiveDate,
    pub nationality: String,
    #[serde(flatten)]
    pub audit: AuditFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    /// Unique across the catalog
    pub name: String,
    #[serde(flatten)]
    pub audit: AuditFields,
}

/// Free-text body owned 1:1 by a movie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetail {
    pub id: i64,
    pub detail: String,
    #[serde(flatten)]
    pub audit: AuditFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    /// Argon2 PHC string, never rendered
    #[serde(skip_serializing, default)]
    pub password: String,
    pub role: Role,
    #[serde(flatten)]
    pub audit: AuditFields,
}

/// A movie row with its foreign keys, without joined relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub creator_id: i64,
    pub director_id: i64,
    pub detail_id: i64,
    /// Denormalized counters, recomputed outside this service
    pub like_count: i64,
    pub dislike_count: i64,
    pub movie_file_path: String,
    #[serde(flatten)]
    pub audit: AuditFields,
}

/// A movie joined with its relations.
///
/// List queries join director and genres only; detail fetches also carry
/// the owned detail and the creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieView {
    #[serde(flatten)]
    pub movie: Movie,
    pub director: Director,
    pub genres: Vec<Genre>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<MovieDetail>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub creator: Option<User>,
}

/// One entry of a listed page.
///
/// `like_status` is `None` when no acting user was given, so the field is
/// omitted entirely; `Some(None)` renders as `"likeStatus": null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieListItem {
    #[serde(flatten)]
    pub view: MovieView,
    #[serde(rename = "likeStatus", skip_serializing_if = "Option::is_none")]
    pub like_status: Option<Option<bool>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoviePage {
    pub data: Vec<MovieListItem>,
    pub next_cursor: Option<String>,
    /// Movies matching the title filter, regardless of cursor and page size
    pub count: i64,
}

/// Input for the transactional create.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMovie {
    pub title: String,
    pub detail: String,
    pub director_id: i64,
    pub genre_ids: Vec<i64>,
    /// Name of the upload waiting in temporary storage
    pub movie_file_name: String,
}

/// Input for the transactional update. Every field is independent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMovie {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub director_id: Option<i64>,
    pub genre_ids: Option<Vec<i64>>,
}

/// Row written by the store when a movie is created.
#[derive(Debug, Clone)]
pub struct MovieInsert {
    pub title: String,
    pub detail_id: i64,
    pub director_id: i64,
    pub creator_id: i64,
    pub movie_file_path: String,
}

/// Scalar columns changed in place by an update.
#[derive(Debug, Clone, Default)]
pub struct MovieFieldUpdate {
    pub title: Option<String>,
    pub director_id: Option<i64>,
}

/// Movie row loaded inside a write transaction with the relations an update diffs against.
#[derive(Debug, Clone)]
pub struct MovieAggregate {
    pub movie: Movie,
    pub detail: MovieDetail,
    pub genres: Vec<Genre>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDirector {
    pub name: String,
    pub dob: NaiveDate,
    pub nationality: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGenre {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// A user's like/dislike on a movie. Absence of a record means "no reaction".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub movie_id: i64,
    pub user_id: i64,
    pub is_like: bool,
}

/// State returned after a reaction toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionOutcome {
    pub is_like: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by every issued bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: i64,
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// The resolved caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl From<&TokenClaims> for Identity {
    fn from(claims: &TokenClaims) -> Self {
        Self { user_id: claims.sub, role: claims.role }
    }
}

/// Decoded "identity:secret" pair from a `Basic` authorization value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub refresh_token: String,
    pub access_token: String,
}
