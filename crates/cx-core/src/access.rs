//! # Access Control
//!
//! Operation names mapped to the privilege they require, consulted by
//! [`authorize`] before an operation runs.

use crate::error::{AppError, Result};
use crate::models::{Identity, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anyone, with or without credentials
    Public,
    /// Any verified access token
    Authenticated,
    /// A role at least as privileged as the given one
    AtLeast(Role),
}

/// Registration and login present Basic credentials instead of a token and
/// are not listed.
pub const ACCESS_TABLE: &[(&str, Access)] = &[
    ("auth.rotate", Access::Authenticated),
    ("auth.revoke", Access::Authenticated),
    ("movie.list", Access::Public),
    ("movie.detail", Access::Public),
    ("movie.recent", Access::Authenticated),
    ("movie.like", Access::Authenticated),
    ("movie.dislike", Access::Authenticated),
    ("movie.create", Access::AtLeast(Role::Admin)),
    ("movie.update", Access::AtLeast(Role::Admin)),
    ("movie.remove", Access::AtLeast(Role::Admin)),
    ("director.list", Access::Public),
    ("director.create", Access::AtLeast(Role::Admin)),
    ("genre.list", Access::Public),
    ("genre.create", Access::AtLeast(Role::Admin)),
];

pub fn required_access(operation: &str) -> Option<Access> {
    ACCESS_TABLE
        .iter()
        .find(|(name, _)| *name == operation)
        .map(|(_, access)| *access)
}

/// Checks `identity` against the table entry for `operation`.
///
/// Operations missing from the table are denied.
pub fn authorize(operation: &str, identity: Option<&Identity>) -> Result<()> {
    let access = required_access(operation)
        .ok_or_else(|| AppError::Forbidden(format!("operation `{operation}` is not permitted")))?;

    match (access, identity) {
        (Access::Public, _) => Ok(()),
        (_, None) => Err(AppError::Unauthorized("a valid access token is required".into())),
        (Access::Authenticated, Some(_)) => Ok(()),
        (Access::AtLeast(required), Some(identity)) if identity.role.satisfies(required) => Ok(()),
        (Access::AtLeast(required), Some(_)) => {
            Err(AppError::Forbidden(format!("`{operation}` requires role {required:?} or higher")))
        }
    }
}
