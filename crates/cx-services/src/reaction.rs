//! Like/dislike toggling per (movie, user).

use std::sync::Arc;

use cx_core::error::{AppError, Result};
use cx_core::models::{Reaction, ReactionOutcome};
use cx_core::traits::{CatalogRepo, ReactionRepo, UserRepo};

/// Store mutation that moves a reaction to its next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Insert,
    Update,
    Delete,
}

/// `None` is "no reaction". Repeating the current choice clears it.
fn step(current: Option<bool>, is_like: bool) -> Step {
    match current {
        None => Step::Insert,
        Some(existing) if existing == is_like => Step::Delete,
        Some(_) => Step::Update,
    }
}

pub struct ReactionService {
    catalog: Arc<dyn CatalogRepo>,
    users: Arc<dyn UserRepo>,
    reactions: Arc<dyn ReactionRepo>,
}

impl ReactionService {
    pub fn new(catalog: Arc<dyn CatalogRepo>, users: Arc<dyn UserRepo>, reactions: Arc<dyn ReactionRepo>) -> Self {
        Self { catalog, users, reactions }
    }

    /// Applies one like (`true`) or dislike (`false`) click and returns the
    /// resulting state.
    ///
    /// The existence checks, the mutation and the re-read run as separate
    /// statements, so concurrent toggles by the same user can interleave.
    #[tracing::instrument(skip(self))]
    pub async fn toggle(&self, movie_id: i64, user_id: i64, is_like: bool) -> Result<ReactionOutcome> {
        if self.catalog.find_movie(movie_id).await?.is_none() {
            return Err(AppError::BadRequest(format!("movie {movie_id} does not exist")));
        }
        if self.users.find_user(user_id).await?.is_none() {
            return Err(AppError::Unauthorized(format!("user {user_id} does not exist")));
        }

        let current = self.reactions.find_reaction(movie_id, user_id).await?;
        match step(current.map(|r| r.is_like), is_like) {
            Step::Insert => {
                self.reactions.insert_reaction(&Reaction { movie_id, user_id, is_like }).await?;
            }
            Step::Update => self.reactions.update_reaction(movie_id, user_id, is_like).await?,
            Step::Delete => self.reactions.delete_reaction(movie_id, user_id).await?,
        }

        let after = self.reactions.find_reaction(movie_id, user_id).await?;
        Ok(ReactionOutcome { is_like: after.map(|r| r.is_like) })
    }
}
