//! # cx-services
//!
//! Application logic sitting between the HTTP surface and the plugin ports.
//! Each service owns `Arc<dyn Port>` handles and speaks `AppError`.

pub mod auth;
pub mod movie;
pub mod reaction;

pub use auth::AuthService;
pub use movie::{MovieService, RECENT_CACHE_KEY, RECENT_LIMIT};
pub use reaction::ReactionService;
