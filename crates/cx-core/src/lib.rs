//! cinedex/crates/cx-core/src/lib.rs
//!
//! The central domain types and interface definitions for cinedex.

pub mod access;
pub mod error;
pub mod models;
pub mod pagination;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;
