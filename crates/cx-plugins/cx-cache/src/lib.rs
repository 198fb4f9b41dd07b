//! # cx-cache
//!
//! `Cache` implementations: an in-process map with per-key expiry, and a
//! Redis-backed store behind the `redis` feature.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;
