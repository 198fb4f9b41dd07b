use std::time::{Duration, Instant};

use async_trait::async_trait;
use cx_core::traits::Cache;
use dashmap::DashMap;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache. Entries are dropped lazily when read after expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = Instant::now();
        // The read guard must be released before `remove_if` takes the shard lock.
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.expires_at));

        match hit {
            Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
            Some(_) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}
