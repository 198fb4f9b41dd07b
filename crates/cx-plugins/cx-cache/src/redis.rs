use std::time::Duration;

use async_trait::async_trait;
use cx_core::traits::Cache;
use deadpool_redis::{redis, Config, Pool, Runtime};

/// Redis-backed cache shared between processes.
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let pool = Config::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        tracing::info!("redis cache pool created");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value = redis::cmd("GET").arg(key).query_async::<Option<String>>(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        // PX rejects zero
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
