//! # Cinedex Binary
//!
//! The entry point that assembles the application from settings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cx_api::{router, AppState};
use cx_auth_jwt::{JwtCredentialManager, TokenPolicy};
use cx_cache::MemoryCache;
use cx_config::{CacheBackend, CacheSettings, LogFormat, Settings};
use cx_core::traits::Cache;
use cx_db_sqlite::SqliteCatalog;
use cx_services::{AuthService, MovieService, ReactionService};
use cx_storage_local::LocalMediaStore;
use secrecy::ExposeSecret;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_FILTER: &str = "info,cinedex=debug,cx_services=debug,cx_db_sqlite=debug,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(settings.log_format);

    // 1. Relational store
    let catalog = Arc::new(
        SqliteCatalog::new(&settings.database.url, settings.database.max_connections)
            .await
            .with_context(|| format!("opening {}", settings.database.url))?,
    );

    // 2. Shared cache (recency view + revocation markers)
    let cache = build_cache(&settings.cache)?;

    // 3. Credentials
    let credentials = Arc::new(JwtCredentialManager::new(
        TokenPolicy {
            access_secret: settings.auth.access_token_secret.expose_secret().to_string(),
            refresh_secret: settings.auth.refresh_token_secret.expose_secret().to_string(),
            access_ttl: chrono::Duration::seconds(settings.auth.access_token_ttl_secs),
            refresh_ttl: chrono::Duration::seconds(settings.auth.refresh_token_ttl_secs),
        },
        cache.clone(),
    ));

    // 4. Media
    let media = Arc::new(LocalMediaStore::new(&settings.media.temp_dir, &settings.media.movie_dir));

    let state = Arc::new(AppState {
        movies: MovieService::new(
            catalog.clone(),
            catalog.clone(),
            cache,
            media,
            Duration::from_millis(settings.cache.recent_ttl_ms),
        ),
        reactions: ReactionService::new(catalog.clone(), catalog.clone(), catalog.clone()),
        auth: AuthService::new(catalog, credentials),
    });

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("cinedex listening on http://{addr}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Plain => registry.with(fmt::layer()).init(),
    }
}

fn build_cache(settings: &CacheSettings) -> anyhow::Result<Arc<dyn Cache>> {
    match settings.backend {
        CacheBackend::Memory => {
            let cache = Arc::new(MemoryCache::new());
            let sweeper = cache.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(CACHE_PURGE_INTERVAL);
                loop {
                    tick.tick().await;
                    sweeper.purge_expired();
                }
            });
            tracing::info!("using in-process cache");
            Ok(cache)
        }
        #[cfg(feature = "redis")]
        CacheBackend::Redis => {
            let url = settings.redis_url.as_deref().context("cache.redis_url is not set")?;
            tracing::info!("using redis cache");
            Ok(Arc::new(cx_cache::RedisCache::new(url)?))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => anyhow::bail!("cache.backend = \"redis\" needs a build with the `redis` feature"),
    }
}
