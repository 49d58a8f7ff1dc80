use crate::service::LibraryService;
use anyhow::Result;
use std::sync::Arc;
use tn_core::cache::{MemoryResultCache, RedisResultCache, ResultCache};
use tn_core::config::NodeConfig;
use tn_core::db;
use tracing::info;

/// Builds the service from process configuration. The cache client is
/// constructed here, once, and handed to the service; its lifecycle is tied
/// to process start and stop.
pub async fn bootstrap(config: &NodeConfig) -> Result<LibraryService> {
    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let cache: Arc<dyn ResultCache> = match &config.redis_url {
        Some(url) => {
            let cache = RedisResultCache::connect(url).await?;
            info!("result cache backed by redis");
            Arc::new(cache)
        }
        None => {
            info!("result cache running in process memory");
            Arc::new(MemoryResultCache::new())
        }
    };

    Ok(LibraryService::new(pool, cache, config.cache_ttl))
}
