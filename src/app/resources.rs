//! # 进程级共享资源
//!
//! 数据库连接、缓存客户端与运行计数器在启动时构建一次，
//! 注入到每个工作任务，不做任何每调用的全局查找

use crate::cache::{CacheClient, CacheProvider, MemoryCache};
use crate::config::AppConfig;
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{info, warn};

/// 应用基础资源：配置、数据库、缓存、计数器
pub struct AppResources {
    config: Arc<AppConfig>,
    database: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheProvider>,
    metrics: Arc<PipelineMetrics>,
}

impl AppResources {
    /// 根据配置与数据库连接构建资源层
    ///
    /// Redis 不可用时降级到内存缓存：缓存只是优化，
    /// 不能因为它阻止管道启动
    pub async fn build(
        config: Arc<AppConfig>,
        database: Arc<DatabaseConnection>,
    ) -> Result<Arc<Self>> {
        let cache: Arc<dyn CacheProvider> = if config.redis.enabled {
            match CacheClient::new(&config.redis).await {
                Ok(client) => {
                    if let Err(e) = client.ping().await {
                        warn!(error = %e, "Redis ping 失败，降级到内存缓存");
                        Arc::new(MemoryCache::default())
                    } else {
                        Arc::new(client)
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Redis 连接失败，降级到内存缓存");
                    Arc::new(MemoryCache::default())
                }
            }
        } else {
            info!("Redis 未启用，使用内存缓存");
            Arc::new(MemoryCache::default())
        };

        Ok(Arc::new(Self {
            config,
            database,
            cache,
            metrics: Arc::new(PipelineMetrics::new()),
        }))
    }

    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn database(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.database)
    }

    #[must_use]
    pub fn cache(&self) -> Arc<dyn CacheProvider> {
        Arc::clone(&self.cache)
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }
}
