//! # Redis 缓存客户端
//!
//! 提供 Redis 连接管理和基础操作；连接管理器可被所有工作任务并发共享

use crate::cache::provider::CacheProvider;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// 是否启用 Redis（关闭时回退到内存缓存）
    pub enabled: bool,
    /// Redis 服务器地址
    pub host: String,
    /// Redis 服务器端口
    pub port: u16,
    /// 数据库编号
    pub database: u8,
    /// 连接密码（可选）
    pub password: Option<String>,
    /// 连接超时时间（秒）
    pub connection_timeout: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connection_timeout: 10,
        }
    }
}

impl RedisConfig {
    /// 构建 Redis 连接 URL
    pub fn build_url(&self) -> String {
        if let Some(password) = &self.password {
            format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            )
        } else {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        }
    }
}

/// Redis 缓存客户端
pub struct CacheClient {
    /// Redis 连接管理器
    connection_manager: ConnectionManager,
}

impl CacheClient {
    /// 创建新的缓存客户端
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        info!("正在连接 Redis 服务器: {}:{}", config.host, config.port);

        let client = Client::open(config.build_url())
            .map_err(|e| PipelineError::cache_with_source("创建 Redis 客户端失败", e))?;

        let connection_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| PipelineError::cache_with_source("建立 Redis 连接失败", e))?;

        info!("Redis 连接建立成功");

        Ok(Self { connection_manager })
    }

    /// 设置缓存值并指定 TTL
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.connection_manager.clone();

        conn.set_ex::<_, _, ()>(key, value, ttl_seconds)
            .await
            .map_err(|e| PipelineError::cache_with_source(format!("设置缓存失败: {key}"), e))?;

        debug!(key = %key, ttl = ttl_seconds, "缓存设置成功");
        Ok(())
    }

    /// 获取缓存值
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection_manager.clone();

        let result: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| PipelineError::cache_with_source(format!("获取缓存失败: {key}"), e))?;

        Ok(result)
    }

    /// 删除缓存
    pub async fn delete_key(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection_manager.clone();

        let deleted_count: i32 = conn
            .del(key)
            .await
            .map_err(|e| PipelineError::cache_with_source(format!("删除缓存失败: {key}"), e))?;

        Ok(deleted_count > 0)
    }

    /// 检查缓存是否存在
    pub async fn key_exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection_manager.clone();

        let exists: bool = conn.exists(key).await.map_err(|e| {
            PipelineError::cache_with_source(format!("检查缓存存在性失败: {key}"), e)
        })?;

        Ok(exists)
    }

    /// 测试连接
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection_manager.clone();

        let response: String = redis::Cmd::new()
            .arg("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| PipelineError::cache_with_source("Redis ping 失败", e))?;

        if response == "PONG" {
            Ok(())
        } else {
            Err(PipelineError::cache(format!(
                "Redis ping 响应异常: {response}"
            )))
        }
    }
}

impl Clone for CacheClient {
    fn clone(&self) -> Self {
        Self {
            connection_manager: self.connection_manager.clone(),
        }
    }
}

#[async_trait]
impl CacheProvider for CacheClient {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        // Redis 侧要求显式过期；未指定 TTL 时按一小时兜底
        let ttl_seconds = ttl.map_or(3600, |t| t.as_secs().max(1));
        self.set_with_ttl(key, value, ttl_seconds).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_raw(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.delete_key(key).await.map(|_| ())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.key_exists(key).await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
