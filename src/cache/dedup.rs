//! # 去重与关联状态层
//!
//! 包装底层键值存储：指纹去重抑制窗口内的重复下游写入，
//! 关联条目保存响应到达前的请求侧 LLM 元数据。
//! 所有操作失败即软化：查询按未命中处理、写入跳过，
//! 管道在无缓存的情况下继续持久化与导出。

use crate::cache::keys::CacheKey;
use crate::cache::provider::CacheProvider;
use crate::config::DedupConfig;
use crate::metrics::PipelineMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::warn;

/// 去重条目：同一指纹在滑动窗口内的观测状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupEntry {
    /// 请求指纹
    pub fingerprint: String,
    /// 首次观测到该指纹的流
    pub first_flow_id: String,
    /// 首次观测时间
    pub first_seen_at: DateTime<Utc>,
    /// 最近一次观测时间
    pub last_seen_at: DateTime<Utc>,
    /// 窗口内的重复命中次数
    pub hits: u32,
}

/// 去重/关联层
pub struct DedupLayer {
    provider: Arc<dyn CacheProvider>,
    config: DedupConfig,
    metrics: Arc<PipelineMetrics>,
}

impl DedupLayer {
    pub fn new(
        provider: Arc<dyn CacheProvider>,
        config: DedupConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            provider,
            config,
            metrics,
        }
    }

    /// 查询指纹对应的去重条目，任何失败都按未命中处理
    pub async fn lookup(&self, fingerprint: &str) -> Option<DedupEntry> {
        let key = CacheKey::Dedup {
            fingerprint: fingerprint.to_string(),
        }
        .build();
        self.get_soft(&key).await
    }

    /// 写入/刷新去重条目，滑动窗口TTL
    pub async fn upsert(&self, entry: &DedupEntry) {
        let key = CacheKey::Dedup {
            fingerprint: entry.fingerprint.clone(),
        }
        .build();
        self.set_soft(&key, entry, self.config.entry_ttl()).await;
    }

    /// 观测一次指纹：返回窗口内已存在的条目（即判定为重复），
    /// 并刷新滑动窗口
    pub async fn observe(&self, fingerprint: &str, flow_id: &str) -> Option<DedupEntry> {
        let now = Utc::now();
        match self.lookup(fingerprint).await {
            Some(mut entry) => {
                entry.hits += 1;
                entry.last_seen_at = now;
                self.upsert(&entry).await;
                self.metrics
                    .dedup_hits
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Some(entry)
            }
            None => {
                let entry = DedupEntry {
                    fingerprint: fingerprint.to_string(),
                    first_flow_id: flow_id.to_string(),
                    first_seen_at: now,
                    last_seen_at: now,
                    hits: 0,
                };
                self.upsert(&entry).await;
                None
            }
        }
    }

    /// 存放请求侧关联状态（LLM 元数据），等待响应到达
    pub async fn put_correlation<T: Serialize + Sync>(&self, flow_id: &str, meta: &T) {
        let key = CacheKey::Correlation {
            flow_id: flow_id.to_string(),
        }
        .build();
        self.set_soft(&key, meta, self.config.correlation_ttl())
            .await;
    }

    /// 取出请求侧关联状态；取出后即删除
    pub async fn take_correlation<T: DeserializeOwned>(&self, flow_id: &str) -> Option<T> {
        let key = CacheKey::Correlation {
            flow_id: flow_id.to_string(),
        }
        .build();
        let value: Option<T> = self.get_soft(&key).await;
        if value.is_some() {
            // 删除失败无所谓，TTL 会兜底
            let _ = self.provider.delete(&key).await;
        }
        value
    }

    /// 带超时的软读取
    async fn get_soft<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let result =
            tokio::time::timeout(self.config.op_timeout(), self.provider.get(key)).await;

        match result {
            Ok(Ok(Some(raw))) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "缓存条目反序列化失败，按未命中处理");
                    None
                }
            },
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                self.degraded(key, &format!("{e}"));
                None
            }
            Err(_) => {
                self.degraded(key, "操作超时");
                None
            }
        }
    }

    /// 带超时的软写入
    async fn set_soft<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: std::time::Duration,
    ) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "缓存条目序列化失败，跳过写入");
                return;
            }
        };

        let result =
            tokio::time::timeout(self.config.op_timeout(), self.provider.set(key, &raw, Some(ttl)))
                .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.degraded(key, &format!("{e}")),
            Err(_) => self.degraded(key, "操作超时"),
        }
    }

    fn degraded(&self, key: &str, reason: &str) {
        self.metrics
            .cache_degraded
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        warn!(
            provider = self.provider.name(),
            key = %key,
            reason = %reason,
            "缓存降级：本次操作按未命中/跳过处理"
        );
    }
}
