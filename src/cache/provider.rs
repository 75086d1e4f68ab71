//! # 缓存抽象层
//!
//! 对象安全的统一缓存接口；值以序列化后的字符串存取，
//! 由调用方负责编解码

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// 缓存抽象trait
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// 设置缓存值并指定TTL
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// 获取缓存值
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 删除缓存值
    async fn delete(&self, key: &str) -> Result<()>;

    /// 检查键是否存在
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 实现名称，用于诊断日志
    fn name(&self) -> &'static str;
}

/// 缓存项
#[derive(Debug, Clone)]
struct CacheSlot {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheSlot {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

/// 内存缓存实现
///
/// 单进程部署或 Redis 不可用时的回退实现
pub struct MemoryCache {
    data: RwLock<HashMap<String, CacheSlot>>,
    max_entries: usize,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            max_entries,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    fn cleanup_expired(&self) {
        let mut data = self.data.write().unwrap();
        data.retain(|_, slot| !slot.is_expired());
    }

    fn ensure_capacity(&self) {
        let mut data = self.data.write().unwrap();
        if data.len() >= self.max_entries {
            // 先尝试移除过期项，没有则移除任意一项
            let mut to_remove = None;
            for (key, slot) in data.iter() {
                if slot.is_expired() {
                    to_remove = Some(key.clone());
                    break;
                }
            }
            if to_remove.is_none() {
                to_remove = data.keys().next().cloned();
            }
            if let Some(key) = to_remove {
                data.remove(&key);
            }
        }
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count.load(Ordering::Relaxed)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.ensure_capacity();
        let slot = CacheSlot::new(value.to_string(), ttl);
        let mut data = self.data.write().unwrap();
        data.insert(key.to_string(), slot);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.cleanup_expired();

        let data = self.data.read().unwrap();
        match data.get(key) {
            Some(slot) if !slot.is_expired() => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Ok(Some(slot.value.clone()))
            }
            _ => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.data.write().unwrap();
        data.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.cleanup_expired();
        let data = self.data.read().unwrap();
        Ok(data.get(key).is_some_and(|slot| !slot.is_expired()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_round_trip() {
        let cache = MemoryCache::new(16);
        cache.set("k1", "v1", None).await.unwrap();
        assert_eq!(cache.get("k1").await.unwrap(), Some("v1".to_string()));
        assert_eq!(cache.hit_count(), 1);
    }

    #[tokio::test]
    async fn ttl_expiry_counts_as_miss() {
        let cache = MemoryCache::new(16);
        cache
            .set("short", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.miss_count(), 1);
        assert!(!cache.exists("short").await.unwrap());
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let cache = MemoryCache::new(2);
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", None).await.unwrap();
        cache.set("c", "3", None).await.unwrap();

        let data = cache.data.read().unwrap();
        assert!(data.len() <= 2);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new(16);
        cache.set("gone", "v", None).await.unwrap();
        cache.delete("gone").await.unwrap();
        assert_eq!(cache.get("gone").await.unwrap(), None);
    }
}
