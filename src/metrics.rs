//! # 管道运行计数器
//!
//! 所有丢弃、降级与导出结果都要可观测，通过仪表板 `/api/overview` 暴露

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 进程级管道计数器，跨工作任务共享
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// 成功入队的更新数
    pub enqueued: AtomicU64,
    /// 队列溢出时丢弃的 pending 更新数
    pub dropped_pending: AtomicU64,
    /// 关停后被拒收的更新数
    pub rejected_closed: AtomicU64,
    /// 规范化阶段丢弃的畸形事件数
    pub malformed_events: AtomicU64,
    /// 持久化成功的记录写入数
    pub flows_persisted: AtomicU64,
    /// 持久化瞬态错误触发的重试次数
    pub persist_retries: AtomicU64,
    /// 重试预算耗尽后的持久写入失败数
    pub persist_failures: AtomicU64,
    /// 去重命中（窗口内重复指纹）数
    pub dedup_hits: AtomicU64,
    /// 缓存降级（超时或存储不可用，按未命中处理）次数
    pub cache_degraded: AtomicU64,
    /// 创建的 LLM 跨度数
    pub spans_created: AtomicU64,
    /// 成功提交到追踪后端的跨度数
    pub spans_sent: AtomicU64,
    /// 导出失败（预算耗尽或队列满）的跨度数
    pub spans_failed: AtomicU64,
    /// 关停宽限期内未冲刷完成的记录数
    pub lost_on_shutdown: AtomicU64,
}

/// 计数器快照，用于只读查询序列化
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub dropped_pending: u64,
    pub rejected_closed: u64,
    pub malformed_events: u64,
    pub flows_persisted: u64,
    pub persist_retries: u64,
    pub persist_failures: u64,
    pub dedup_hits: u64,
    pub cache_degraded: u64,
    pub spans_created: u64,
    pub spans_sent: u64,
    pub spans_failed: u64,
    pub lost_on_shutdown: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, delta: u64) {
        counter.fetch_add(delta, Ordering::Relaxed);
    }

    /// 生成一致性要求不高的快照读数
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_pending: self.dropped_pending.load(Ordering::Relaxed),
            rejected_closed: self.rejected_closed.load(Ordering::Relaxed),
            malformed_events: self.malformed_events.load(Ordering::Relaxed),
            flows_persisted: self.flows_persisted.load(Ordering::Relaxed),
            persist_retries: self.persist_retries.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            cache_degraded: self.cache_degraded.load(Ordering::Relaxed),
            spans_created: self.spans_created.load(Ordering::Relaxed),
            spans_sent: self.spans_sent.load(Ordering::Relaxed),
            spans_failed: self.spans_failed.load(Ordering::Relaxed),
            lost_on_shutdown: self.lost_on_shutdown.load(Ordering::Relaxed),
        }
    }
}
