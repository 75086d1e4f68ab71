//! # 有界分区队列
//!
//! 入队在容量内非阻塞；溢出策略：丢弃该分区中最老的 pending 更新，
//! 绝不丢弃尚未落库的 complete 更新——用进行中状态的新鲜度
//! 换取已完成记录的必达。

use super::FlowUpdate;
use crate::metrics::PipelineMetrics;
use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

struct Partition {
    items: Mutex<VecDeque<FlowUpdate>>,
    notify: Notify,
}

/// 调度队列：每个工作任务一个分区
pub struct DispatchQueue {
    partitions: Vec<Partition>,
    capacity: usize,
    closed: AtomicBool,
    metrics: Arc<PipelineMetrics>,
}

impl DispatchQueue {
    /// 创建 `workers` 个分区、每分区容量 `capacity` 的队列
    pub fn new(workers: usize, capacity: usize, metrics: Arc<PipelineMetrics>) -> Self {
        let workers = workers.max(1);
        let partitions = (0..workers)
            .map(|_| Partition {
                items: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            })
            .collect();

        Self {
            partitions,
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.partitions.len()
    }

    /// 同一 flow_id 恒定映射到同一分区，保证每流处理有序
    fn partition_index(&self, flow_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        flow_id.hash(&mut hasher);
        (hasher.finish() as usize) % self.partitions.len()
    }

    /// 非阻塞入队；返回该更新是否被接受
    pub fn enqueue(&self, update: FlowUpdate) -> bool {
        if self.closed.load(Ordering::Acquire) {
            self.metrics.rejected_closed.fetch_add(1, Ordering::Relaxed);
            debug!(flow_id = %update.flow_id(), "队列已关停，拒收新更新");
            return false;
        }

        let idx = self.partition_index(update.flow_id());
        let partition = &self.partitions[idx];

        {
            let mut items = partition.items.lock().unwrap();

            if items.len() >= self.capacity {
                // 腾位：丢弃最老的 pending 更新
                let evicted = items
                    .iter()
                    .position(FlowUpdate::is_pending)
                    .map(|pos| items.remove(pos));

                match evicted {
                    Some(_) => {
                        self.metrics.dropped_pending.fetch_add(1, Ordering::Relaxed);
                        warn!(partition = idx, "队列溢出，丢弃最老的 pending 更新");
                    }
                    None if update.is_pending() => {
                        // 分区内全是 complete：新来的 pending 自身被丢弃
                        self.metrics.dropped_pending.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            partition = idx,
                            flow_id = %update.flow_id(),
                            "队列溢出且无可腾位的 pending，丢弃新到的 pending 更新"
                        );
                        return false;
                    }
                    // complete 永不丢弃，允许分区短暂超出容量
                    None => {}
                }
            }

            items.push_back(update);
        }

        self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        partition.notify.notify_one();
        true
    }

    /// 工作任务取出一条更新，队列空时返回 None
    pub fn try_pop(&self, worker_idx: usize) -> Option<FlowUpdate> {
        let mut items = self.partitions[worker_idx].items.lock().unwrap();
        items.pop_front()
    }

    /// 等待分区出现新更新（或关停唤醒）
    pub async fn wait(&self, worker_idx: usize) {
        self.partitions[worker_idx].notify.notified().await;
    }

    /// 关停：停止接收新更新并唤醒所有工作任务
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for partition in &self.partitions {
            // notify_one 在无等待者时保留 permit，避免 close 与 wait 竞争丢失唤醒
            partition.notify.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 所有分区中尚未处理的更新总数
    pub fn len(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.items.lock().unwrap().len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空所有分区并返回被放弃的更新数（关停宽限期兜底）
    pub fn drain_remaining(&self) -> usize {
        let mut drained = 0;
        for partition in &self.partitions {
            let mut items = partition.items.lock().unwrap();
            drained += items.len();
            items.clear();
        }
        drained
    }
}
