//! # 调度队列与工作池
//!
//! 把代理热路径（生产者）与持久化/导出（消费者）解耦。
//! 按 `hash(flow_id)` 分区保证同一流的更新由同一工作任务按序处理，
//! pending 先于 complete，无需跨任务加锁。

mod queue;
mod worker;

pub use queue::DispatchQueue;
pub use worker::{WorkerContext, spawn_workers};

use crate::normalizer::FlowRecord;
use bytes::Bytes;

/// 一次入队的流更新
#[derive(Debug, Clone)]
pub enum FlowUpdate {
    /// 请求已见，记录处于 pending 状态
    Pending {
        record: FlowRecord,
        /// LLM 流的请求体捕获，供工作任务离线提取模型与流式标记
        llm_request_body: Option<Bytes>,
    },
    /// 响应或错误已见，记录最终化
    Complete {
        record: FlowRecord,
        /// 请求侧捕获的回退副本（关联缓存丢失时仍可解析）
        llm_request_body: Option<Bytes>,
        /// LLM 流的响应体捕获，供工作任务提取用量
        llm_response_body: Option<Bytes>,
    },
}

impl FlowUpdate {
    pub fn flow_id(&self) -> &str {
        match self {
            Self::Pending { record, .. } | Self::Complete { record, .. } => &record.flow_id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn record(&self) -> &FlowRecord {
        match self {
            Self::Pending { record, .. } | Self::Complete { record, .. } => record,
        }
    }
}
