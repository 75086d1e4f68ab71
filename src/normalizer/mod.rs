//! # 流规范化器
//!
//! 把代理运行时的原始事件转换为结构化流记录。
//! 运行在代理事件钩子内部，必须在亚毫秒级返回：只做摘要计算、
//! 头部收集与分类判定，所有存储与网络 I/O 都交给调度队列的工作任务。
//! 任何失败都不得传播回代理的请求路径。

pub mod classifier;
mod record;

pub use record::FlowRecord;

use crate::config::{CaptureConfig, ClassifierConfig};
use crate::dispatch::{DispatchQueue, FlowUpdate};
use crate::intercept::{ErrorEvent, FlowObserver, RequestEvent, ResponseEvent, header_value};
use crate::metrics::PipelineMetrics;
use crate::utils::digest::body_digest;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use classifier::LlmClassifier;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// 等待响应到达的请求侧状态
struct PendingFlow {
    record: FlowRecord,
    llm_request_body: Option<Bytes>,
    inserted_at: DateTime<Utc>,
}

/// 流规范化器，实现 `FlowObserver` 并向代理运行时注册一次
pub struct FlowNormalizer {
    queue: Arc<DispatchQueue>,
    classifier: LlmClassifier,
    capture: CaptureConfig,
    pending: DashMap<String, PendingFlow>,
    metrics: Arc<PipelineMetrics>,
}

impl FlowNormalizer {
    pub fn new(
        queue: Arc<DispatchQueue>,
        classifier_config: &ClassifierConfig,
        capture: CaptureConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            queue,
            classifier: LlmClassifier::new(classifier_config),
            capture,
            pending: DashMap::new(),
            metrics,
        }
    }

    /// 当前等待响应的流数量
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 清理超龄的挂起状态（响应始终未到达的孤儿流）
    ///
    /// 只回收内存；已持久化的 pending 行保留在存储中可查
    pub fn prune_stale(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let before = self.pending.len();
        self.pending.retain(|_, p| p.inserted_at >= cutoff);
        let removed = before - self.pending.len();
        if removed > 0 {
            warn!(removed = removed, "清理未等到响应的挂起流状态");
        }
        removed
    }

    fn reject_malformed(&self, kind: &str) {
        self.metrics.malformed_events.fetch_add(1, Ordering::Relaxed);
        warn!(kind = kind, "丢弃缺失 flow_id 的畸形事件");
    }

    /// LLM 流的体捕获：超出上限的体不随队列传递
    fn capture_body(&self, body: &Bytes) -> Option<Bytes> {
        if body.is_empty() || body.len() > self.capture.max_body_bytes {
            None
        } else {
            Some(body.clone())
        }
    }

    /// 从响应头提取配置的上游配额头快照
    fn quota_snapshot(&self, headers: &[(String, String)]) -> Option<Value> {
        let mut snapshot = Map::new();
        for name in &self.capture.quota_headers {
            if let Some(value) = header_value(headers, name) {
                snapshot.insert(name.clone(), Value::String(value.to_string()));
            }
        }
        if snapshot.is_empty() {
            None
        } else {
            Some(Value::Object(snapshot))
        }
    }

    /// 为未见过请求的响应构造占位记录
    fn orphan_record(flow_id: String, now: DateTime<Utc>) -> FlowRecord {
        FlowRecord {
            flow_id,
            method: "-".to_string(),
            host: "-".to_string(),
            path: "-".to_string(),
            request_headers: Vec::new(),
            request_body_digest: None,
            status_code: None,
            response_headers: Vec::new(),
            response_body_digest: None,
            is_llm_call: false,
            error: None,
            rate_limit_snapshot: None,
            started_at: now,
            completed_at: None,
        }
    }
}

impl FlowObserver for FlowNormalizer {
    fn on_request(&self, event: RequestEvent) {
        if event.flow_id.is_empty() {
            self.reject_malformed("request");
            return;
        }

        let is_llm_call = self
            .classifier
            .classify(&event.host, &event.path, &event.headers);

        let record = FlowRecord {
            flow_id: event.flow_id.clone(),
            method: event.method,
            host: event.host,
            path: event.path,
            request_headers: event.headers,
            request_body_digest: body_digest(&event.body),
            status_code: None,
            response_headers: Vec::new(),
            response_body_digest: None,
            is_llm_call,
            error: None,
            rate_limit_snapshot: None,
            started_at: Utc::now(),
            completed_at: None,
        };

        let llm_request_body = if is_llm_call {
            self.capture_body(&event.body)
        } else {
            None
        };

        self.pending.insert(
            event.flow_id,
            PendingFlow {
                record: record.clone(),
                llm_request_body: llm_request_body.clone(),
                inserted_at: record.started_at,
            },
        );

        self.queue.enqueue(FlowUpdate::Pending {
            record,
            llm_request_body,
        });
    }

    fn on_response(&self, event: ResponseEvent) {
        if event.flow_id.is_empty() {
            self.reject_malformed("response");
            return;
        }

        let now = Utc::now();
        let (mut record, llm_request_body) = match self.pending.remove(&event.flow_id) {
            Some((_, p)) => (p.record, p.llm_request_body),
            None => {
                debug!(flow_id = %event.flow_id, "响应未匹配到请求侧状态，按占位记录处理");
                (Self::orphan_record(event.flow_id, now), None)
            }
        };

        record.status_code = Some(event.status_code);
        record.response_body_digest = body_digest(&event.body);
        record.rate_limit_snapshot = self.quota_snapshot(&event.headers);
        record.response_headers = event.headers;
        // 完成时间不得早于开始时间
        record.completed_at = Some(now.max(record.started_at));

        let llm_response_body = if record.is_llm_call {
            self.capture_body(&event.body)
        } else {
            None
        };

        self.queue.enqueue(FlowUpdate::Complete {
            record,
            llm_request_body,
            llm_response_body,
        });
    }

    fn on_error(&self, event: ErrorEvent) {
        if event.flow_id.is_empty() {
            self.reject_malformed("error");
            return;
        }

        let now = Utc::now();
        let (mut record, llm_request_body) = match self.pending.remove(&event.flow_id) {
            Some((_, p)) => (p.record, p.llm_request_body),
            None => (Self::orphan_record(event.flow_id, now), None),
        };

        record.error = Some(event.message);
        record.completed_at = Some(now.max(record.started_at));

        self.queue.enqueue(FlowUpdate::Complete {
            record,
            llm_request_body,
            llm_response_body: None,
        });
    }
}
