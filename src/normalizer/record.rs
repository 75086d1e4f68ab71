//! # 规范化流记录
//!
//! 规范化器产出的领域对象；关系型存储一旦接手即成为该记录的归属方

use chrono::{DateTime, Utc};
use serde_json::Value;

/// 一条规范化的流记录
///
/// 不变量：同一 `flow_id` 的记录从 pending 到 complete 恰好迁移一次，
/// 绝不回退；`completed_at` 不早于 `started_at`
#[derive(Debug, Clone)]
pub struct FlowRecord {
    pub flow_id: String,
    pub method: String,
    pub host: String,
    pub path: String,
    /// 有序请求头序列
    pub request_headers: Vec<(String, String)>,
    /// 请求体内容指纹（SHA-256），空体为 None
    pub request_body_digest: Option<String>,
    pub status_code: Option<u16>,
    /// 有序响应头序列
    pub response_headers: Vec<(String, String)>,
    /// 响应体内容指纹（SHA-256），空体为 None
    pub response_body_digest: Option<String>,
    /// 分类结果，请求到达时评估一次后不再修订
    pub is_llm_call: bool,
    pub error: Option<String>,
    /// 上游配额头快照
    pub rate_limit_snapshot: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FlowRecord {
    /// 是否已进入 complete 状态（响应或错误已见）
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// 从请求到完成的耗时（毫秒）
    pub fn latency_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
