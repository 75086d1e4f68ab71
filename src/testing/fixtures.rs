//! # 测试数据构造器

use crate::config::{AppConfig, DedupConfig, RetryConfig};
use crate::intercept::{ErrorEvent, RequestEvent, ResponseEvent};
use crate::normalizer::FlowRecord;
use bytes::Bytes;
use chrono::Utc;

/// 生成唯一的测试流标识
pub fn test_flow_id() -> String {
    format!("flow-{}", uuid::Uuid::new_v4())
}

/// 构造一个普通（非 LLM）请求事件
pub fn plain_request(flow_id: &str) -> RequestEvent {
    RequestEvent {
        flow_id: flow_id.to_string(),
        method: "GET".to_string(),
        host: "www.example.com".to_string(),
        path: "/index.html".to_string(),
        headers: vec![("accept".to_string(), "text/html".to_string())],
        body: Bytes::new(),
    }
}

/// 构造一个 LLM 请求事件（Anthropic messages 形态）
pub fn llm_request(flow_id: &str, host: &str, path: &str) -> RequestEvent {
    RequestEvent {
        flow_id: flow_id.to_string(),
        method: "POST".to_string(),
        host: host.to_string(),
        path: path.to_string(),
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Bytes::from_static(
            br#"{"model":"claude-sonnet-4-5","stream":false,"messages":[{"role":"user","content":"hi"}]}"#,
        ),
    }
}

/// 构造一个携带用量的 LLM JSON 响应事件
pub fn llm_response(flow_id: &str, status_code: u16) -> ResponseEvent {
    ResponseEvent {
        flow_id: flow_id.to_string(),
        status_code,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Bytes::from_static(
            br#"{"model":"claude-sonnet-4-5","content":[{"type":"text","text":"hello"}],"usage":{"input_tokens":12,"output_tokens":34}}"#,
        ),
    }
}

/// 构造一个普通响应事件
pub fn plain_response(flow_id: &str, status_code: u16) -> ResponseEvent {
    ResponseEvent {
        flow_id: flow_id.to_string(),
        status_code,
        headers: vec![("content-type".to_string(), "text/html".to_string())],
        body: Bytes::from_static(b"<html></html>"),
    }
}

/// 构造一个流错误事件
pub fn error_event(flow_id: &str, message: &str) -> ErrorEvent {
    ErrorEvent {
        flow_id: flow_id.to_string(),
        message: message.to_string(),
    }
}

/// 构造一条 pending 状态的流记录
pub fn pending_record(flow_id: &str) -> FlowRecord {
    FlowRecord {
        flow_id: flow_id.to_string(),
        method: "POST".to_string(),
        host: "api.anthropic.com".to_string(),
        path: "/v1/messages".to_string(),
        request_headers: vec![("content-type".to_string(), "application/json".to_string())],
        request_body_digest: Some("a1".repeat(32)),
        status_code: None,
        response_headers: Vec::new(),
        response_body_digest: None,
        is_llm_call: true,
        error: None,
        rate_limit_snapshot: None,
        started_at: Utc::now(),
        completed_at: None,
    }
}

/// 把 pending 记录推进到 complete 状态
pub fn completed_record(flow_id: &str, status_code: u16) -> FlowRecord {
    let mut record = pending_record(flow_id);
    record.status_code = Some(status_code);
    record.response_headers =
        vec![("content-type".to_string(), "application/json".to_string())];
    record.response_body_digest = Some("b2".repeat(32));
    record.completed_at = Some(record.started_at + chrono::Duration::milliseconds(250));
    record
}

/// 测试用配置：重试快、超时短、导出关闭
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.pipeline.workers = 2;
    config.pipeline.queue_capacity = 64;
    config.pipeline.shutdown_grace_ms = 1000;
    config.dedup = DedupConfig {
        ttl_secs: 60,
        correlation_ttl_secs: 60,
        op_timeout_ms: 100,
    };
    config.persistence.retry = RetryConfig {
        max_attempts: 2,
        base_delay_ms: 10,
        max_delay_ms: 50,
    };
    config.exporter.enabled = false;
    config.exporter.retry = RetryConfig {
        max_attempts: 3,
        base_delay_ms: 10,
        max_delay_ms: 50,
    };
    config.exporter.flush_interval_ms = 50;
    config
}
