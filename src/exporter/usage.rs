//! # LLM 用量字段提取
//!
//!（离线）从捕获的请求/响应体中提取模型名与 token 用量。
//! 兼容两种响应形态：一次性 JSON 与 SSE 事件流；
//! 字段命名同时覆盖 Anthropic 与 OpenAI 风格。

use crate::utils::event_stream::parse_sse_events;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 请求侧 LLM 元数据，由工作任务写入关联缓存等待响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequestMeta {
    pub model: Option<String>,
    pub stream: bool,
}

/// 响应侧提取出的用量
#[derive(Debug, Clone, Default)]
pub struct LlmUsage {
    pub model: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cache_creation_tokens: Option<u32>,
    pub cache_read_tokens: Option<u32>,
}

/// 从请求体 JSON 提取模型与流式标记；解析失败返回 None
pub fn extract_request_meta(body: &[u8]) -> Option<LlmRequestMeta> {
    let value: Value = serde_json::from_slice(body).ok()?;
    Some(LlmRequestMeta {
        model: value.get("model").and_then(Value::as_str).map(String::from),
        stream: value.get("stream").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// 从响应体提取用量，按内容类型与体形态自动选择解析路径
pub fn extract_usage(content_type: Option<&str>, body: &[u8]) -> LlmUsage {
    if looks_like_sse(content_type, body) {
        extract_from_sse(body)
    } else {
        serde_json::from_slice::<Value>(body)
            .map(|value| extract_from_json(&value))
            .unwrap_or_default()
    }
}

fn looks_like_sse(content_type: Option<&str>, body: &[u8]) -> bool {
    if content_type.is_some_and(|ct| ct.contains("text/event-stream")) {
        return true;
    }
    let head = &body[..body.len().min(16)];
    head.starts_with(b"event:") || head.starts_with(b"data:")
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}

/// 一次性 JSON 响应：Anthropic 的 `usage.input_tokens/output_tokens`
/// 或 OpenAI 的 `usage.prompt_tokens/completion_tokens`
fn extract_from_json(value: &Value) -> LlmUsage {
    let mut usage = LlmUsage {
        model: value.get("model").and_then(Value::as_str).map(String::from),
        ..Default::default()
    };

    if let Some(u) = value.get("usage") {
        merge_usage_object(&mut usage, u);
    }
    usage
}

fn merge_usage_object(usage: &mut LlmUsage, u: &Value) {
    if let Some(v) = u.get("input_tokens").and_then(as_u32) {
        usage.prompt_tokens = Some(v);
    }
    if let Some(v) = u.get("prompt_tokens").and_then(as_u32) {
        usage.prompt_tokens = Some(v);
    }
    if let Some(v) = u.get("output_tokens").and_then(as_u32) {
        usage.completion_tokens = Some(v);
    }
    if let Some(v) = u.get("completion_tokens").and_then(as_u32) {
        usage.completion_tokens = Some(v);
    }
    if let Some(v) = u.get("cache_creation_input_tokens").and_then(as_u32) {
        usage.cache_creation_tokens = Some(v);
    }
    if let Some(v) = u.get("cache_read_input_tokens").and_then(as_u32) {
        usage.cache_read_tokens = Some(v);
    }
}

/// SSE 流式响应：`message_start` 携带模型与输入侧用量，
/// `message_delta` 携带最终输出 token 数；OpenAI 风格的增量块
/// 在尾部块上带 `usage` 对象
fn extract_from_sse(body: &[u8]) -> LlmUsage {
    let mut usage = LlmUsage::default();

    for event in parse_sse_events(body) {
        let data = &event.data;
        if data.is_null() {
            continue;
        }

        match data.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                if let Some(message) = data.get("message") {
                    if usage.model.is_none() {
                        usage.model = message
                            .get("model")
                            .and_then(Value::as_str)
                            .map(String::from);
                    }
                    if let Some(u) = message.get("usage") {
                        merge_usage_object(&mut usage, u);
                    }
                }
            }
            Some("message_delta") => {
                if let Some(u) = data.get("usage") {
                    merge_usage_object(&mut usage, u);
                }
            }
            _ => {
                // OpenAI 风格：chunk 顶层携带 model 与（可选的）usage
                if usage.model.is_none() {
                    usage.model = data.get("model").and_then(Value::as_str).map(String::from);
                }
                if let Some(u) = data.get("usage") {
                    if !u.is_null() {
                        merge_usage_object(&mut usage, u);
                    }
                }
            }
        }
    }
    usage
}
