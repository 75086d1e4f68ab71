//! # 代理运行时边界
//!
//! 管道只通过两类生命周期事件与代理运行时耦合：请求可见、响应/错误可见。
//! 运行时侧注册一次 `FlowObserver` 实现，两个回调都必须立即返回，
//! 不得做任何阻塞 I/O。

use bytes::Bytes;

/// 请求可见事件
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// 截获时生成的全局唯一流标识
    pub flow_id: String,
    pub method: String,
    pub host: String,
    pub path: String,
    /// 有序头部序列
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// 响应可见事件
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub flow_id: String,
    pub status_code: u16,
    /// 有序头部序列
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// 流级错误事件（上游失败、连接被重置等）
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub flow_id: String,
    pub message: String,
}

/// 流观测能力接口
///
/// 由 Flow Normalizer 实现并向代理运行时注册一次，
/// 隔离管道内部与运行时具体的回调机制
pub trait FlowObserver: Send + Sync {
    /// 请求头与请求体就绪时调用
    fn on_request(&self, event: RequestEvent);

    /// 响应完整可见时调用
    fn on_response(&self, event: ResponseEvent);

    /// 流以错误终结时调用
    fn on_error(&self, event: ErrorEvent);
}

/// 在头部序列中查找指定键（大小写不敏感），返回首个值
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
