//! # 缓存键命名规范
//!
//! 定义统一的缓存键生成策略与请求指纹计算

use crate::utils::digest::sha256_hex;

/// 缓存键类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    /// 指纹去重条目 - `dedup:{fingerprint}`
    Dedup { fingerprint: String },

    /// 请求侧关联状态 - `corr:{flow_id}`
    Correlation { flow_id: String },
}

impl CacheKey {
    /// 生成缓存键字符串
    #[must_use]
    pub fn build(&self) -> String {
        match self {
            Self::Dedup { fingerprint } => format!("dedup:{fingerprint}"),
            Self::Correlation { flow_id } => format!("corr:{flow_id}"),
        }
    }
}

/// 计算请求指纹：(host, method, path, request_body_digest) 的内容摘要
///
/// 指纹一致的两次请求在去重窗口内视为同一调用
#[must_use]
pub fn flow_fingerprint(
    host: &str,
    method: &str,
    path: &str,
    request_body_digest: Option<&str>,
) -> String {
    let material = format!(
        "{}|{}|{}|{}",
        host,
        method,
        path,
        request_body_digest.unwrap_or("-")
    );
    sha256_hex(material.as_bytes())
}
