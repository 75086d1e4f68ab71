//! # 内容指纹计算
//!
//! 请求/响应体只保留 SHA-256 指纹，原始字节不落库

use sha2::{Digest, Sha256};

/// 计算字节串的 SHA-256 十六进制摘要
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// 空体不产生指纹
pub fn body_digest(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        None
    } else {
        Some(sha256_hex(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_hex() {
        let d1 = sha256_hex(b"hello");
        let d2 = sha256_hex(b"hello");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert!(d1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_body_has_no_digest() {
        assert_eq!(body_digest(b""), None);
        assert!(body_digest(b"x").is_some());
    }
}
