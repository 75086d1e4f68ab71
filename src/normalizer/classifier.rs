//! # LLM 调用分类器
//!
//! 基于主机名后缀、路径片段与内容类型的启发式判定，
//! 规则全部来自配置；每个流只评估一次

use crate::config::ClassifierConfig;
use crate::intercept::header_value;

/// LLM 调用分类器
#[derive(Debug, Clone)]
pub struct LlmClassifier {
    hosts: Vec<String>,
    path_patterns: Vec<String>,
}

impl LlmClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            hosts: config.llm_hosts.clone(),
            path_patterns: config.llm_path_patterns.clone(),
        }
    }

    /// 判定一次请求是否为 LLM API 调用
    ///
    /// 主机或路径命中即候选；内容类型再做一次约束：
    /// LLM API 请求携带 JSON 体（缺失 content-type 时放行主机命中）
    pub fn classify(
        &self,
        host: &str,
        path: &str,
        request_headers: &[(String, String)],
    ) -> bool {
        let host_hit = self
            .hosts
            .iter()
            .any(|h| host == h || host.ends_with(&format!(".{h}")));
        let path_hit = self.path_patterns.iter().any(|p| path.contains(p.as_str()));

        if !host_hit && !path_hit {
            return false;
        }

        match header_value(request_headers, "content-type") {
            Some(ct) => ct.contains("application/json"),
            // 内容类型缺失时只信任主机命中
            None => host_hit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> LlmClassifier {
        LlmClassifier::new(&ClassifierConfig::default())
    }

    fn json_headers() -> Vec<(String, String)> {
        vec![("content-type".to_string(), "application/json".to_string())]
    }

    #[test]
    fn anthropic_messages_is_llm() {
        let c = classifier();
        assert!(c.classify("api.anthropic.com", "/v1/messages", &json_headers()));
    }

    #[test]
    fn path_pattern_alone_matches_unknown_host() {
        let c = classifier();
        assert!(c.classify("api.example-llm.test", "/v1/chat", &json_headers()));
    }

    #[test]
    fn plain_browsing_is_not_llm() {
        let c = classifier();
        let headers = vec![("content-type".to_string(), "text/html".to_string())];
        assert!(!c.classify("www.example.com", "/index.html", &headers));
    }

    #[test]
    fn non_json_content_type_rejects_path_hit() {
        let c = classifier();
        let headers = vec![(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        )];
        assert!(!c.classify("cdn.example.com", "/v1/chat/completions/archive.bin", &headers));
    }

    #[test]
    fn subdomain_of_configured_host_matches() {
        let c = classifier();
        assert!(c.classify("eu.api.anthropic.com", "/v1/messages", &json_headers()));
    }

    #[test]
    fn missing_content_type_trusts_host_only() {
        let c = classifier();
        assert!(c.classify("api.openai.com", "/v1/chat/completions", &[]));
        assert!(!c.classify("random.test", "/v1/chat/completions", &[]));
    }
}
