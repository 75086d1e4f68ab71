//! # 配置管理模块
//!
//! 处理应用配置加载、验证和管理

mod app_config;

pub use app_config::{
    AppConfig, CaptureConfig, ClassifierConfig, DashboardConfig, DatabaseConfig, DedupConfig,
    ExporterConfig, PersistenceConfig, PipelineConfig, RetryConfig,
};

use crate::ensure_config;
use std::env;
use std::path::Path;

/// 按 `RUST_ENV` 约定加载配置文件
pub fn load_config() -> crate::error::Result<AppConfig> {
    let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let config_file = format!("config/config.{env}.toml");
    load_config_from(Path::new(&config_file))
}

/// 从指定路径加载配置文件
pub fn load_config_from(path: &Path) -> crate::error::Result<AppConfig> {
    if !path.exists() {
        return Err(crate::error::PipelineError::config(format!(
            "配置文件不存在: {}",
            path.display()
        )));
    }

    let config_content = std::fs::read_to_string(path).map_err(|e| {
        crate::error::PipelineError::config_with_source(
            format!("读取配置文件失败: {}", path.display()),
            e,
        )
    })?;

    let config: AppConfig = toml::from_str(&config_content)?;

    // 验证配置的有效性
    validate_config(&config)?;

    Ok(config)
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> crate::error::Result<()> {
    // 验证仪表板配置
    ensure_config!(
        config.dashboard.port != 0,
        "无效的仪表板端口: {}",
        config.dashboard.port
    );

    // 验证数据库配置
    ensure_config!(!config.database.url.is_empty(), "数据库URL不能为空");
    ensure_config!(
        config.database.max_connections > 0,
        "数据库最大连接数必须大于0"
    );

    // 验证管道配置
    ensure_config!(config.pipeline.queue_capacity > 0, "队列容量必须大于0");
    ensure_config!(
        config.pipeline.shutdown_grace_ms > 0,
        "关停宽限期必须大于0"
    );

    // 验证去重配置
    ensure_config!(config.dedup.op_timeout_ms > 0, "缓存操作超时必须大于0");
    ensure_config!(config.dedup.ttl_secs > 0, "去重条目TTL必须大于0");

    // 验证重试预算
    ensure_config!(
        config.persistence.retry.max_attempts > 0,
        "持久化重试次数必须大于0"
    );
    ensure_config!(
        config.exporter.retry.max_attempts > 0,
        "导出重试次数必须大于0"
    );

    // 验证导出器配置
    if config.exporter.enabled {
        ensure_config!(
            !config.exporter.endpoint.is_empty(),
            "启用导出器时必须配置追踪后端地址"
        );
        ensure_config!(config.exporter.batch_size > 0, "导出批量大小必须大于0");
    }

    // 验证捕获配置
    ensure_config!(
        config.capture.max_body_bytes > 0,
        "LLM 响应体捕获上限必须大于0"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        validate_config(&config).expect("默认配置应当通过验证");
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let mut config = AppConfig::default();
        config.pipeline.queue_capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_enabled_exporter_without_endpoint() {
        let mut config = AppConfig::default();
        config.exporter.enabled = true;
        config.exporter.endpoint = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml_text = r#"
            [dashboard]
            port = 8099

            [classifier]
            llm_hosts = ["api.example-llm.test"]
        "#;
        let config: AppConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.dashboard.port, 8099);
        assert_eq!(config.classifier.llm_hosts, vec!["api.example-llm.test"]);
        // 未出现的分区取默认值
        assert!(config.pipeline.queue_capacity > 0);
    }
}
