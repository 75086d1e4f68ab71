//! # 应用配置定义
//!
//! 部署相关的可调参数（分类规则、重试预算、缓存 TTL、队列容量等）
//! 全部收敛到这里，并带有文档化的默认值

use crate::cache::RedisConfig;
use crate::utils::backoff::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 应用总配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 仪表板只读服务
    #[serde(default)]
    pub dashboard: DashboardConfig,
    /// 关系型存储
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 键值存储（Redis）
    #[serde(default)]
    pub redis: RedisConfig,
    /// 调度队列与工作池
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// 去重/关联缓存
    #[serde(default)]
    pub dedup: DedupConfig,
    /// 持久化写入
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// 追踪导出
    #[serde(default)]
    pub exporter: ExporterConfig,
    /// LLM 分类启发式
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// 事件捕获
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// 仪表板服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 前端轮询间隔（秒），同时是数据新鲜度上界
    pub refresh_interval_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9090,
            refresh_interval_secs: 30,
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数，应不小于工作线程数以避免连接饥饿
    pub max_connections: u32,
    /// 连接超时时间（秒）
    pub connect_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/flowscribe.db".to_string(),
            max_connections: 16,
            connect_timeout: 10,
        }
    }
}

/// 调度队列与工作池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 工作任务数量，0 表示取硬件并发数
    pub workers: usize,
    /// 每个工作分区的队列容量
    pub queue_capacity: usize,
    /// 关停时在途记录的冲刷宽限期（毫秒）
    pub shutdown_grace_ms: u64,
    /// 未匹配到响应的挂起状态清扫间隔（秒）
    pub pending_sweep_interval_secs: u64,
    /// 挂起状态的最大存活时间（秒），超过后按孤儿清理
    pub pending_max_age_secs: u64,
}

impl PipelineConfig {
    /// 解析实际工作任务数
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: 1024,
            shutdown_grace_ms: 3000,
            pending_sweep_interval_secs: 60,
            pending_max_age_secs: 600,
        }
    }
}

/// 去重/关联缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// 去重条目滑动窗口TTL（秒）
    pub ttl_secs: u64,
    /// 请求侧关联条目TTL（秒）
    pub correlation_ttl_secs: u64,
    /// 单次缓存操作超时（毫秒），超时按未命中处理
    pub op_timeout_ms: u64,
}

impl DedupConfig {
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn correlation_ttl(&self) -> Duration {
        Duration::from_secs(self.correlation_ttl_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            correlation_ttl_secs: 600,
            op_timeout_ms: 150,
        }
    }
}

/// 重试预算配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 初始退避延迟（毫秒），此后逐次翻倍
    pub base_delay_ms: u64,
    /// 退避延迟上限（毫秒）
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// 转换为退避状态机策略
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 200,
            max_delay_ms: 5000,
        }
    }
}

/// 持久化写入配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// 瞬态数据库错误的重试预算
    #[serde(default)]
    pub retry: RetryConfig,
}

/// 追踪导出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// 是否启用导出
    pub enabled: bool,
    /// 追踪后端提交地址
    pub endpoint: String,
    /// Basic Auth 公钥
    pub public_key: Option<String>,
    /// Basic Auth 私钥
    pub secret_key: Option<String>,
    /// 批量提交大小
    pub batch_size: usize,
    /// 批量冲刷间隔（毫秒）
    pub flush_interval_ms: u64,
    /// 内部提交队列容量，入队永不阻塞工作任务
    pub queue_capacity: usize,
    /// 单批提交的重试预算
    #[serde(default)]
    pub retry: RetryConfig,
    /// 单次HTTP请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://127.0.0.1:3100/api/public/spans".to_string(),
            public_key: None,
            secret_key: None,
            batch_size: 16,
            flush_interval_ms: 2000,
            queue_capacity: 512,
            retry: RetryConfig::default(),
            request_timeout_secs: 10,
        }
    }
}

/// LLM 分类启发式配置
///
/// 分类只在请求到达时评估一次，此后不再修订
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 命中即视为 LLM 调用的主机名后缀
    pub llm_hosts: Vec<String>,
    /// 命中即视为 LLM 调用的路径片段
    pub llm_path_patterns: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            llm_hosts: vec![
                "api.anthropic.com".to_string(),
                "api.openai.com".to_string(),
                "generativelanguage.googleapis.com".to_string(),
            ],
            llm_path_patterns: vec![
                "/v1/messages".to_string(),
                "/v1/chat/completions".to_string(),
                "/v1/chat".to_string(),
                ":generateContent".to_string(),
            ],
        }
    }
}

/// 事件捕获配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 随队列更新携带的 LLM 请求/响应体上限（字节），超出部分不捕获
    pub max_body_bytes: usize,
    /// 需要快照的上游配额/限流响应头
    pub quota_headers: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024,
            quota_headers: vec![
                "anthropic-ratelimit-unified-5h-utilization".to_string(),
                "anthropic-ratelimit-unified-5h-reset".to_string(),
                "anthropic-ratelimit-unified-5h-status".to_string(),
                "anthropic-ratelimit-unified-7d-utilization".to_string(),
                "anthropic-ratelimit-unified-7d-reset".to_string(),
                "anthropic-ratelimit-unified-7d-status".to_string(),
            ],
        }
    }
}
