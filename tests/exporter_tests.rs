//! # 追踪导出器集成测试
//!
//! 用 wiremock 扮演追踪后端：验证成功提交、重试预算耗尽
//! 与导出失败不影响流记录持久化

use entity::llm_spans;
use flowscribe::config::{ExporterConfig, RetryConfig};
use flowscribe::exporter::{SpanRecord, spawn_exporter};
use flowscribe::metrics::PipelineMetrics;
use flowscribe::persistence::PersistenceWriter;
use flowscribe::testing::{completed_record, create_test_db, init_test_env, test_flow_id};
use flowscribe::utils::backoff::RetryPolicy;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct ExporterHarness {
    db: Arc<DatabaseConnection>,
    writer: Arc<PersistenceWriter>,
    metrics: Arc<PipelineMetrics>,
}

impl ExporterHarness {
    async fn new() -> Self {
        init_test_env();
        let db = Arc::new(create_test_db().await.expect("创建测试数据库失败"));
        let metrics = Arc::new(PipelineMetrics::new());
        let writer = Arc::new(PersistenceWriter::new(
            Arc::clone(&db),
            RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(50)),
            Arc::clone(&metrics),
        ));
        Self {
            db,
            writer,
            metrics,
        }
    }

    /// 落库一条完成的流记录与对应的 pending 跨度，返回 flow_id
    async fn seed_span(&self) -> String {
        let flow_id = test_flow_id();
        self.writer
            .upsert_flow(&completed_record(&flow_id, 200))
            .await
            .unwrap();
        let span = span_for(&flow_id);
        self.writer.insert_span_if_absent(&span).await.unwrap();
        flow_id
    }

    async fn span_status(&self, flow_id: &str) -> String {
        llm_spans::Entity::find()
            .filter(llm_spans::Column::FlowId.eq(flow_id))
            .one(&*self.db)
            .await
            .unwrap()
            .expect("跨度应当存在")
            .trace_export_status
    }
}

fn span_for(flow_id: &str) -> SpanRecord {
    SpanRecord {
        flow_id: flow_id.to_string(),
        model: Some("claude-sonnet-4-5".to_string()),
        prompt_tokens: Some(100),
        completion_tokens: Some(50),
        cache_creation_tokens: None,
        cache_read_tokens: None,
        latency_ms: Some(1234),
        status_code: Some(200),
    }
}

fn exporter_config(endpoint: String) -> ExporterConfig {
    ExporterConfig {
        enabled: true,
        endpoint,
        public_key: Some("pk-test".to_string()),
        secret_key: Some("sk-test".to_string()),
        batch_size: 4,
        flush_interval_ms: 50,
        queue_capacity: 32,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
        request_timeout_secs: 2,
    }
}

async fn wait_until<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..150 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn successful_submission_marks_span_sent() {
    let harness = ExporterHarness::new().await;
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/public/spans"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let (handle, task) = spawn_exporter(
        exporter_config(format!("{}/api/public/spans", server.uri())),
        Arc::clone(&harness.writer),
        Arc::clone(&harness.metrics),
        cancel.clone(),
    )
    .unwrap();

    let flow_id = harness.seed_span().await;
    assert_eq!(harness.span_status(&flow_id).await, "pending");

    assert!(handle.submit(span_for(&flow_id)));

    let sent = wait_until(|| async { harness.span_status(&flow_id).await == "sent" }).await;
    assert!(sent, "成功提交后跨度应当标记为 sent");
    assert_eq!(harness.metrics.snapshot().spans_sent, 1);

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
}

#[tokio::test]
async fn retry_budget_exhaustion_marks_span_failed() {
    let harness = ExporterHarness::new().await;
    let server = MockServer::start().await;

    // 后端持续失败，超过重试预算
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3..)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let (handle, task) = spawn_exporter(
        exporter_config(server.uri()),
        Arc::clone(&harness.writer),
        Arc::clone(&harness.metrics),
        cancel.clone(),
    )
    .unwrap();

    let flow_id = harness.seed_span().await;
    assert!(handle.submit(span_for(&flow_id)));

    let failed = wait_until(|| async { harness.span_status(&flow_id).await == "failed" }).await;
    assert!(failed, "预算耗尽后跨度应当标记为 failed 而非静默丢失");

    // 导出失败从不影响已持久化的流记录
    let record = entity::flow_records::Entity::find()
        .filter(entity::flow_records::Column::FlowId.eq(flow_id.as_str()))
        .one(&*harness.db)
        .await
        .unwrap()
        .expect("流记录必须仍然存在");
    assert_eq!(record.status_code, Some(200));

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
}

#[tokio::test]
async fn batch_flush_triggers_on_size() {
    let harness = ExporterHarness::new().await;
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = exporter_config(server.uri());
    config.batch_size = 2;
    // 冲刷间隔调长，确保是批量大小触发
    config.flush_interval_ms = 60_000;

    let cancel = CancellationToken::new();
    let (handle, task) = spawn_exporter(
        config,
        Arc::clone(&harness.writer),
        Arc::clone(&harness.metrics),
        cancel.clone(),
    )
    .unwrap();

    let first = harness.seed_span().await;
    let second = harness.seed_span().await;
    assert!(handle.submit(span_for(&first)));
    assert!(handle.submit(span_for(&second)));

    let both_sent = wait_until(|| async {
        harness.span_status(&first).await == "sent" && harness.span_status(&second).await == "sent"
    })
    .await;
    assert!(both_sent, "达到批量大小应当立即冲刷");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
}
