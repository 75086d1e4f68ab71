//! # 仪表板数据服务集成测试
//!
//! 通过 tower oneshot 直接驱动路由；空库与过滤查询都必须正常返回

use axum::body::Body;
use axum::http::{Request, StatusCode};
use flowscribe::dashboard::{DashboardState, build_router};
use flowscribe::metrics::PipelineMetrics;
use flowscribe::persistence::PersistenceWriter;
use flowscribe::testing::{
    completed_record, create_test_db, init_test_env, pending_record, test_flow_id,
};
use flowscribe::utils::backoff::RetryPolicy;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct DashboardHarness {
    router: axum::Router,
    writer: PersistenceWriter,
}

impl DashboardHarness {
    async fn new() -> Self {
        init_test_env();
        let db: Arc<DatabaseConnection> = Arc::new(create_test_db().await.unwrap());
        let metrics = Arc::new(PipelineMetrics::new());
        let writer = PersistenceWriter::new(
            Arc::clone(&db),
            RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(50)),
            Arc::clone(&metrics),
        );
        let router = build_router(DashboardState {
            db,
            metrics,
            refresh_interval_secs: 30,
        });
        Self { router, writer }
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

#[tokio::test]
async fn empty_store_returns_empty_projections() {
    let harness = DashboardHarness::new().await;

    let (status, flows) = harness.get_json("/api/flows").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flows.as_array().unwrap().len(), 0);

    let (status, spans) = harness.get_json("/api/spans").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(spans.as_array().unwrap().len(), 0);

    let (status, overview) = harness.get_json("/api/overview").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["total_flows"], 0);
    assert_eq!(overview["refresh_interval_secs"], 30);

    let (status, usage) = harness.get_json("/api/usage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn flows_listing_respects_filters_and_limit() {
    let harness = DashboardHarness::new().await;

    for _ in 0..3 {
        let flow_id = test_flow_id();
        harness
            .writer
            .upsert_flow(&completed_record(&flow_id, 200))
            .await
            .unwrap();
    }
    // 一条 pending 状态与一条非 LLM 主机的记录
    let pending_id = test_flow_id();
    harness
        .writer
        .upsert_flow(&pending_record(&pending_id))
        .await
        .unwrap();
    let mut other = completed_record(&test_flow_id(), 500);
    other.host = "plain.example.com".to_string();
    other.is_llm_call = false;
    harness.writer.upsert_flow(&other).await.unwrap();

    let (status, all) = harness.get_json("/api/flows").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 5);

    let (_, limited) = harness.get_json("/api/flows?limit=2").await;
    assert_eq!(limited.as_array().unwrap().len(), 2);

    let (_, llm_only) = harness.get_json("/api/flows?llm_only=true").await;
    assert_eq!(llm_only.as_array().unwrap().len(), 4);

    let (_, by_host) = harness
        .get_json("/api/flows?host=plain.example.com")
        .await;
    let rows = by_host.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status_code"], 500);
    assert_eq!(rows[0]["is_llm_call"], false);

    let (_, by_status) = harness.get_json("/api/flows?status_code=200").await;
    assert_eq!(by_status.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn overview_counts_flow_states() {
    let harness = DashboardHarness::new().await;

    harness
        .writer
        .upsert_flow(&completed_record(&test_flow_id(), 200))
        .await
        .unwrap();
    harness
        .writer
        .upsert_flow(&pending_record(&test_flow_id()))
        .await
        .unwrap();

    let (status, overview) = harness.get_json("/api/overview").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["total_flows"], 2);
    assert_eq!(overview["completed_flows"], 1);
    assert_eq!(overview["llm_flows"], 2);
    // 管道计数器随响应一并下发
    assert!(overview["pipeline"]["flows_persisted"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn usage_endpoint_returns_quota_snapshots() {
    let harness = DashboardHarness::new().await;

    let with_quota = test_flow_id();
    let mut record = completed_record(&with_quota, 200);
    record.rate_limit_snapshot = Some(serde_json::json!({
        "anthropic-ratelimit-unified-7d-utilization": "0.61"
    }));
    harness.writer.upsert_flow(&record).await.unwrap();

    // 没有快照的记录不出现在 usage 里
    harness
        .writer
        .upsert_flow(&completed_record(&test_flow_id(), 200))
        .await
        .unwrap();

    let (status, usage) = harness.get_json("/api/usage").await;
    assert_eq!(status, StatusCode::OK);
    let rows = usage.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["flow_id"], with_quota.as_str());
    assert_eq!(
        rows[0]["snapshot"]["anthropic-ratelimit-unified-7d-utilization"],
        "0.61"
    );
}
