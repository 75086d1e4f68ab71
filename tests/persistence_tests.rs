//! # 持久化写入器集成测试
//!
//! 覆盖以 flow_id 为键的幂等写入、pending→complete 合并、
//! 状态不回退与时间不变量

use chrono::{Duration, Utc};
use entity::llm_spans::ExportStatus;
use entity::{flow_records, llm_spans};
use flowscribe::exporter::SpanRecord;
use flowscribe::metrics::PipelineMetrics;
use flowscribe::persistence::PersistenceWriter;
use flowscribe::testing::{
    completed_record, create_test_db, init_test_env, pending_record, test_flow_id,
};
use flowscribe::utils::backoff::RetryPolicy;
use pretty_assertions::assert_eq;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::Arc;

async fn setup_writer() -> (PersistenceWriter, Arc<sea_orm::DatabaseConnection>) {
    init_test_env();
    let db = Arc::new(create_test_db().await.expect("创建测试数据库失败"));
    let writer = PersistenceWriter::new(
        Arc::clone(&db),
        RetryPolicy::new(2, std::time::Duration::from_millis(10), std::time::Duration::from_millis(50)),
        Arc::new(PipelineMetrics::new()),
    );
    (writer, db)
}

async fn count_rows(db: &sea_orm::DatabaseConnection, flow_id: &str) -> u64 {
    flow_records::Entity::find()
        .filter(flow_records::Column::FlowId.eq(flow_id))
        .count(db)
        .await
        .unwrap()
}

async fn fetch_row(db: &sea_orm::DatabaseConnection, flow_id: &str) -> flow_records::Model {
    flow_records::Entity::find()
        .filter(flow_records::Column::FlowId.eq(flow_id))
        .one(db)
        .await
        .unwrap()
        .expect("记录应当存在")
}

#[tokio::test]
async fn pending_replay_creates_exactly_one_row() {
    let (writer, db) = setup_writer().await;
    let flow_id = test_flow_id();
    let record = pending_record(&flow_id);

    // 同一 pending 更新重放多次
    writer.upsert_flow(&record).await.unwrap();
    writer.upsert_flow(&record).await.unwrap();
    writer.upsert_flow(&record).await.unwrap();

    assert_eq!(count_rows(&db, &flow_id).await, 1);
    let row = fetch_row(&db, &flow_id).await;
    assert!(!row.is_complete());
    assert_eq!(row.method, "POST");
}

#[tokio::test]
async fn complete_merges_into_existing_row() {
    let (writer, db) = setup_writer().await;
    let flow_id = test_flow_id();

    writer.upsert_flow(&pending_record(&flow_id)).await.unwrap();
    writer
        .upsert_flow(&completed_record(&flow_id, 200))
        .await
        .unwrap();

    assert_eq!(count_rows(&db, &flow_id).await, 1);
    let row = fetch_row(&db, &flow_id).await;
    assert!(row.is_complete());
    assert_eq!(row.status_code, Some(200));
    assert!(row.response_body_digest.is_some());
}

#[tokio::test]
async fn pending_after_complete_never_regresses() {
    let (writer, db) = setup_writer().await;
    let flow_id = test_flow_id();

    writer
        .upsert_flow(&completed_record(&flow_id, 200))
        .await
        .unwrap();
    // complete 之后重放 pending：空操作
    writer.upsert_flow(&pending_record(&flow_id)).await.unwrap();

    let row = fetch_row(&db, &flow_id).await;
    assert!(row.is_complete(), "记录不得从 complete 回退到 pending");
    assert_eq!(row.status_code, Some(200));
}

#[tokio::test]
async fn replay_converges_to_same_final_state() {
    let (writer, db) = setup_writer().await;
    let flow_id = test_flow_id();
    let pending = pending_record(&flow_id);
    let complete = completed_record(&flow_id, 200);

    // 正常顺序
    writer.upsert_flow(&pending).await.unwrap();
    writer.upsert_flow(&complete).await.unwrap();
    let normal = fetch_row(&db, &flow_id).await;

    // 恢复后全量重放（模拟存储故障恢复）
    writer.upsert_flow(&pending).await.unwrap();
    writer.upsert_flow(&complete).await.unwrap();
    let replayed = fetch_row(&db, &flow_id).await;

    assert_eq!(count_rows(&db, &flow_id).await, 1);
    assert_eq!(normal.status_code, replayed.status_code);
    assert_eq!(normal.completed_at, replayed.completed_at);
    assert_eq!(normal.request_body_digest, replayed.request_body_digest);
}

#[tokio::test]
async fn completed_at_is_never_before_started_at() {
    let (writer, db) = setup_writer().await;
    let flow_id = test_flow_id();

    // 构造时钟倒流的记录
    let mut record = pending_record(&flow_id);
    record.started_at = Utc::now();
    record.status_code = Some(200);
    record.completed_at = Some(record.started_at - Duration::seconds(5));

    writer.upsert_flow(&record).await.unwrap();

    let row = fetch_row(&db, &flow_id).await;
    let completed = row.completed_at.expect("记录应当完成");
    assert!(completed >= row.started_at);
}

#[tokio::test]
async fn span_insert_is_idempotent_per_flow() {
    let (writer, db) = setup_writer().await;
    let flow_id = test_flow_id();
    writer
        .upsert_flow(&completed_record(&flow_id, 200))
        .await
        .unwrap();

    let span = SpanRecord {
        flow_id: flow_id.clone(),
        model: Some("claude-sonnet-4-5".to_string()),
        prompt_tokens: Some(12),
        completion_tokens: Some(34),
        cache_creation_tokens: None,
        cache_read_tokens: None,
        latency_ms: Some(250),
        status_code: Some(200),
    };

    assert!(writer.insert_span_if_absent(&span).await.unwrap());
    // 重放：不再新建
    assert!(!writer.insert_span_if_absent(&span).await.unwrap());

    let count = llm_spans::Entity::find()
        .filter(llm_spans::Column::FlowId.eq(&flow_id))
        .count(&*db)
        .await
        .unwrap();
    assert_eq!(count, 1, "每个 flow_id 至多一条跨度");
}

#[tokio::test]
async fn span_status_transitions_are_persisted() {
    let (writer, db) = setup_writer().await;
    let flow_id = test_flow_id();
    writer
        .upsert_flow(&completed_record(&flow_id, 200))
        .await
        .unwrap();

    let span = SpanRecord {
        flow_id: flow_id.clone(),
        model: None,
        prompt_tokens: None,
        completion_tokens: None,
        cache_creation_tokens: None,
        cache_read_tokens: None,
        latency_ms: None,
        status_code: Some(200),
    };
    writer.insert_span_if_absent(&span).await.unwrap();

    let row = llm_spans::Entity::find()
        .filter(llm_spans::Column::FlowId.eq(&flow_id))
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_export_status(), ExportStatus::Pending);

    writer
        .mark_span_status(&flow_id, ExportStatus::Sent, 1)
        .await
        .unwrap();

    let row = llm_spans::Entity::find()
        .filter(llm_spans::Column::FlowId.eq(&flow_id))
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_export_status(), ExportStatus::Sent);
    assert_eq!(row.export_attempts, 1);
}
