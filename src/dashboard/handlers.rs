//! # 仪表板查询处理器
//!
//! 基于 flow_records / llm_spans 表的只读投影查询

use super::server::DashboardState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, NaiveDateTime, Utc};
use entity::{flow_records, llm_spans};
use sea_orm::{ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单次查询返回的行数上限
const MAX_LIMIT: u64 = 500;
const DEFAULT_LIMIT: u64 = 50;

/// 查询错误包装
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

fn effective_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// 流记录查询参数
#[derive(Debug, Deserialize)]
pub struct FlowsQuery {
    pub limit: Option<u64>,
    /// 主机名过滤（精确匹配）
    pub host: Option<String>,
    /// 方法过滤
    pub method: Option<String>,
    /// 状态码过滤
    pub status_code: Option<i32>,
    /// 仅返回 LLM 调用
    pub llm_only: Option<bool>,
    /// 仅返回最近 N 分钟
    pub since_minutes: Option<i64>,
}

/// 流记录投影
#[derive(Debug, Serialize)]
pub struct FlowView {
    pub flow_id: String,
    pub method: String,
    pub host: String,
    pub path: String,
    pub status_code: Option<i32>,
    pub is_llm_call: bool,
    pub error: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
}

impl From<flow_records::Model> for FlowView {
    fn from(row: flow_records::Model) -> Self {
        Self {
            duration_ms: row.duration_ms(),
            flow_id: row.flow_id,
            method: row.method,
            host: row.host,
            path: row.path,
            status_code: row.status_code,
            is_llm_call: row.is_llm_call,
            error: row.error_message,
            started_at: fmt_ts(row.started_at),
            completed_at: row.completed_at.map(fmt_ts),
        }
    }
}

/// `GET /api/flows` — 最近流记录，支持过滤
pub async fn list_flows(
    State(state): State<DashboardState>,
    Query(query): Query<FlowsQuery>,
) -> Result<Json<Vec<FlowView>>, ApiError> {
    let mut condition = Condition::all();
    if let Some(host) = &query.host {
        condition = condition.add(flow_records::Column::Host.eq(host));
    }
    if let Some(method) = &query.method {
        condition = condition.add(flow_records::Column::Method.eq(method));
    }
    if let Some(status) = query.status_code {
        condition = condition.add(flow_records::Column::StatusCode.eq(status));
    }
    if query.llm_only.unwrap_or(false) {
        condition = condition.add(flow_records::Column::IsLlmCall.eq(true));
    }
    if let Some(minutes) = query.since_minutes {
        let cutoff = (Utc::now() - Duration::minutes(minutes.max(0))).naive_utc();
        condition = condition.add(flow_records::Column::StartedAt.gte(cutoff));
    }

    let rows = flow_records::Entity::find()
        .filter(condition)
        .order_by_desc(flow_records::Column::StartedAt)
        .limit(effective_limit(query.limit))
        .all(&*state.db)
        .await?;

    Ok(Json(rows.into_iter().map(FlowView::from).collect()))
}

/// 跨度查询参数
#[derive(Debug, Deserialize)]
pub struct SpansQuery {
    pub limit: Option<u64>,
    /// 导出状态过滤: pending | sent | failed
    pub status: Option<String>,
}

/// 跨度投影
#[derive(Debug, Serialize)]
pub struct SpanView {
    pub flow_id: String,
    pub model: Option<String>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub cache_creation_tokens: Option<i32>,
    pub cache_read_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    pub latency_ms: Option<i64>,
    pub trace_export_status: String,
    pub export_attempts: i32,
    pub created_at: String,
}

impl From<llm_spans::Model> for SpanView {
    fn from(row: llm_spans::Model) -> Self {
        Self {
            total_tokens: row.total_tokens(),
            flow_id: row.flow_id,
            model: row.model_name,
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            cache_creation_tokens: row.cache_creation_tokens,
            cache_read_tokens: row.cache_read_tokens,
            latency_ms: row.latency_ms,
            trace_export_status: row.trace_export_status,
            export_attempts: row.export_attempts,
            created_at: fmt_ts(row.created_at),
        }
    }
}

/// `GET /api/spans` — 最近 LLM 跨度
pub async fn list_spans(
    State(state): State<DashboardState>,
    Query(query): Query<SpansQuery>,
) -> Result<Json<Vec<SpanView>>, ApiError> {
    let mut condition = Condition::all();
    if let Some(status) = &query.status {
        condition = condition.add(llm_spans::Column::TraceExportStatus.eq(status));
    }

    let rows = llm_spans::Entity::find()
        .filter(condition)
        .order_by_desc(llm_spans::Column::CreatedAt)
        .limit(effective_limit(query.limit))
        .all(&*state.db)
        .await?;

    Ok(Json(rows.into_iter().map(SpanView::from).collect()))
}

/// 总览响应
#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub total_flows: u64,
    pub completed_flows: u64,
    pub llm_flows: u64,
    pub spans_pending: u64,
    pub spans_sent: u64,
    pub spans_failed: u64,
    pub refresh_interval_secs: u64,
    pub pipeline: crate::metrics::MetricsSnapshot,
}

/// `GET /api/overview` — 计数与管道运行计数器
pub async fn overview(
    State(state): State<DashboardState>,
) -> Result<Json<OverviewResponse>, ApiError> {
    let db = &*state.db;

    let total_flows = flow_records::Entity::find().count(db).await?;
    let completed_flows = flow_records::Entity::find()
        .filter(flow_records::Column::CompletedAt.is_not_null())
        .count(db)
        .await?;
    let llm_flows = flow_records::Entity::find()
        .filter(flow_records::Column::IsLlmCall.eq(true))
        .count(db)
        .await?;

    let span_count = |status: &'static str| async move {
        llm_spans::Entity::find()
            .filter(llm_spans::Column::TraceExportStatus.eq(status))
            .count(db)
            .await
    };
    let spans_pending = span_count("pending").await?;
    let spans_sent = span_count("sent").await?;
    let spans_failed = span_count("failed").await?;

    Ok(Json(OverviewResponse {
        total_flows,
        completed_flows,
        llm_flows,
        spans_pending,
        spans_sent,
        spans_failed,
        refresh_interval_secs: state.refresh_interval_secs,
        pipeline: state.metrics.snapshot(),
    }))
}

/// 配额快照查询参数
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub limit: Option<u64>,
}

/// 配额快照投影
#[derive(Debug, Serialize)]
pub struct UsageView {
    pub flow_id: String,
    pub host: String,
    pub observed_at: String,
    pub snapshot: Value,
}

/// `GET /api/usage` — 最近的上游配额头快照
pub async fn recent_usage(
    State(state): State<DashboardState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<UsageView>>, ApiError> {
    let rows = flow_records::Entity::find()
        .filter(flow_records::Column::RateLimitSnapshot.is_not_null())
        .order_by_desc(flow_records::Column::StartedAt)
        .limit(effective_limit(query.limit))
        .all(&*state.db)
        .await?;

    let views = rows
        .into_iter()
        .filter_map(|row| {
            let snapshot = row.get_rate_limit_snapshot().ok().flatten()?;
            Some(UsageView {
                flow_id: row.flow_id,
                host: row.host,
                observed_at: fmt_ts(row.completed_at.unwrap_or(row.started_at)),
                snapshot,
            })
        })
        .collect();

    Ok(Json(views))
}
