//! # 事务化幂等写入器
//!
//! 每条记录一个事务，避免写出半截行（有头无状态码之类）。
//! pending 重放不会产生重复行；complete 合并进已有行；
//! complete 之后到达的 pending 是空操作，状态绝不回退。
//! 瞬态存储错误走显式退避状态机重试，预算耗尽后该记录被放弃，
//! 不影响其他记录。

use crate::error::Result;
use crate::exporter::SpanRecord;
use crate::metrics::PipelineMetrics;
use crate::normalizer::FlowRecord;
use crate::utils::backoff::RetryPolicy;
use chrono::Utc;
use entity::llm_spans::{self, ExportStatus};
use entity::flow_records;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, warn};

/// 持久化写入器，连接池由所有工作任务共享
pub struct PersistenceWriter {
    db: Arc<DatabaseConnection>,
    retry: RetryPolicy,
    metrics: Arc<PipelineMetrics>,
}

/// 判定数据库错误是否为可重试的瞬态错误（连接丢失、获取超时）
fn is_transient_db_err(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}

fn headers_json(headers: &[(String, String)]) -> Option<String> {
    if headers.is_empty() {
        None
    } else {
        serde_json::to_string(headers).ok()
    }
}

impl PersistenceWriter {
    pub fn new(
        db: Arc<DatabaseConnection>,
        retry: RetryPolicy,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self { db, retry, metrics }
    }

    /// 幂等写入一条流记录
    ///
    /// 瞬态错误按退避状态机重试；预算耗尽报告为持久写入失败并放弃，
    /// 永久错误（约束冲突等）不重试直接丢弃
    pub async fn upsert_flow(&self, record: &FlowRecord) -> Result<()> {
        let mut schedule = self.retry.schedule();

        loop {
            match self.try_upsert_flow(record).await {
                Ok(()) => {
                    self.metrics.flows_persisted.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) if is_transient_db_err(&e) => match schedule.next_delay() {
                    Some(delay) => {
                        self.metrics.persist_retries.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            flow_id = %record.flow_id,
                            attempt = schedule.attempts_done(),
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "瞬态数据库错误，退避后重试"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        self.metrics.persist_failures.fetch_add(1, Ordering::Relaxed);
                        error!(
                            flow_id = %record.flow_id,
                            attempts = schedule.attempts_done(),
                            error = %e,
                            "重试预算耗尽，记录作为持久写入失败被放弃"
                        );
                        return Err(e.into());
                    }
                },
                Err(e) => {
                    self.metrics.persist_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        flow_id = %record.flow_id,
                        error = %e,
                        "永久性存储错误，记录被丢弃且不重试"
                    );
                    return Err(e.into());
                }
            }
        }
    }

    /// 单事务内的查找-合并-写入
    async fn try_upsert_flow(&self, record: &FlowRecord) -> std::result::Result<(), DbErr> {
        let txn = self.db.begin().await?;

        let existing = flow_records::Entity::find()
            .filter(flow_records::Column::FlowId.eq(&record.flow_id))
            .one(&txn)
            .await?;

        match existing {
            None => {
                let started_at = record.started_at.naive_utc();
                // 完成时间不早于开始时间
                let completed_at = record
                    .completed_at
                    .map(|end| end.naive_utc().max(started_at));

                let model = flow_records::ActiveModel {
                    id: NotSet,
                    flow_id: Set(record.flow_id.clone()),
                    method: Set(record.method.clone()),
                    host: Set(record.host.clone()),
                    path: Set(record.path.clone()),
                    request_headers: Set(headers_json(&record.request_headers)),
                    request_body_digest: Set(record.request_body_digest.clone()),
                    status_code: Set(record.status_code.map(i32::from)),
                    response_headers: Set(headers_json(&record.response_headers)),
                    response_body_digest: Set(record.response_body_digest.clone()),
                    is_llm_call: Set(record.is_llm_call),
                    error_message: Set(record.error.clone()),
                    rate_limit_snapshot: Set(record
                        .rate_limit_snapshot
                        .as_ref()
                        .map(std::string::ToString::to_string)),
                    started_at: Set(started_at),
                    completed_at: Set(completed_at),
                    created_at: Set(Utc::now().naive_utc()),
                };
                model.insert(&txn).await?;
            }
            Some(row) if record.is_complete() => {
                // complete 合并进已有行，保留原始开始时间
                let started_at = row.started_at;
                let completed_at = record
                    .completed_at
                    .map(|end| end.naive_utc().max(started_at));

                let mut model: flow_records::ActiveModel = row.into();
                model.status_code = Set(record.status_code.map(i32::from));
                model.response_headers = Set(headers_json(&record.response_headers));
                model.response_body_digest = Set(record.response_body_digest.clone());
                model.error_message = Set(record.error.clone());
                if let Some(snapshot) = &record.rate_limit_snapshot {
                    model.rate_limit_snapshot = Set(Some(snapshot.to_string()));
                }
                model.completed_at = Set(completed_at);
                model.update(&txn).await?;
            }
            Some(row) => {
                if row.completed_at.is_some() {
                    // complete 之后重放的 pending：空操作，不回退
                    debug!(flow_id = %record.flow_id, "忽略已完成记录上的 pending 重放");
                } else {
                    // pending 重放：刷新请求侧字段，保持幂等
                    let mut model: flow_records::ActiveModel = row.into();
                    model.method = Set(record.method.clone());
                    model.host = Set(record.host.clone());
                    model.path = Set(record.path.clone());
                    model.request_headers = Set(headers_json(&record.request_headers));
                    model.request_body_digest = Set(record.request_body_digest.clone());
                    model.update(&txn).await?;
                }
            }
        }

        txn.commit().await
    }

    /// 若不存在则插入跨度行（pending 状态）；返回是否新建
    ///
    /// 同一 flow_id 的更新由同一工作任务处理，这里无跨任务竞争
    pub async fn insert_span_if_absent(&self, span: &SpanRecord) -> Result<bool> {
        let existing = llm_spans::Entity::find()
            .filter(llm_spans::Column::FlowId.eq(&span.flow_id))
            .one(&*self.db)
            .await?;

        if existing.is_some() {
            return Ok(false);
        }

        let clamp = |v: Option<u32>| v.map(|t| i32::try_from(t).unwrap_or(i32::MAX));

        let model = llm_spans::ActiveModel {
            id: NotSet,
            flow_id: Set(span.flow_id.clone()),
            model_name: Set(span.model.clone()),
            prompt_tokens: Set(clamp(span.prompt_tokens)),
            completion_tokens: Set(clamp(span.completion_tokens)),
            cache_creation_tokens: Set(clamp(span.cache_creation_tokens)),
            cache_read_tokens: Set(clamp(span.cache_read_tokens)),
            latency_ms: Set(span.latency_ms),
            trace_export_status: Set(ExportStatus::Pending.as_str().to_string()),
            export_attempts: Set(0),
            created_at: Set(Utc::now().naive_utc()),
        };
        model.insert(&*self.db).await?;
        Ok(true)
    }

    /// 更新跨度导出状态，仪表板据此可见导出结果
    pub async fn mark_span_status(
        &self,
        flow_id: &str,
        status: ExportStatus,
        attempts: u32,
    ) -> Result<()> {
        let update = llm_spans::ActiveModel {
            trace_export_status: Set(status.as_str().to_string()),
            export_attempts: Set(i32::try_from(attempts).unwrap_or(i32::MAX)),
            ..Default::default()
        };

        let result = llm_spans::Entity::update_many()
            .filter(llm_spans::Column::FlowId.eq(flow_id))
            .set(update)
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(flow_id = %flow_id, "未找到要更新导出状态的跨度");
        }
        Ok(())
    }
}
