//! # 追踪导出器
//!
//! 把完成的 LLM 调用作为跨度批量提交到外部追踪后端。
//! 提交相对产生它的工作任务完全异步：工作任务只做非阻塞入队，
//! 网络发送在独立的导出任务上进行；后端延迟永远不会
//! 拖住调度队列，导出结果也不影响流记录的持久化。

pub mod usage;

pub use usage::{LlmRequestMeta, LlmUsage, extract_request_meta, extract_usage};

use crate::config::ExporterConfig;
use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::persistence::PersistenceWriter;
use entity::llm_spans::ExportStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 待导出的跨度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    pub flow_id: String,
    pub model: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cache_creation_tokens: Option<u32>,
    pub cache_read_tokens: Option<u32>,
    pub latency_ms: Option<i64>,
    pub status_code: Option<u16>,
}

/// 工作任务持有的导出句柄，入队永不阻塞
#[derive(Clone)]
pub struct ExporterHandle {
    tx: mpsc::Sender<SpanRecord>,
}

impl ExporterHandle {
    /// 提交一个跨度；队列满时返回 false，由调用方标记 failed
    pub fn submit(&self, span: SpanRecord) -> bool {
        self.tx.try_send(span).is_ok()
    }
}

/// 启动导出任务，返回提交句柄与任务把手
pub fn spawn_exporter(
    config: ExporterConfig,
    writer: Arc<PersistenceWriter>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
) -> Result<(ExporterHandle, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
        .build()
        .map_err(|e| PipelineError::export_with_source("构建追踪后端 HTTP 客户端失败", e))?;

    info!(endpoint = %config.endpoint, batch_size = config.batch_size, "追踪导出器已启动");

    let task = ExporterTask {
        config,
        client,
        writer,
        metrics,
    };
    let handle = tokio::spawn(task.run(rx, cancel));

    Ok((ExporterHandle { tx }, handle))
}

struct ExporterTask {
    config: ExporterConfig,
    client: reqwest::Client,
    writer: Arc<PersistenceWriter>,
    metrics: Arc<PipelineMetrics>,
}

impl ExporterTask {
    async fn run(self, mut rx: mpsc::Receiver<SpanRecord>, cancel: CancellationToken) {
        let mut batch: Vec<SpanRecord> = Vec::with_capacity(self.config.batch_size);
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.flush_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_span = rx.recv() => {
                    match maybe_span {
                        Some(span) => {
                            batch.push(span);
                            if batch.len() >= self.config.batch_size {
                                self.flush(&mut batch).await;
                            }
                        }
                        None => {
                            self.flush(&mut batch).await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.flush(&mut batch).await;
                }
                _ = cancel.cancelled() => {
                    // 关停：把通道里已入队的跨度并入最后一批
                    while let Ok(span) = rx.try_recv() {
                        batch.push(span);
                    }
                    self.flush(&mut batch).await;
                    break;
                }
            }
        }
        debug!("追踪导出任务退出");
    }

    /// 提交一批跨度：有界退避重试，预算耗尽后整批标记 failed
    async fn flush(&self, batch: &mut Vec<SpanRecord>) {
        if batch.is_empty() {
            return;
        }
        let spans = std::mem::take(batch);
        let mut schedule = self.config.retry.to_policy().schedule();

        loop {
            match self.send_batch(&spans).await {
                Ok(()) => {
                    self.metrics
                        .spans_sent
                        .fetch_add(spans.len() as u64, Ordering::Relaxed);
                    self.mark_all(&spans, ExportStatus::Sent, schedule.attempts_done() + 1)
                        .await;
                    return;
                }
                Err(e) => match schedule.next_delay() {
                    Some(delay) => {
                        warn!(
                            error = %e,
                            attempt = schedule.attempts_done(),
                            delay_ms = delay.as_millis() as u64,
                            "跨度批量提交失败，退避后重试"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(
                            error = %e,
                            attempts = schedule.attempts_done(),
                            spans = spans.len(),
                            "导出重试预算耗尽，整批跨度标记为 failed"
                        );
                        self.metrics
                            .spans_failed
                            .fetch_add(spans.len() as u64, Ordering::Relaxed);
                        self.mark_all(&spans, ExportStatus::Failed, schedule.attempts_done())
                            .await;
                        return;
                    }
                },
            }
        }
    }

    async fn send_batch(&self, spans: &[SpanRecord]) -> Result<()> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&serde_json::json!({ "batch": spans }));

        if let Some(public_key) = &self.config.public_key {
            request = request.basic_auth(public_key, self.config.secret_key.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PipelineError::export(format!(
                "追踪后端返回非成功状态: {status}"
            )))
        }
    }

    /// 把整批跨度的导出状态写回存储，使其对仪表板可见
    async fn mark_all(&self, spans: &[SpanRecord], status: ExportStatus, attempts: u32) {
        for span in spans {
            if let Err(e) = self
                .writer
                .mark_span_status(&span.flow_id, status, attempts)
                .await
            {
                warn!(flow_id = %span.flow_id, error = %e, "更新跨度导出状态失败");
            }
        }
    }
}
