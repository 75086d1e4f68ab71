//! # 调度队列工作任务
//!
//! 每个工作任务排空自己的分区，对每条记录依次执行
//! 去重 → 持久化 →（条件）导出提交；不同记录在不同任务上并发。
//! 所有存储、缓存与导出 I/O 都被限制在这里，绝不出现在代理热路径。

use super::{DispatchQueue, FlowUpdate};
use crate::cache::DedupLayer;
use crate::cache::keys::flow_fingerprint;
use crate::exporter::{
    ExporterHandle, LlmRequestMeta, SpanRecord, extract_request_meta, extract_usage,
};
use crate::intercept::header_value;
use crate::metrics::PipelineMetrics;
use crate::normalizer::FlowRecord;
use crate::persistence::PersistenceWriter;
use bytes::Bytes;
use entity::llm_spans::ExportStatus;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 工作任务的共享依赖，进程启动时构建一次后注入
pub struct WorkerContext {
    pub writer: Arc<PersistenceWriter>,
    pub dedup: Arc<DedupLayer>,
    pub exporter: Option<ExporterHandle>,
    pub metrics: Arc<PipelineMetrics>,
}

/// 启动固定大小的工作池
pub fn spawn_workers(
    queue: Arc<DispatchQueue>,
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..queue.worker_count())
        .map(|idx| {
            let queue = Arc::clone(&queue);
            let ctx = Arc::clone(&ctx);
            let cancel = cancel.clone();
            tokio::spawn(run_worker(idx, queue, ctx, cancel))
        })
        .collect()
}

async fn run_worker(
    idx: usize,
    queue: Arc<DispatchQueue>,
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        if let Some(update) = queue.try_pop(idx) {
            process_update(&ctx, update).await;
            continue;
        }

        // 关停后排空分区再退出
        if queue.is_closed() {
            break;
        }

        tokio::select! {
            () = queue.wait(idx) => {}
            () = cancel.cancelled() => break,
        }
    }
    debug!(worker = idx, "工作任务退出");
}

async fn process_update(ctx: &WorkerContext, update: FlowUpdate) {
    match update {
        FlowUpdate::Pending {
            record,
            llm_request_body,
        } => {
            // 请求侧 LLM 元数据先进关联缓存，等待响应到达
            if record.is_llm_call {
                if let Some(body) = &llm_request_body {
                    if let Some(meta) = extract_request_meta(body) {
                        ctx.dedup.put_correlation(&record.flow_id, &meta).await;
                    }
                }
            }

            if let Err(e) = ctx.writer.upsert_flow(&record).await {
                warn!(flow_id = %record.flow_id, error = %e, "pending 记录持久化失败");
            }
        }
        FlowUpdate::Complete {
            record,
            llm_request_body,
            llm_response_body,
        } => {
            // 持久化独立于导出结果，必须先行完成
            let persisted = match ctx.writer.upsert_flow(&record).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(flow_id = %record.flow_id, error = %e, "complete 记录持久化失败");
                    false
                }
            };

            if record.is_llm_call {
                handle_llm_completion(ctx, &record, llm_request_body, llm_response_body, persisted)
                    .await;
            }
        }
    }
}

/// LLM 流完成：去重判定、跨度构建与导出提交
async fn handle_llm_completion(
    ctx: &WorkerContext,
    record: &FlowRecord,
    llm_request_body: Option<Bytes>,
    llm_response_body: Option<Bytes>,
    persisted: bool,
) {
    // 关联状态无论后续走向如何都要取走，避免缓存残留
    let meta: Option<LlmRequestMeta> = ctx.dedup.take_correlation(&record.flow_id).await;

    // 出错终结的流或没有落库的流不产出跨度
    if record.error.is_some() || !persisted {
        return;
    }

    let fingerprint = flow_fingerprint(
        &record.host,
        &record.method,
        &record.path,
        record.request_body_digest.as_deref(),
    );

    if let Some(prior) = ctx.dedup.observe(&fingerprint, &record.flow_id).await {
        debug!(
            flow_id = %record.flow_id,
            first_flow_id = %prior.first_flow_id,
            hits = prior.hits,
            "窗口内重复调用，抑制跨度创建"
        );
        return;
    }

    // 关联缓存丢失时回退到随更新携带的请求体
    let meta = meta.or_else(|| {
        llm_request_body
            .as_deref()
            .and_then(extract_request_meta)
    });

    let content_type = header_value(&record.response_headers, "content-type");
    let usage = llm_response_body
        .as_deref()
        .map(|body| extract_usage(content_type, body))
        .unwrap_or_default();

    // 响应侧模型优先，缺失时用请求侧元数据补齐
    let model = usage
        .model
        .clone()
        .or_else(|| meta.and_then(|m| m.model));

    let span = SpanRecord {
        flow_id: record.flow_id.clone(),
        model,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        cache_creation_tokens: usage.cache_creation_tokens,
        cache_read_tokens: usage.cache_read_tokens,
        latency_ms: record.latency_ms(),
        status_code: record.status_code,
    };

    match ctx.writer.insert_span_if_absent(&span).await {
        Ok(true) => {
            ctx.metrics.spans_created.fetch_add(1, Ordering::Relaxed);

            if let Some(exporter) = &ctx.exporter {
                if !exporter.submit(span) {
                    // 提交队列满：跨度立即标记 failed，绝不阻塞工作任务
                    ctx.metrics.spans_failed.fetch_add(1, Ordering::Relaxed);
                    warn!(flow_id = %record.flow_id, "导出队列已满，跨度标记为 failed");
                    if let Err(e) = ctx
                        .writer
                        .mark_span_status(&record.flow_id, ExportStatus::Failed, 0)
                        .await
                    {
                        warn!(flow_id = %record.flow_id, error = %e, "标记跨度失败状态时出错");
                    }
                }
            }
        }
        // 重放：跨度已存在，不重复提交
        Ok(false) => {}
        Err(e) => {
            warn!(flow_id = %record.flow_id, error = %e, "跨度写入失败");
        }
    }
}
