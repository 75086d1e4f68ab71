//! # 应用装配
//!
//! 把资源层、调度队列、工作池、导出器与仪表板装配成一个进程，
//! 并提供带宽限期的优雅关停

mod resources;

pub use resources::AppResources;

use crate::cache::DedupLayer;
use crate::config::AppConfig;
use crate::dashboard::{self, DashboardState};
use crate::dispatch::{DispatchQueue, WorkerContext, spawn_workers};
use crate::error::Result;
use crate::exporter::spawn_exporter;
use crate::metrics::PipelineMetrics;
use crate::normalizer::FlowNormalizer;
use crate::persistence::PersistenceWriter;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 装配完成的管道应用
pub struct Application {
    resources: Arc<AppResources>,
    queue: Arc<DispatchQueue>,
    normalizer: Arc<FlowNormalizer>,
    worker_handles: Vec<JoinHandle<()>>,
    exporter_task: Option<JoinHandle<()>>,
    sweeper_task: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Application {
    /// 构建整条管道：队列、规范化器、工作池、导出器与清扫任务
    pub async fn build(config: AppConfig, database: DatabaseConnection) -> Result<Self> {
        let config = Arc::new(config);
        let resources = AppResources::build(Arc::clone(&config), Arc::new(database)).await?;
        let metrics = resources.metrics();

        let workers = config.pipeline.effective_workers();
        let queue = Arc::new(DispatchQueue::new(
            workers,
            config.pipeline.queue_capacity,
            Arc::clone(&metrics),
        ));
        info!(
            workers = workers,
            queue_capacity = config.pipeline.queue_capacity,
            "调度队列就绪"
        );

        let normalizer = Arc::new(FlowNormalizer::new(
            Arc::clone(&queue),
            &config.classifier,
            config.capture.clone(),
            Arc::clone(&metrics),
        ));

        let writer = Arc::new(PersistenceWriter::new(
            resources.database(),
            config.persistence.retry.to_policy(),
            Arc::clone(&metrics),
        ));
        let dedup = Arc::new(DedupLayer::new(
            resources.cache(),
            config.dedup.clone(),
            Arc::clone(&metrics),
        ));

        let cancel = CancellationToken::new();

        let (exporter, exporter_task) = if config.exporter.enabled {
            let (handle, task) = spawn_exporter(
                config.exporter.clone(),
                Arc::clone(&writer),
                Arc::clone(&metrics),
                cancel.clone(),
            )?;
            (Some(handle), Some(task))
        } else {
            info!("追踪导出未启用，LLM 跨度将保持 pending 状态");
            (None, None)
        };

        let ctx = Arc::new(WorkerContext {
            writer,
            dedup,
            exporter,
            metrics: Arc::clone(&metrics),
        });
        let worker_handles = spawn_workers(Arc::clone(&queue), ctx, cancel.clone());

        let sweeper_task = spawn_pending_sweeper(
            Arc::clone(&normalizer),
            Duration::from_secs(config.pipeline.pending_sweep_interval_secs.max(1)),
            chrono::Duration::seconds(config.pipeline.pending_max_age_secs as i64),
            cancel.clone(),
        );

        Ok(Self {
            resources,
            queue,
            normalizer,
            worker_handles,
            exporter_task,
            sweeper_task,
            cancel,
        })
    }

    /// 注册给代理运行时的观测者实现
    #[must_use]
    pub fn observer(&self) -> Arc<FlowNormalizer> {
        Arc::clone(&self.normalizer)
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.resources.metrics()
    }

    #[must_use]
    pub fn database(&self) -> Arc<DatabaseConnection> {
        self.resources.database()
    }

    /// 运行仪表板数据服务直到取消信号到达
    pub async fn run_dashboard(&self) -> Result<()> {
        let config = self.resources.config();
        let state = DashboardState {
            db: self.resources.database(),
            metrics: self.resources.metrics(),
            refresh_interval_secs: config.dashboard.refresh_interval_secs,
        };
        dashboard::serve(&config.dashboard, state, self.cancel.clone()).await
    }

    /// 优雅关停：停止接收新更新，给在途记录一个宽限期冲刷，
    /// 超时未冲刷的记录作为关停丢失上报而非静默丢弃
    pub async fn shutdown(self) {
        let config = self.resources.config();
        let metrics = self.resources.metrics();
        let grace = Duration::from_millis(config.pipeline.shutdown_grace_ms);

        info!(grace_ms = grace.as_millis() as u64, "开始优雅关停");
        self.queue.close();

        let drain_all = async {
            for handle in self.worker_handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(grace, drain_all).await.is_err() {
            let lost = self.queue.drain_remaining();
            if lost > 0 {
                metrics
                    .lost_on_shutdown
                    .fetch_add(lost as u64, Ordering::Relaxed);
                warn!(lost = lost, "宽限期内未冲刷完成的记录按关停丢失上报");
            }
        }

        // 工作池退出后再终止导出器，让最后一批跨度有机会发出
        self.cancel.cancel();
        if let Some(task) = self.exporter_task {
            let _ = tokio::time::timeout(grace, task).await;
        }
        self.sweeper_task.abort();

        info!("管道已关停");
    }
}

/// 周期性清理响应始终未到达的挂起流状态
fn spawn_pending_sweeper(
    normalizer: Arc<FlowNormalizer>,
    interval: Duration,
    max_age: chrono::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    normalizer.prune_stale(max_age);
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}
