//! # 仪表板 HTTP 服务
//!
//! axum 路由装配与监听；只暴露 GET 查询，无任何变更路径

use crate::config::DashboardConfig;
use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use axum::Router;
use axum::routing::get;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::handlers;

/// 仪表板服务共享状态
#[derive(Clone)]
pub struct DashboardState {
    pub db: Arc<DatabaseConnection>,
    pub metrics: Arc<PipelineMetrics>,
    /// 前端轮询间隔（秒），作为数据新鲜度上界一并下发
    pub refresh_interval_secs: u64,
}

/// 构建只读查询路由
pub fn build_router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/flows", get(handlers::list_flows))
        .route("/api/spans", get(handlers::list_spans))
        .route("/api/overview", get(handlers::overview))
        .route("/api/usage", get(handlers::recent_usage))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 启动仪表板服务，直到取消信号到达
pub async fn serve(
    config: &DashboardConfig,
    state: DashboardState,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PipelineError::internal_with_source(format!("仪表板监听失败: {addr}"), e))?;

    info!(addr = %addr, "仪表板数据服务已启动");

    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| PipelineError::internal_with_source("仪表板服务异常退出", e))?;

    Ok(())
}
