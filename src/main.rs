//! # Flowscribe 主程序
//!
//! 流量观测管道守护进程：装配调度队列、工作池、追踪导出器与
//! 仪表板数据服务。代理运行时作为外部嵌入方通过
//! `Application::observer()` 拿到 `FlowObserver` 并注册流事件钩子。

use clap::Parser;
use flowscribe::app::Application;
use flowscribe::{PipelineError, Result, config, database, logging};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "flowscribe", about = "代理流量观测管道")]
struct Args {
    /// 配置文件路径，缺省按 RUST_ENV 查找 config/config.{env}.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别（被 RUST_LOG 覆盖）
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    logging::init_logging(args.log_level.as_deref());

    // 加载并验证配置
    let app_config = match &args.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };

    // 初始化数据库并执行迁移
    let db = database::init_database(&app_config.database)
        .await
        .map_err(|e| PipelineError::database_with_source("数据库初始化失败", e))?;
    database::run_migrations(&db)
        .await
        .map_err(|e| PipelineError::database_with_source("数据库迁移失败", e))?;

    // 装配管道
    let app = Application::build(app_config, db).await?;
    info!("管道装配完成，等待代理运行时注册流事件");

    // 运行仪表板服务直到退出信号
    tokio::select! {
        result = app.run_dashboard() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到退出信号");
        }
    }

    // 优雅关停：冲刷在途记录
    app.shutdown().await;
    info!("服务正常关闭");
    Ok(())
}
