//! # 仪表板数据服务
//!
//! 持久化存储之上的只读查询面，供监控前端按固定间隔轮询。
//! 没有存储之外的缓存；数据新鲜度上界即轮询间隔。
//! 空库或半填充状态都必须正常返回。

mod handlers;
mod server;

pub use server::{DashboardState, build_router, serve};
