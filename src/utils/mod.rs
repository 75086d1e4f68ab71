//! # 通用工具模块

pub mod backoff;
pub mod digest;
pub mod event_stream;
