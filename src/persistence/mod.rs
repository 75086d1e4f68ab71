//! # 持久化写入层
//!
//! 关系型存储是流记录的归属方；所有写入以 `flow_id` 幂等

mod writer;

pub use writer::PersistenceWriter;
