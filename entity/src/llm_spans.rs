//! # LLM 调用跨度实体定义
//!
//! 由已完成且被分类为 LLM 调用的流量记录派生，每个 `flow_id` 至多一条

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// LLM 调用跨度实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "llm_spans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    // === 回指流量记录（非所有权关系） ===
    #[sea_orm(unique)]
    pub flow_id: String,

    // === 模型与 Token 统计 ===
    pub model_name: Option<String>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub cache_creation_tokens: Option<i32>,
    pub cache_read_tokens: Option<i32>,

    // === 延迟与导出状态 ===
    pub latency_ms: Option<i64>,
    pub trace_export_status: String, // pending | sent | failed
    pub export_attempts: i32,

    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::flow_records::Entity",
        from = "Column::FlowId",
        to = "super::flow_records::Column::FlowId",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    FlowRecord,
}

impl Related<super::flow_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FlowRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 跨度导出状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportStatus {
    /// 等待导出
    Pending,
    /// 已成功提交到追踪后端
    Sent,
    /// 重试预算耗尽后放弃
    Failed,
}

impl ExportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Sent => "sent",
            ExportStatus::Failed => "failed",
        }
    }
}

impl From<&str> for ExportStatus {
    fn from(value: &str) -> Self {
        match value {
            "sent" => ExportStatus::Sent,
            "failed" => ExportStatus::Failed,
            _ => ExportStatus::Pending,
        }
    }
}

impl Model {
    /// 获取导出状态
    pub fn get_export_status(&self) -> ExportStatus {
        ExportStatus::from(self.trace_export_status.as_str())
    }

    /// 获取总 token 数
    pub fn total_tokens(&self) -> Option<i32> {
        match (self.prompt_tokens, self.completion_tokens) {
            (Some(p), Some(c)) => Some(p + c),
            _ => None,
        }
    }
}
