//! # 流量记录实体定义
//!
//! 每条记录对应一次被代理截获的请求/响应对，`flow_id` 全局唯一

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 流量记录实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "flow_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    // === 流标识 ===
    #[sea_orm(unique)]
    pub flow_id: String,

    // === 请求信息 ===
    pub method: String,
    pub host: String,
    pub path: String,
    pub request_headers: Option<String>,  // JSON: 有序键值对序列
    pub request_body_digest: Option<String>,

    // === 响应信息 ===
    pub status_code: Option<i32>,
    pub response_headers: Option<String>, // JSON: 有序键值对序列
    pub response_body_digest: Option<String>,

    // === 分类与异常 ===
    pub is_llm_call: bool,
    pub error_message: Option<String>,

    // === 上游配额头快照（JSON） ===
    pub rate_limit_snapshot: Option<String>,

    // === 生命周期时间 ===
    pub started_at: DateTime,
    pub completed_at: Option<DateTime>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::llm_spans::Entity")]
    LlmSpan,
}

impl Related<super::llm_spans::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LlmSpan.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 头部键值对序列，保持截获时的顺序
pub type HeaderSeq = Vec<(String, String)>;

impl Model {
    /// 记录是否已进入 complete 状态
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// 解析请求头序列
    pub fn get_request_headers(&self) -> Result<HeaderSeq, serde_json::Error> {
        match &self.request_headers {
            Some(data) => serde_json::from_str(data),
            None => Ok(Vec::new()),
        }
    }

    /// 解析响应头序列
    pub fn get_response_headers(&self) -> Result<HeaderSeq, serde_json::Error> {
        match &self.response_headers {
            Some(data) => serde_json::from_str(data),
            None => Ok(Vec::new()),
        }
    }

    /// 解析配额头快照
    pub fn get_rate_limit_snapshot(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        match &self.rate_limit_snapshot {
            Some(data) => serde_json::from_str(data).map(Some),
            None => Ok(None),
        }
    }

    /// 计算从请求到响应的耗时（毫秒）
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| end.signed_duration_since(self.started_at).num_milliseconds())
    }
}
