use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LlmSpans::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LlmSpans::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    // === 回指流量记录 ===
                    .col(
                        ColumnDef::new(LlmSpans::FlowId)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    // === 模型与 Token 统计 ===
                    .col(ColumnDef::new(LlmSpans::ModelName).string_len(100))
                    .col(ColumnDef::new(LlmSpans::PromptTokens).integer())
                    .col(ColumnDef::new(LlmSpans::CompletionTokens).integer())
                    .col(ColumnDef::new(LlmSpans::CacheCreationTokens).integer())
                    .col(ColumnDef::new(LlmSpans::CacheReadTokens).integer())
                    // === 延迟与导出状态 ===
                    .col(ColumnDef::new(LlmSpans::LatencyMs).big_integer())
                    .col(
                        ColumnDef::new(LlmSpans::TraceExportStatus)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(LlmSpans::ExportAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LlmSpans::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_llm_spans_flow_id")
                            .from(LlmSpans::Table, LlmSpans::FlowId)
                            .to(FlowRecords::Table, FlowRecords::FlowId)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_llm_spans_export_status")
                    .table(LlmSpans::Table)
                    .col(LlmSpans::TraceExportStatus)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_llm_spans_created_at")
                    .table(LlmSpans::Table)
                    .col(LlmSpans::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LlmSpans::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LlmSpans {
    Table,
    Id,
    FlowId,
    // 模型与 Token 统计
    ModelName,
    PromptTokens,
    CompletionTokens,
    CacheCreationTokens,
    CacheReadTokens,
    // 延迟与导出状态
    LatencyMs,
    TraceExportStatus,
    ExportAttempts,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FlowRecords {
    Table,
    FlowId,
}
