use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FlowRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FlowRecords::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    // === 流标识 ===
                    .col(
                        ColumnDef::new(FlowRecords::FlowId)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    // === 请求信息 ===
                    .col(
                        ColumnDef::new(FlowRecords::Method)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlowRecords::Host)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlowRecords::Path)
                            .string_len(1000)
                            .not_null(),
                    )
                    .col(ColumnDef::new(FlowRecords::RequestHeaders).text())
                    .col(ColumnDef::new(FlowRecords::RequestBodyDigest).string_len(64))
                    // === 响应信息 ===
                    .col(ColumnDef::new(FlowRecords::StatusCode).integer())
                    .col(ColumnDef::new(FlowRecords::ResponseHeaders).text())
                    .col(ColumnDef::new(FlowRecords::ResponseBodyDigest).string_len(64))
                    // === 分类与异常 ===
                    .col(
                        ColumnDef::new(FlowRecords::IsLlmCall)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(FlowRecords::ErrorMessage).text())
                    // === 上游配额头快照 ===
                    .col(ColumnDef::new(FlowRecords::RateLimitSnapshot).text())
                    // === 生命周期时间 ===
                    .col(
                        ColumnDef::new(FlowRecords::StartedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FlowRecords::CompletedAt).timestamp())
                    .col(
                        ColumnDef::new(FlowRecords::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建核心索引
        manager
            .create_index(
                Index::create()
                    .name("idx_flow_records_started_at")
                    .table(FlowRecords::Table)
                    .col(FlowRecords::StartedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_flow_records_llm_started")
                    .table(FlowRecords::Table)
                    .col(FlowRecords::IsLlmCall)
                    .col(FlowRecords::StartedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_flow_records_status_started")
                    .table(FlowRecords::Table)
                    .col(FlowRecords::StatusCode)
                    .col(FlowRecords::StartedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_flow_records_host")
                    .table(FlowRecords::Table)
                    .col(FlowRecords::Host)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FlowRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FlowRecords {
    Table,
    // 流标识
    Id,
    FlowId,
    // 请求信息
    Method,
    Host,
    Path,
    RequestHeaders,
    RequestBodyDigest,
    // 响应信息
    StatusCode,
    ResponseHeaders,
    ResponseBodyDigest,
    // 分类与异常
    IsLlmCall,
    ErrorMessage,
    // 配额头快照
    RateLimitSnapshot,
    // 生命周期时间
    StartedAt,
    CompletedAt,
    CreatedAt,
}
