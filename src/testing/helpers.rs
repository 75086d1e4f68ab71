//! # 测试辅助函数

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::sync::Once;
use tracing::Level;

static INIT: Once = Once::new();

/// 初始化测试环境
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 创建内存数据库连接并应用全部迁移
///
/// 内存库限制为单连接，多个池化连接会各自拿到独立的空库
pub async fn create_test_db() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// 测试数据库包装器
pub struct TestTransaction {
    pub db: DatabaseConnection,
}

impl TestTransaction {
    /// 创建新的测试数据库
    pub async fn new() -> Result<Self, DbErr> {
        let db = create_test_db().await?;
        Ok(Self { db })
    }

    /// 获取数据库连接引用
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
