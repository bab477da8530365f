use sqlx::migrate::Migrator;

/// 仓库根目录 `migrations/` 下的数据库迁移
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
