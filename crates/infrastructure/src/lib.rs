//! 基础设施层实现。
//!
//! 提供 PostgreSQL 消息存储与用户资料目录，实现应用层定义的接口。

pub mod builder;
pub mod migrations;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgMessageStore, PgStorage, PgUserDirectory};
