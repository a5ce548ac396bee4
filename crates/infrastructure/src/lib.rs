//! 基础设施层实现。
//!
//! 提供 PostgreSQL 连接池、迁移和仓储，实现领域层定义的存储接口。

pub mod builder;
pub mod migrations;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureError};
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgMessageRepository, PgStatusRepository};
