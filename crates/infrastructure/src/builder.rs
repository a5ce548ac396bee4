use std::sync::Arc;

use config::DatabaseConfig;
use domain::{MessageRepository, StatusRepository};
use thiserror::Error;
use tracing::info;

use crate::{
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgMessageRepository, PgStatusRepository},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database url is not configured")]
    MissingDatabaseUrl,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 连接池与基于它的仓储
#[derive(Clone)]
pub struct Infrastructure {
    pub message_repository: Arc<PgMessageRepository>,
    pub status_repository: Arc<PgStatusRepository>,
}

impl Infrastructure {
    /// 建立连接池并执行迁移
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, InfrastructureError> {
        let url = config
            .url
            .as_deref()
            .ok_or(InfrastructureError::MissingDatabaseUrl)?;
        let pool = create_pg_pool(url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        info!(max_connections = config.max_connections, "database migrations applied");

        Ok(Self {
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            status_repository: Arc::new(PgStatusRepository::new(pool)),
        })
    }

    pub fn message_repository_trait(&self) -> Arc<dyn MessageRepository> {
        self.message_repository.clone()
    }

    pub fn status_repository_trait(&self) -> Arc<dyn StatusRepository> {
        self.status_repository.clone()
    }
}
