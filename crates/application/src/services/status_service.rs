use std::sync::Arc;

use domain::{PresenceStatus, StatusRepository, UserId, UserStatus};

use crate::{clock::Clock, error::ApplicationError};

pub struct StatusServiceDependencies {
    pub status_repository: Arc<dyn StatusRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct StatusService {
    deps: StatusServiceDependencies,
}

impl StatusService {
    pub fn new(deps: StatusServiceDependencies) -> Self {
        Self { deps }
    }

    /// 写入在线状态，last_seen 总是取服务端时钟
    pub async fn update_status(
        &self,
        user_id: i64,
        status: PresenceStatus,
    ) -> Result<UserStatus, ApplicationError> {
        let user = UserId::parse(user_id)?;
        let record = UserStatus::new(user, status, self.deps.clock.now());
        self.deps.status_repository.upsert(&record).await?;
        Ok(record)
    }

    pub async fn get_status(&self, user_id: i64) -> Result<UserStatus, ApplicationError> {
        let user = UserId::parse(user_id)?;
        let found = self.deps.status_repository.find(user).await?;
        Ok(found.unwrap_or_else(|| UserStatus::offline(user, self.deps.clock.now())))
    }

    pub async fn get_all_statuses(&self) -> Result<Vec<UserStatus>, ApplicationError> {
        Ok(self.deps.status_repository.list().await?)
    }

    pub async fn mark_all_offline(&self) -> Result<u64, ApplicationError> {
        let now = self.deps.clock.now();
        Ok(self.deps.status_repository.mark_all_offline(now).await?)
    }
}
