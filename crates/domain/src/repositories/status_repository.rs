//! 在线状态Repository接口定义

use async_trait::async_trait;

use crate::repositories::RepositoryResult;
use crate::user_status::UserStatus;
use crate::value_objects::{Timestamp, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait StatusRepository: Send + Sync {
    /// 按 user_id 插入或覆盖
    async fn upsert(&self, status: &UserStatus) -> RepositoryResult<()>;

    async fn find(&self, user: UserId) -> RepositoryResult<Option<UserStatus>>;

    async fn list(&self) -> RepositoryResult<Vec<UserStatus>>;

    /// 所有在线记录改为离线，返回变更条数
    async fn mark_all_offline(&self, at: Timestamp) -> RepositoryResult<u64>;
}
