//! 消息Repository接口定义

use async_trait::async_trait;

use crate::message::Message;
use crate::repositories::RepositoryResult;
use crate::value_objects::{HistoryLimit, MessageId, UserId};

/// 消息Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 保存新消息并返回分配的ID
    async fn create(&self, message: &Message) -> RepositoryResult<MessageId>;

    /// 根据ID查找消息
    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>>;

    /// 两人之间的会话，按时间倒序
    async fn conversation(
        &self,
        a: UserId,
        b: UserId,
        limit: HistoryLimit,
    ) -> RepositoryResult<Vec<Message>>;

    /// 用户发送或接收的所有消息，按时间倒序
    async fn user_messages(&self, user: UserId, limit: HistoryLimit)
        -> RepositoryResult<Vec<Message>>;

    /// 收件人尚未投递的消息，按时间正序
    async fn undelivered(&self, receiver: UserId) -> RepositoryResult<Vec<Message>>;

    /// 单条消息 sent -> delivered，返回是否发生变化
    async fn mark_delivered(&self, id: MessageId) -> RepositoryResult<bool>;

    /// 收件人所有 sent 消息改为 delivered
    async fn mark_delivered_for_receiver(&self, receiver: UserId) -> RepositoryResult<u64>;

    /// sender 发给 receiver 的 delivered 消息改为 read
    async fn mark_read(&self, sender: UserId, receiver: UserId) -> RepositoryResult<u64>;
}
