use std::sync::Arc;

use domain::{
    DomainError, HistoryLimit, Message, MessageContent, MessageId, MessageRepository, NewMessage,
    UserId,
};

use crate::{clock::Clock, error::ApplicationError};

/// 客户端提交的一条私信，发送方来自已认证身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
}

impl SendMessageRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        parse_user(self.sender_id, "sender_id")?;
        parse_user(self.receiver_id, "receiver_id")?;
        MessageContent::new(self.content.as_str())?;
        Ok(())
    }

    pub fn into_new_message(self) -> Result<NewMessage, DomainError> {
        Ok(NewMessage {
            sender_id: parse_user(self.sender_id, "sender_id")?,
            receiver_id: parse_user(self.receiver_id, "receiver_id")?,
            content: MessageContent::new(self.content)?,
        })
    }
}

fn parse_user(value: i64, field: &str) -> Result<UserId, DomainError> {
    UserId::parse(value)
        .map_err(|_| DomainError::invalid_argument(field, "must be a positive integer"))
}

pub struct MessageServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    /// 受理并保存消息：时间戳取服务端时钟，状态固定为 sent
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let new_message = request.into_new_message()?;
        let message = Message::stamp(new_message, self.deps.clock.now());
        let id = self.deps.message_repository.create(&message).await?;
        Ok(message.with_id(id))
    }

    pub async fn find_message(&self, id: MessageId) -> Result<Option<Message>, ApplicationError> {
        Ok(self.deps.message_repository.find_by_id(id).await?)
    }

    pub async fn get_conversation(
        &self,
        user_a: i64,
        user_b: i64,
        limit: u32,
    ) -> Result<Vec<Message>, ApplicationError> {
        let a = parse_user(user_a, "user_id")?;
        let b = parse_user(user_b, "peer_id")?;
        let limit = HistoryLimit::new(limit)?;
        Ok(self.deps.message_repository.conversation(a, b, limit).await?)
    }

    pub async fn get_user_messages(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Message>, ApplicationError> {
        let user = parse_user(user_id, "user_id")?;
        let limit = HistoryLimit::new(limit)?;
        Ok(self.deps.message_repository.user_messages(user, limit).await?)
    }

    /// 收件人尚未投递的消息，最早的在前
    pub async fn get_undelivered_messages(
        &self,
        user_id: i64,
    ) -> Result<Vec<Message>, ApplicationError> {
        let user = parse_user(user_id, "user_id")?;
        Ok(self.deps.message_repository.undelivered(user).await?)
    }

    pub async fn mark_delivered(&self, id: MessageId) -> Result<bool, ApplicationError> {
        Ok(self.deps.message_repository.mark_delivered(id).await?)
    }

    pub async fn mark_delivered_for_receiver(
        &self,
        receiver_id: i64,
    ) -> Result<u64, ApplicationError> {
        let receiver = parse_user(receiver_id, "receiver_id")?;
        Ok(self
            .deps
            .message_repository
            .mark_delivered_for_receiver(receiver)
            .await?)
    }

    /// sender 发给 receiver 且已投递的消息标记为已读
    pub async fn mark_read(&self, sender_id: i64, receiver_id: i64) -> Result<u64, ApplicationError> {
        let sender = parse_user(sender_id, "sender_id")?;
        let receiver = parse_user(receiver_id, "receiver_id")?;
        Ok(self.deps.message_repository.mark_read(sender, receiver).await?)
    }
}
