//! 内存存储实现，用于开发环境和测试

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use domain::{
    HistoryLimit, Message, MessageId, MessageRepository, MessageStatus, PresenceStatus,
    RepositoryResult, StatusRepository, Timestamp, UserId, UserStatus,
};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
    next_id: AtomicI64,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前存储的全部消息，按写入顺序
    pub async fn snapshot(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }
}

fn newest_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: &Message) -> RepositoryResult<MessageId> {
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.messages.write().await.push(message.clone().with_id(id));
        Ok(id)
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| m.id == Some(id)).cloned())
    }

    async fn conversation(
        &self,
        a: UserId,
        b: UserId,
        limit: HistoryLimit,
    ) -> RepositoryResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut found: Vec<Message> = messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect();
        newest_first(&mut found);
        found.truncate(limit.value() as usize);
        Ok(found)
    }

    async fn user_messages(
        &self,
        user: UserId,
        limit: HistoryLimit,
    ) -> RepositoryResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut found: Vec<Message> = messages
            .iter()
            .filter(|m| m.involves(user))
            .cloned()
            .collect();
        newest_first(&mut found);
        found.truncate(limit.value() as usize);
        Ok(found)
    }

    async fn undelivered(&self, receiver: UserId) -> RepositoryResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut found: Vec<Message> = messages
            .iter()
            .filter(|m| m.receiver_id == receiver && m.status == MessageStatus::Sent)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn mark_delivered(&self, id: MessageId) -> RepositoryResult<bool> {
        let mut messages = self.messages.write().await;
        let changed = messages
            .iter_mut()
            .find(|m| m.id == Some(id))
            .map(|m| m.transition_to(MessageStatus::Delivered).is_ok())
            .unwrap_or(false);
        Ok(changed)
    }

    async fn mark_delivered_for_receiver(&self, receiver: UserId) -> RepositoryResult<u64> {
        let mut messages = self.messages.write().await;
        let mut changed = 0;
        for message in messages
            .iter_mut()
            .filter(|m| m.receiver_id == receiver && m.status == MessageStatus::Sent)
        {
            message.status = MessageStatus::Delivered;
            changed += 1;
        }
        Ok(changed)
    }

    async fn mark_read(&self, sender: UserId, receiver: UserId) -> RepositoryResult<u64> {
        let mut messages = self.messages.write().await;
        let mut changed = 0;
        for message in messages.iter_mut().filter(|m| {
            m.sender_id == sender
                && m.receiver_id == receiver
                && m.status == MessageStatus::Delivered
        }) {
            message.status = MessageStatus::Read;
            changed += 1;
        }
        Ok(changed)
    }
}

#[derive(Default)]
pub struct InMemoryStatusRepository {
    statuses: RwLock<HashMap<UserId, UserStatus>>,
}

impl InMemoryStatusRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusRepository for InMemoryStatusRepository {
    async fn upsert(&self, status: &UserStatus) -> RepositoryResult<()> {
        self.statuses
            .write()
            .await
            .insert(status.user_id, status.clone());
        Ok(())
    }

    async fn find(&self, user: UserId) -> RepositoryResult<Option<UserStatus>> {
        Ok(self.statuses.read().await.get(&user).cloned())
    }

    async fn list(&self) -> RepositoryResult<Vec<UserStatus>> {
        let mut all: Vec<UserStatus> = self.statuses.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.user_id);
        Ok(all)
    }

    async fn mark_all_offline(&self, at: Timestamp) -> RepositoryResult<u64> {
        let mut statuses = self.statuses.write().await;
        let mut changed = 0;
        for status in statuses.values_mut().filter(|s| s.is_online()) {
            status.status = PresenceStatus::Offline;
            status.last_seen = at;
            changed += 1;
        }
        Ok(changed)
    }
}
