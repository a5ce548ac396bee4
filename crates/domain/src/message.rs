//! 私信消息实体

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageContent, MessageId, Timestamp, UserId};

/// 消息投递状态，只能按 sent -> delivered -> read 前进。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }

    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Sent, MessageStatus::Delivered)
                | (MessageStatus::Delivered, MessageStatus::Read)
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown message status `{other}`"),
            )),
        }
    }
}

/// 尚未落库的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
}

/// 已受理的私信
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// 落库后由存储层分配
    pub id: Option<MessageId>,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    pub timestamp: Timestamp,
    pub status: MessageStatus,
}

impl Message {
    /// 以服务端时间戳受理新消息，初始状态为 sent
    pub fn stamp(new: NewMessage, now: Timestamp) -> Self {
        Self {
            id: None,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content,
            timestamp: now,
            status: MessageStatus::Sent,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn transition_to(&mut self, next: MessageStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// 判断消息是否属于两人之间的会话（不区分方向）
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.sender_id == user || self.receiver_id == user
    }
}
