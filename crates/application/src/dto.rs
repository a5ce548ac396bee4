//! 推送给客户端的 JSON 帧

use domain::{Message, MessageStatus, PresenceStatus, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// 系统帧的发送方
pub const SYSTEM_SENDER: i64 = 0;

/// `status` 字段：普通消息为投递状态，状态帧为在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameStatus {
    Message(MessageStatus),
    Presence(PresenceStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    StatusUpdate,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub sender_id: i64,
    pub receiver_id: i64,
    #[serde(default)]
    pub content: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FrameStatus>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FrameKind>,
}

impl MessageDto {
    /// 普通消息帧，状态以入队后的 delivered 呈现
    pub fn delivered(message: &Message) -> Self {
        Self {
            status: Some(FrameStatus::Message(MessageStatus::Delivered)),
            ..Self::from(message)
        }
    }

    pub fn presence(
        subject: UserId,
        recipient: UserId,
        status: PresenceStatus,
        now: Timestamp,
    ) -> Self {
        Self {
            id: None,
            sender_id: subject.value(),
            receiver_id: recipient.value(),
            content: String::new(),
            timestamp: now,
            status: Some(FrameStatus::Presence(status)),
            kind: Some(FrameKind::StatusUpdate),
        }
    }

    pub fn system(recipient: UserId, content: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: None,
            sender_id: SYSTEM_SENDER,
            receiver_id: recipient.value(),
            content: content.into(),
            timestamp: now,
            status: None,
            kind: Some(FrameKind::System),
        }
    }
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.map(i64::from),
            sender_id: message.sender_id.value(),
            receiver_id: message.receiver_id.value(),
            content: message.content.as_str().to_string(),
            timestamp: message.timestamp,
            status: Some(FrameStatus::Message(message.status)),
            kind: None,
        }
    }
}
