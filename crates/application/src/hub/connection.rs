use std::fmt;

use domain::UserId;
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use uuid::Uuid;

use crate::dto::MessageDto;

/// 单个连接的标识，用于区分同一用户的新旧连接
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("outbound queue is full")]
    Full,
    #[error("outbound queue is closed")]
    Closed,
}

/// Hub 持有的连接句柄。
///
/// 句柄是出站队列唯一的发送端，句柄被丢弃即队列关闭，
/// 因此关闭操作消耗 `self`，不会重复发生。
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    outbound: mpsc::Sender<MessageDto>,
    farewell: Option<oneshot::Sender<MessageDto>>,
}

/// 连接一侧持有的接收端
#[derive(Debug)]
pub struct ConnectionMailbox {
    pub outbound: mpsc::Receiver<MessageDto>,
    /// 关闭前直接写给客户端的最后一帧，不经过出站队列
    pub farewell: oneshot::Receiver<MessageDto>,
}

impl ConnectionHandle {
    pub fn new(user_id: UserId, capacity: usize) -> (Self, ConnectionMailbox) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (farewell_tx, farewell_rx) = oneshot::channel();
        let handle = Self {
            id: ConnectionId::new(),
            user_id,
            outbound: outbound_tx,
            farewell: Some(farewell_tx),
        };
        let mailbox = ConnectionMailbox {
            outbound: outbound_rx,
            farewell: farewell_rx,
        };
        (handle, mailbox)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// 非阻塞入队
    pub fn try_enqueue(&self, frame: MessageDto) -> Result<(), EnqueueError> {
        self.outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    pub fn close(self) {
        drop(self);
    }

    /// 先交付告别帧再关闭队列
    pub fn close_with(mut self, frame: MessageDto) {
        if let Some(farewell) = self.farewell.take() {
            let _ = farewell.send(frame);
        }
    }
}
