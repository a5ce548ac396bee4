use domain::UserId;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::connection::{ConnectionHandle, ConnectionId};
use crate::services::SendMessageRequest;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    #[error("hub is not running")]
    Closed,
}

/// Hub 事件，全部经由同一个队列串行处理
pub enum HubEvent {
    Register(ConnectionHandle),
    Unregister {
        user_id: UserId,
        connection_id: ConnectionId,
    },
    Broadcast(SendMessageRequest),
    /// 当前在线用户快照，同时可作为“之前事件均已处理”的屏障
    OnlineUsers(oneshot::Sender<Vec<UserId>>),
    Shutdown(oneshot::Sender<()>),
}

/// 向 Hub 提交事件的句柄，可任意克隆
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    pub(crate) fn new(events: mpsc::Sender<HubEvent>) -> Self {
        Self { events }
    }

    async fn send(&self, event: HubEvent) -> Result<(), HubError> {
        self.events.send(event).await.map_err(|_| HubError::Closed)
    }

    pub async fn register(&self, connection: ConnectionHandle) -> Result<(), HubError> {
        self.send(HubEvent::Register(connection)).await
    }

    pub async fn unregister(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<(), HubError> {
        self.send(HubEvent::Unregister {
            user_id,
            connection_id,
        })
        .await
    }

    pub async fn broadcast(&self, request: SendMessageRequest) -> Result<(), HubError> {
        self.send(HubEvent::Broadcast(request)).await
    }

    pub async fn online_users(&self) -> Result<Vec<UserId>, HubError> {
        let (reply, receive) = oneshot::channel();
        self.send(HubEvent::OnlineUsers(reply)).await?;
        receive.await.map_err(|_| HubError::Closed)
    }

    /// 请求关闭并等待 Hub 完成清理
    pub async fn shutdown(&self) -> Result<(), HubError> {
        let (done, wait) = oneshot::channel();
        self.send(HubEvent::Shutdown(done)).await?;
        wait.await.map_err(|_| HubError::Closed)
    }
}
