//! 连接中枢
//!
//! 唯一持有在线连接表的任务。注册、注销、消息路由与关闭都作为事件
//! 进入同一个队列，按到达顺序处理，连接表本身无需加锁。
//! 与存储的交互都有超时上限，失败只记录日志，不会中断事件循环。

mod connection;
mod handle;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use config::HubConfig;
use domain::{MessageId, PresenceStatus, UserId};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub use connection::{ConnectionHandle, ConnectionId, ConnectionMailbox, EnqueueError};
pub use handle::{HubError, HubEvent, HubHandle};

use crate::{
    clock::Clock,
    dto::MessageDto,
    error::ApplicationError,
    services::{MessageService, SendMessageRequest, StatusService},
};

pub const SHUTDOWN_NOTICE: &str = "Server is shutting down";

pub struct HubDependencies {
    pub message_service: Arc<MessageService>,
    pub status_service: Arc<StatusService>,
    pub clock: Arc<dyn Clock>,
}

pub struct Hub {
    deps: HubDependencies,
    events: mpsc::Receiver<HubEvent>,
    clients: HashMap<UserId, ConnectionHandle>,
    store_timeout: Duration,
}

async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ApplicationError>
where
    F: Future<Output = Result<T, ApplicationError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ApplicationError::Timeout(limit)),
    }
}

impl Hub {
    pub fn new(deps: HubDependencies, config: &HubConfig) -> (Self, HubHandle) {
        let (sender, events) = mpsc::channel(config.event_capacity);
        let hub = Self {
            deps,
            events,
            clients: HashMap::new(),
            store_timeout: config.store_timeout(),
        };
        (hub, HubHandle::new(sender))
    }

    /// 事件循环，直到收到关闭事件或所有句柄都被丢弃
    pub async fn run(mut self) {
        info!("hub started");
        while let Some(event) = self.events.recv().await {
            match event {
                HubEvent::Register(connection) => self.register(connection).await,
                HubEvent::Unregister {
                    user_id,
                    connection_id,
                } => self.unregister(user_id, connection_id).await,
                HubEvent::Broadcast(request) => self.broadcast(request).await,
                HubEvent::OnlineUsers(reply) => {
                    let _ = reply.send(self.online_users());
                }
                HubEvent::Shutdown(done) => {
                    self.shutdown().await;
                    let _ = done.send(());
                    info!("hub stopped");
                    return;
                }
            }
        }
        warn!("all hub handles dropped, tearing down");
        self.shutdown().await;
    }

    fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.clients.keys().copied().collect();
        users.sort();
        users
    }

    async fn register(&mut self, connection: ConnectionHandle) {
        let user_id = connection.user_id();
        let connection_id = connection.id();
        if let Some(previous) = self.clients.insert(user_id, connection) {
            info!(user_id = %user_id, previous = %previous.id(), "replacing existing connection");
            previous.close();
        }
        info!(user_id = %user_id, connection_id = %connection_id, "user connected");

        self.mirror_status(user_id, PresenceStatus::Online).await;
        let dead = self.fan_out_presence(user_id, PresenceStatus::Online);
        self.drop_connections(dead).await;
        self.replay_pending(user_id).await;
    }

    async fn unregister(&mut self, user_id: UserId, connection_id: ConnectionId) {
        match self.clients.get(&user_id) {
            Some(current) if current.id() == connection_id => {
                info!(user_id = %user_id, connection_id = %connection_id, "user disconnected");
                self.drop_connections(vec![user_id]).await;
            }
            _ => {
                debug!(user_id = %user_id, connection_id = %connection_id, "stale unregister ignored");
            }
        }
    }

    async fn broadcast(&mut self, request: SendMessageRequest) {
        let sender_id = request.sender_id;
        let message = match bounded(
            self.store_timeout,
            self.deps.message_service.send_message(request),
        )
        .await
        {
            Ok(message) => message,
            Err(err) => {
                error!(sender_id, error = %err, "failed to store message, dropping it");
                return;
            }
        };

        let receiver = message.receiver_id;
        let outcome = match self.clients.get(&receiver) {
            Some(connection) => connection.try_enqueue(MessageDto::delivered(&message)),
            None => {
                debug!(receiver_id = %receiver, "receiver offline, message kept for replay");
                return;
            }
        };

        match outcome {
            Ok(()) => {
                if let Some(id) = message.id {
                    self.mark_delivered(receiver, id).await;
                }
            }
            Err(err) => {
                warn!(user_id = %receiver, error = %err, "outbound queue unusable, evicting connection");
                self.drop_connections(vec![receiver]).await;
            }
        }
    }

    /// 按时间正序补发离线消息，队列不可用时立即停止
    async fn replay_pending(&mut self, user_id: UserId) {
        let pending = match bounded(
            self.store_timeout,
            self.deps
                .message_service
                .get_undelivered_messages(user_id.value()),
        )
        .await
        {
            Ok(pending) => pending,
            Err(err) => {
                error!(user_id = %user_id, error = %err, "failed to load pending messages");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }
        debug!(user_id = %user_id, count = pending.len(), "replaying pending messages");

        for message in pending {
            let Some(connection) = self.clients.get(&user_id) else {
                return;
            };
            if let Err(err) = connection.try_enqueue(MessageDto::delivered(&message)) {
                warn!(user_id = %user_id, error = %err, "replay interrupted, evicting connection");
                self.drop_connections(vec![user_id]).await;
                return;
            }
            if let Some(id) = message.id {
                self.mark_delivered(user_id, id).await;
            }
        }
    }

    /// 移除连接并关闭其队列，随后写离线状态、通知其余在线用户。
    /// 通知过程中发现的失效连接加入同一工作列表，每个连接只处理一次。
    async fn drop_connections(&mut self, mut worklist: Vec<UserId>) {
        while let Some(user_id) = worklist.pop() {
            let Some(connection) = self.clients.remove(&user_id) else {
                continue;
            };
            connection.close();
            self.mirror_status(user_id, PresenceStatus::Offline).await;
            worklist.extend(self.fan_out_presence(user_id, PresenceStatus::Offline));
        }
    }

    /// 通知除本人以外的所有在线用户，返回队列不可用的用户
    fn fan_out_presence(&self, subject: UserId, status: PresenceStatus) -> Vec<UserId> {
        let now = self.deps.clock.now();
        self.clients
            .iter()
            .filter(|(user_id, _)| **user_id != subject)
            .filter_map(|(user_id, connection)| {
                let frame = MessageDto::presence(subject, *user_id, status, now);
                match connection.try_enqueue(frame) {
                    Ok(()) => None,
                    Err(err) => {
                        warn!(user_id = %user_id, error = %err, "presence fan-out failed");
                        Some(*user_id)
                    }
                }
            })
            .collect()
    }

    async fn mirror_status(&self, user_id: UserId, status: PresenceStatus) {
        if let Err(err) = bounded(
            self.store_timeout,
            self.deps.status_service.update_status(user_id.value(), status),
        )
        .await
        {
            error!(user_id = %user_id, status = %status, error = %err, "failed to persist presence");
        }
    }

    async fn mark_delivered(&self, user_id: UserId, id: MessageId) {
        match bounded(
            self.store_timeout,
            self.deps.message_service.mark_delivered(id),
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => debug!(user_id = %user_id, message_id = %id, "message was not in sent state"),
            Err(err) => {
                error!(user_id = %user_id, message_id = %id, error = %err, "failed to mark message delivered")
            }
        }
    }

    async fn shutdown(&mut self) {
        info!(connections = self.clients.len(), "hub shutting down");
        let now = self.deps.clock.now();
        for (user_id, connection) in self.clients.drain() {
            connection.close_with(MessageDto::system(user_id, SHUTDOWN_NOTICE, now));
        }
        match bounded(self.store_timeout, self.deps.status_service.mark_all_offline()).await {
            Ok(count) => info!(count, "marked online users offline"),
            Err(err) => error!(error = %err, "failed to mark users offline during shutdown"),
        }
    }
}
