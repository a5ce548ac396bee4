//! Hub 事件处理测试：注册替换、投递、驱逐、补发与关闭

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use application::{
    hub::SHUTDOWN_NOTICE, Clock, ConnectionHandle, ConnectionMailbox, FrameKind, FrameStatus, Hub,
    HubDependencies, HubError, HubHandle, InMemoryMessageRepository, InMemoryStatusRepository,
    ManualClock, MessageDto, MessageService, MessageServiceDependencies, SendMessageRequest,
    StatusService, StatusServiceDependencies,
};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use config::HubConfig;
use domain::{
    MessageRepository, MessageStatus, MockMessageRepository, MockStatusRepository, PresenceStatus,
    RepositoryError, RepositoryResult, StatusRepository, Timestamp, UserId, UserStatus,
};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

struct TestHub {
    handle: HubHandle,
    task: JoinHandle<()>,
    messages: Arc<InMemoryMessageRepository>,
    statuses: Arc<InMemoryStatusRepository>,
    message_service: Arc<MessageService>,
    clock: Arc<ManualClock>,
}

fn user(id: i64) -> UserId {
    UserId::parse(id).unwrap()
}

fn start_hub_with(
    message_repository: Arc<dyn MessageRepository>,
    status_repository: Arc<dyn StatusRepository>,
    clock: Arc<ManualClock>,
) -> (HubHandle, JoinHandle<()>, Arc<MessageService>) {
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        message_repository,
        clock: clock.clone(),
    }));
    let status_service = Arc::new(StatusService::new(StatusServiceDependencies {
        status_repository,
        clock: clock.clone(),
    }));
    let config = HubConfig {
        store_timeout_ms: 500,
        ..HubConfig::default()
    };
    let (hub, handle) = Hub::new(
        HubDependencies {
            message_service: message_service.clone(),
            status_service,
            clock,
        },
        &config,
    );
    let task = tokio::spawn(hub.run());
    (handle, task, message_service)
}

fn start_hub() -> TestHub {
    let messages = Arc::new(InMemoryMessageRepository::new());
    let statuses = Arc::new(InMemoryStatusRepository::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
    ));
    let (handle, task, message_service) =
        start_hub_with(messages.clone(), statuses.clone(), clock.clone());
    TestHub {
        handle,
        task,
        messages,
        statuses,
        message_service,
        clock,
    }
}

async fn register(hub: &HubHandle, id: i64, capacity: usize) -> ConnectionMailbox {
    let (handle, mailbox) = ConnectionHandle::new(user(id), capacity);
    hub.register(handle).await.unwrap();
    mailbox
}

fn send(sender_id: i64, receiver_id: i64, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        sender_id,
        receiver_id,
        content: content.to_string(),
    }
}

fn drain(mailbox: &mut ConnectionMailbox) -> Vec<MessageDto> {
    let mut frames = Vec::new();
    while let Ok(frame) = mailbox.outbound.try_recv() {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn newest_connection_replaces_previous_one() {
    let hub = start_hub();
    let (first, mut first_box) = ConnectionHandle::new(user(1), 8);
    let first_id = first.id();
    hub.handle.register(first).await.unwrap();

    let (second, _second_box) = ConnectionHandle::new(user(1), 8);
    let second_id = second.id();
    hub.handle.register(second).await.unwrap();

    assert_eq!(hub.handle.online_users().await.unwrap(), vec![user(1)]);
    assert!(first_box.outbound.recv().await.is_none());

    // 旧连接的注销不影响新连接
    hub.handle.unregister(user(1), first_id).await.unwrap();
    assert_eq!(hub.handle.online_users().await.unwrap(), vec![user(1)]);

    hub.handle.unregister(user(1), second_id).await.unwrap();
    hub.handle.unregister(user(1), second_id).await.unwrap();
    assert!(hub.handle.online_users().await.unwrap().is_empty());

    let status = hub.statuses.find(user(1)).await.unwrap().unwrap();
    assert_eq!(status.status, PresenceStatus::Offline);
}

#[tokio::test]
async fn message_to_online_receiver_is_delivered_once() {
    let hub = start_hub();
    let mut receiver = register(&hub.handle, 2, 8).await;

    hub.handle.broadcast(send(1, 2, "hi")).await.unwrap();
    hub.handle.online_users().await.unwrap();

    let frames = drain(&mut receiver);
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.sender_id, 1);
    assert_eq!(frame.receiver_id, 2);
    assert_eq!(frame.content, "hi");
    assert_eq!(frame.status, Some(FrameStatus::Message(MessageStatus::Delivered)));
    assert!(frame.kind.is_none());

    let stored = hub.messages.snapshot().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, MessageStatus::Delivered);
    assert_eq!(frame.id, stored[0].id.map(i64::from));
}

#[tokio::test]
async fn message_to_offline_receiver_stays_sent() {
    let hub = start_hub();
    let mut bystander = register(&hub.handle, 3, 8).await;

    hub.handle.broadcast(send(1, 2, "later")).await.unwrap();
    hub.handle.online_users().await.unwrap();

    assert!(drain(&mut bystander).is_empty());
    let stored = hub.messages.snapshot().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, MessageStatus::Sent);
}

#[tokio::test]
async fn full_queue_evicts_connection_exactly_once() {
    let hub = start_hub();
    let mut watcher = register(&hub.handle, 3, 8).await;
    let mut slow = register(&hub.handle, 2, 1).await;

    hub.handle.broadcast(send(1, 2, "first")).await.unwrap();
    hub.handle.broadcast(send(1, 2, "second")).await.unwrap();
    hub.handle.broadcast(send(1, 2, "third")).await.unwrap();
    assert_eq!(hub.handle.online_users().await.unwrap(), vec![user(3)]);

    let first = slow.outbound.recv().await.unwrap();
    assert_eq!(first.content, "first");
    assert!(slow.outbound.recv().await.is_none());

    let presence: Vec<(i64, Option<FrameStatus>)> = drain(&mut watcher)
        .into_iter()
        .map(|frame| (frame.sender_id, frame.status))
        .collect();
    assert_eq!(
        presence,
        vec![
            (2, Some(FrameStatus::Presence(PresenceStatus::Online))),
            (2, Some(FrameStatus::Presence(PresenceStatus::Offline))),
        ]
    );

    let statuses: Vec<MessageStatus> = hub
        .messages
        .snapshot()
        .await
        .into_iter()
        .map(|m| m.status)
        .collect();
    assert_eq!(
        statuses,
        vec![MessageStatus::Delivered, MessageStatus::Sent, MessageStatus::Sent]
    );
    let status = hub.statuses.find(user(2)).await.unwrap().unwrap();
    assert_eq!(status.status, PresenceStatus::Offline);
}

#[tokio::test]
async fn presence_is_never_sent_to_its_subject() {
    let hub = start_hub();
    let mut first = register(&hub.handle, 1, 8).await;
    let mut second = register(&hub.handle, 2, 8).await;
    hub.handle.online_users().await.unwrap();

    let to_first = drain(&mut first);
    assert_eq!(to_first.len(), 1);
    assert_eq!(to_first[0].sender_id, 2);
    assert_eq!(to_first[0].receiver_id, 1);
    assert_eq!(to_first[0].kind, Some(FrameKind::StatusUpdate));
    assert!(drain(&mut second).is_empty());
}

#[tokio::test]
async fn eviction_cascades_to_other_dead_connections() {
    let hub = start_hub();
    let mut healthy = register(&hub.handle, 1, 8).await;
    // 容量为 1 的连接在收到下一条通知时就会被判定失效
    let _full_a = register(&hub.handle, 2, 1).await;
    let _full_b = register(&hub.handle, 3, 1).await;
    drain(&mut healthy);

    let (gone, gone_box) = ConnectionHandle::new(user(4), 8);
    let gone_id = gone.id();
    hub.handle.register(gone).await.unwrap();
    drop(gone_box);
    hub.handle.unregister(user(4), gone_id).await.unwrap();

    assert_eq!(hub.handle.online_users().await.unwrap(), vec![user(1)]);
    let offline: Vec<i64> = drain(&mut healthy)
        .into_iter()
        .filter(|f| f.status == Some(FrameStatus::Presence(PresenceStatus::Offline)))
        .map(|f| f.sender_id)
        .collect();
    assert_eq!(offline.len(), 3);
    for id in [2, 3, 4] {
        assert_eq!(offline.iter().filter(|s| **s == id).count(), 1);
    }
}

#[tokio::test]
async fn pending_messages_replay_oldest_first() {
    let hub = start_hub();
    for text in ["one", "two", "three"] {
        hub.message_service.send_message(send(1, 2, text)).await.unwrap();
        hub.clock.advance(Duration::seconds(5));
    }

    let mut receiver = register(&hub.handle, 2, 8).await;
    hub.handle.online_users().await.unwrap();

    let contents: Vec<String> = drain(&mut receiver).into_iter().map(|f| f.content).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
    assert!(hub
        .messages
        .snapshot()
        .await
        .iter()
        .all(|m| m.status == MessageStatus::Delivered));
}

#[tokio::test]
async fn replay_stops_when_queue_overflows() {
    let hub = start_hub();
    for text in ["a", "b", "c", "d"] {
        hub.message_service.send_message(send(1, 2, text)).await.unwrap();
        hub.clock.advance(Duration::seconds(1));
    }

    let mut receiver = register(&hub.handle, 2, 2).await;
    assert!(hub.handle.online_users().await.unwrap().is_empty());

    let contents: Vec<String> = drain(&mut receiver).into_iter().map(|f| f.content).collect();
    assert_eq!(contents, vec!["a", "b"]);
    let statuses: Vec<MessageStatus> = hub
        .messages
        .snapshot()
        .await
        .into_iter()
        .map(|m| m.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            MessageStatus::Delivered,
            MessageStatus::Delivered,
            MessageStatus::Sent,
            MessageStatus::Sent
        ]
    );
}

#[tokio::test]
async fn shutdown_sends_farewell_and_marks_everyone_offline() {
    let hub = start_hub();
    let first = register(&hub.handle, 1, 8).await;
    let second = register(&hub.handle, 2, 8).await;

    hub.handle.shutdown().await.unwrap();
    hub.task.await.unwrap();

    for mut mailbox in [first, second] {
        let farewell = (&mut mailbox.farewell).await.unwrap();
        assert_eq!(farewell.kind, Some(FrameKind::System));
        assert_eq!(farewell.content, SHUTDOWN_NOTICE);
        drain(&mut mailbox);
        assert_eq!(mailbox.outbound.try_recv(), Err(TryRecvError::Disconnected));
    }

    let statuses = hub.statuses.list().await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| !s.is_online()));
    assert_eq!(hub.handle.online_users().await, Err(HubError::Closed));
}

#[tokio::test]
async fn store_failures_do_not_stop_the_hub() {
    let mut messages = MockMessageRepository::new();
    messages
        .expect_create()
        .returning(|_| Err(RepositoryError::storage("insert failed")));
    messages
        .expect_undelivered()
        .returning(|_| Err(RepositoryError::storage("select failed")));

    let mut statuses = MockStatusRepository::new();
    statuses
        .expect_upsert()
        .returning(|_| Err(RepositoryError::storage("upsert failed")));
    statuses
        .expect_mark_all_offline()
        .times(1)
        .returning(|_| Err(RepositoryError::storage("update failed")));

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (handle, task, _) = start_hub_with(Arc::new(messages), Arc::new(statuses), clock);

    let (connection, mut mailbox) = ConnectionHandle::new(user(2), 8);
    handle.register(connection).await.unwrap();
    handle.broadcast(send(1, 2, "lost")).await.unwrap();
    assert_eq!(handle.online_users().await.unwrap(), vec![user(2)]);
    assert!(matches!(mailbox.outbound.try_recv(), Err(TryRecvError::Empty)));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn clock_drives_frame_timestamps() {
    let hub = start_hub();
    let mut first = register(&hub.handle, 1, 8).await;
    hub.clock.advance(Duration::minutes(3));
    let _second = register(&hub.handle, 2, 8).await;
    hub.handle.online_users().await.unwrap();

    let frames = drain(&mut first);
    assert_eq!(frames[0].timestamp, hub.clock.now());
}

/// 写入永不返回的状态存储
struct StalledStatusRepository;

#[async_trait]
impl StatusRepository for StalledStatusRepository {
    async fn upsert(&self, _status: &UserStatus) -> RepositoryResult<()> {
        std::future::pending().await
    }

    async fn find(&self, _user: UserId) -> RepositoryResult<Option<UserStatus>> {
        Ok(None)
    }

    async fn list(&self) -> RepositoryResult<Vec<UserStatus>> {
        Ok(Vec::new())
    }

    async fn mark_all_offline(&self, _at: Timestamp) -> RepositoryResult<u64> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn stalled_store_is_bounded_by_timeout() {
    let messages = Arc::new(InMemoryMessageRepository::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (handle, task, _) =
        start_hub_with(messages.clone(), Arc::new(StalledStatusRepository), clock);

    let started = Instant::now();
    let mut bob = register(&handle, 2, 8).await;
    let _alice = register(&handle, 1, 8).await;
    assert_eq!(handle.online_users().await.unwrap(), vec![user(1), user(2)]);
    // 两次注册各等待一次超时（500ms）
    assert!(started.elapsed() < StdDuration::from_secs(3));

    handle.broadcast(send(1, 2, "still routed")).await.unwrap();
    handle.online_users().await.unwrap();
    let frames = drain(&mut bob);
    assert!(frames.iter().any(|f| f.content == "still routed"));
    assert_eq!(messages.snapshot().await[0].status, MessageStatus::Delivered);

    let started = Instant::now();
    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert!(started.elapsed() < StdDuration::from_secs(2));
}
