//! 端到端测试支撑：内存存储 + 真实路由，监听随机端口

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    Clock, Hub, HubDependencies, HubHandle, InMemoryMessageRepository, InMemoryStatusRepository,
    MessageDto, MessageService, MessageServiceDependencies, StatusService,
    StatusServiceDependencies, SystemClock,
};
use config::{HubConfig, JwtConfig, WebSocketConfig};
use domain::{Message, UserId};
use futures_util::StreamExt;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::header::AUTHORIZATION, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestApp {
    pub addr: SocketAddr,
    pub hub: HubHandle,
    pub hub_task: JoinHandle<()>,
    pub jwt: Arc<JwtService>,
    pub messages: Arc<InMemoryMessageRepository>,
    pub statuses: Arc<InMemoryStatusRepository>,
    pub message_service: Arc<MessageService>,
    pub status_service: Arc<StatusService>,
    shutdown: Option<oneshot::Sender<()>>,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(WebSocketConfig::default()).await
}

/// 使用自定义心跳与读写期限启动
pub async fn spawn_app_with(websocket: WebSocketConfig) -> TestApp {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let messages = Arc::new(InMemoryMessageRepository::new());
    let statuses = Arc::new(InMemoryStatusRepository::new());

    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        message_repository: messages.clone(),
        clock: clock.clone(),
    }));
    let status_service = Arc::new(StatusService::new(StatusServiceDependencies {
        status_repository: statuses.clone(),
        clock: clock.clone(),
    }));

    let hub_config = HubConfig::default();
    let (hub, hub_handle) = Hub::new(
        HubDependencies {
            message_service: message_service.clone(),
            status_service: status_service.clone(),
            clock,
        },
        &hub_config,
    );
    let hub_task = tokio::spawn(hub.run());

    let jwt = Arc::new(JwtService::new(JwtConfig {
        secret: "integration-test-secret".to_string(),
        expiration_hours: 1,
    }));

    let state = AppState::new(
        message_service.clone(),
        status_service.clone(),
        hub_handle.clone(),
        jwt.clone(),
        websocket,
        hub_config.outbound_capacity,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestApp {
        addr,
        hub: hub_handle,
        hub_task,
        jwt,
        messages,
        statuses,
        message_service,
        status_service,
        shutdown: Some(shutdown_tx),
    }
}

impl TestApp {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn token(&self, user_id: i64) -> String {
        self.jwt
            .generate_token(UserId::parse(user_id).expect("positive id"))
            .expect("token")
    }

    /// 以指定用户身份建立 WebSocket，并等待 Hub 完成注册
    pub async fn connect(&self, user_id: i64) -> WsClient {
        let mut request = self.ws_url().into_client_request().expect("request");
        request.headers_mut().insert(
            AUTHORIZATION,
            format!("Bearer {}", self.token(user_id))
                .parse()
                .expect("header"),
        );
        let (stream, _) = connect_async(request).await.expect("websocket connect");
        self.wait_until_online(UserId::parse(user_id).expect("positive id"))
            .await;
        stream
    }

    pub async fn wait_until_online(&self, user: UserId) {
        for _ in 0..100 {
            if self.hub.online_users().await.expect("hub running").contains(&user) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("user {user} never registered");
    }

    /// 等待存储中至少有 count 条消息
    pub async fn wait_for_stored(&self, count: usize) -> Vec<Message> {
        for _ in 0..100 {
            let stored = self.messages.snapshot().await;
            if stored.len() >= count {
                return stored;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {count} stored messages");
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 读取下一条文本帧并解析，忽略 ping/pong
pub async fn next_frame(client: &mut WsClient) -> Option<MessageDto> {
    loop {
        let message = timeout(Duration::from_secs(2), client.next()).await.ok()??;
        match message.ok()? {
            WsMessage::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            _ => return None,
        }
    }
}

/// 跳过在线状态通知，返回下一条普通消息
pub async fn next_chat_frame(client: &mut WsClient) -> Option<MessageDto> {
    loop {
        let frame = next_frame(client).await?;
        if frame.kind.is_none() {
            return Some(frame);
        }
    }
}
