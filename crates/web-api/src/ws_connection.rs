//! 单个 WebSocket 连接的适配器
//!
//! 连接拆分为读、写两个任务：
//! - 读任务解析客户端帧并提交给 Hub，读期限在每次收到帧后重新计时
//! - 写任务消费出站队列，定时发送 ping，每次写入都有期限
//!
//! 任意一方结束后另一方随之停止，并向 Hub 注销本连接。

use std::time::Duration;

use application::{
    ConnectionHandle, ConnectionId, ConnectionMailbox, HubHandle, MessageDto, SendMessageRequest,
};
use axum::{
    body::Bytes,
    extract::ws::{Message as WsMessage, WebSocket},
};
use config::WebSocketConfig;
use domain::UserId;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// 客户端上行帧，sender_id、timestamp、status 等字段一律忽略
#[derive(Debug, Deserialize)]
struct InboundFrame {
    receiver_id: i64,
    content: String,
}

#[derive(Debug, Error)]
enum TransportError {
    #[error("write deadline exceeded")]
    WriteTimeout,
    #[error("websocket error: {0}")]
    Socket(#[from] axum::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

type WsSink = SplitSink<WebSocket, WsMessage>;
type WsStream = SplitStream<WebSocket>;

pub(crate) async fn serve(socket: WebSocket, state: AppState, user_id: UserId) {
    let (connection, mailbox) = ConnectionHandle::new(user_id, state.outbound_capacity);
    let connection_id = connection.id();
    if let Err(err) = state.hub.register(connection).await {
        warn!(user_id = %user_id, error = %err, "hub unavailable, dropping websocket");
        return;
    }
    info!(user_id = %user_id, connection_id = %connection_id, "WebSocket 连接已建立");

    let (sink, stream) = socket.split();
    let settings = state.websocket.clone();
    let write_timeout = settings.write_timeout();

    let mut writer = tokio::spawn(write_loop(sink, mailbox, settings.clone(), user_id));
    let mut reader = tokio::spawn(read_loop(stream, state.hub.clone(), settings, user_id));

    tokio::select! {
        _ = &mut writer => {
            debug!(user_id = %user_id, "WebSocket发送任务结束");
            reader.abort();
            unregister(&state.hub, user_id, connection_id).await;
        }
        _ = &mut reader => {
            debug!(user_id = %user_id, "WebSocket接收任务结束");
            unregister(&state.hub, user_id, connection_id).await;
            // Hub 关闭出站队列后写任务会发送 close 帧并退出
            if timeout(write_timeout, &mut writer).await.is_err() {
                writer.abort();
            }
        }
    }

    info!(user_id = %user_id, connection_id = %connection_id, "WebSocket 连接已关闭");
}

async fn unregister(hub: &HubHandle, user_id: UserId, connection_id: ConnectionId) {
    if let Err(err) = hub.unregister(user_id, connection_id).await {
        debug!(user_id = %user_id, error = %err, "unregister skipped");
    }
}

async fn send_with_deadline(
    sink: &mut WsSink,
    message: WsMessage,
    deadline: Duration,
) -> Result<(), TransportError> {
    match timeout(deadline, sink.send(message)).await {
        Ok(result) => result.map_err(TransportError::from),
        Err(_) => Err(TransportError::WriteTimeout),
    }
}

async fn send_frame(
    sink: &mut WsSink,
    frame: &MessageDto,
    deadline: Duration,
) -> Result<(), TransportError> {
    let payload = serde_json::to_string(frame)?;
    send_with_deadline(sink, WsMessage::Text(payload.into()), deadline).await
}

async fn write_loop(
    mut sink: WsSink,
    mailbox: ConnectionMailbox,
    settings: WebSocketConfig,
    user_id: UserId,
) {
    let ConnectionMailbox {
        mut outbound,
        mut farewell,
    } = mailbox;
    let deadline = settings.write_timeout();
    let period = settings.ping_interval();
    let mut ping = interval_at(Instant::now() + period, period);
    let mut farewell_pending = true;

    loop {
        tokio::select! {
            biased;

            notice = &mut farewell, if farewell_pending => {
                match notice {
                    Ok(frame) => {
                        if let Err(err) = send_frame(&mut sink, &frame, deadline).await {
                            debug!(user_id = %user_id, error = %err, "failed to write farewell");
                        }
                        let _ = send_with_deadline(&mut sink, WsMessage::Close(None), deadline).await;
                        return;
                    }
                    // 普通关闭时告别通道随句柄一起被丢弃
                    Err(_) => farewell_pending = false,
                }
            }
            next = outbound.recv() => {
                let Some(frame) = next else {
                    let _ = send_with_deadline(&mut sink, WsMessage::Close(None), deadline).await;
                    return;
                };
                if let Err(err) = send_frame(&mut sink, &frame, deadline).await {
                    warn!(user_id = %user_id, error = %err, "websocket write failed");
                    return;
                }
            }
            _ = ping.tick() => {
                if let Err(err) = send_with_deadline(&mut sink, WsMessage::Ping(Bytes::new()), deadline).await {
                    warn!(user_id = %user_id, error = %err, "websocket ping failed");
                    return;
                }
            }
        }
    }
}

async fn read_loop(
    mut stream: WsStream,
    hub: HubHandle,
    settings: WebSocketConfig,
    user_id: UserId,
) {
    let deadline = settings.read_timeout();
    loop {
        let next = match timeout(deadline, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                info!(user_id = %user_id, "read deadline expired");
                return;
            }
        };
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                debug!(user_id = %user_id, error = %err, "websocket read failed");
                return;
            }
            None => return,
        };

        match message {
            WsMessage::Text(text) => {
                let Some(request) = parse_frame(user_id, text.as_str()) else {
                    continue;
                };
                if let Err(err) = hub.broadcast(request).await {
                    warn!(user_id = %user_id, error = %err, "hub unavailable, closing connection");
                    return;
                }
            }
            WsMessage::Close(_) => return,
            WsMessage::Binary(_) => debug!(user_id = %user_id, "binary frame ignored"),
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }
}

/// 解析并校验上行帧，发送方固定为已认证身份；不合法的帧记录后丢弃
fn parse_frame(sender: UserId, text: &str) -> Option<SendMessageRequest> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(user_id = %sender, error = %err, "malformed frame dropped");
            return None;
        }
    };
    let request = SendMessageRequest {
        sender_id: sender.value(),
        receiver_id: frame.receiver_id,
        content: frame.content,
    };
    if let Err(err) = request.validate() {
        warn!(user_id = %sender, error = %err, "invalid frame dropped");
        return None;
    }
    Some(request)
}
