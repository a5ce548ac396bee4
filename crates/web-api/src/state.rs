use std::sync::Arc;

use application::{HubHandle, MessageService, StatusService};
use config::WebSocketConfig;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub message_service: Arc<MessageService>,
    pub status_service: Arc<StatusService>,
    pub hub: HubHandle,
    pub jwt_service: Arc<JwtService>,
    pub websocket: WebSocketConfig,
    /// 每个连接出站队列的容量
    pub outbound_capacity: usize,
}

impl AppState {
    pub fn new(
        message_service: Arc<MessageService>,
        status_service: Arc<StatusService>,
        hub: HubHandle,
        jwt_service: Arc<JwtService>,
        websocket: WebSocketConfig,
        outbound_capacity: usize,
    ) -> Self {
        Self {
            message_service,
            status_service,
            hub,
            jwt_service,
            websocket,
            outbound_capacity,
        }
    }
}
