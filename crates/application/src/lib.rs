//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务（消息、在线状态）、负责实时路由的连接中枢，
//! 以及开发和测试用的内存存储。

pub mod clock;
pub mod dto;
pub mod error;
pub mod hub;
pub mod memory;
pub mod services;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dto::{FrameKind, FrameStatus, MessageDto};
pub use error::ApplicationError;
pub use hub::{
    ConnectionHandle, ConnectionId, ConnectionMailbox, EnqueueError, Hub, HubDependencies,
    HubError, HubHandle,
};
pub use memory::{InMemoryMessageRepository, InMemoryStatusRepository};
pub use services::{
    MessageService, MessageServiceDependencies, SendMessageRequest, StatusService,
    StatusServiceDependencies,
};
