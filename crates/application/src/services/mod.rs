mod message_service;
mod status_service;


pub use message_service::{MessageService, MessageServiceDependencies, SendMessageRequest};
pub use status_service::{StatusService, StatusServiceDependencies};
