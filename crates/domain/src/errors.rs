//! 领域模型错误定义
//!
//! 定义了系统中所有可能的错误类型，提供清晰的错误上下文。

use thiserror::Error;

use crate::message::MessageStatus;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 输入校验失败
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 消息状态只能前进
    #[error("message status cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: MessageStatus,
        to: MessageStatus,
    },
}

impl DomainError {
    /// 创建校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
