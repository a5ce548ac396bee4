//! Repository接口定义
//!
//! 定义数据访问层的抽象接口，内层定义接口，外层实现接口。

pub mod message_repository;
pub mod status_repository;

pub use message_repository::MessageRepository;
pub use status_repository::StatusRepository;

#[cfg(feature = "testing")]
pub use message_repository::MockMessageRepository;
#[cfg(feature = "testing")]
pub use status_repository::MockStatusRepository;

use crate::errors::RepositoryError;

pub type RepositoryResult<T> = Result<T, RepositoryError>;
