//! 私信中继核心领域模型
//!
//! 包含消息、在线状态等实体，以及存储层接口。

pub mod errors;
pub mod message;
pub mod repositories;
pub mod user_status;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use message::*;
pub use repositories::*;
pub use user_status::*;
pub use value_objects::*;
