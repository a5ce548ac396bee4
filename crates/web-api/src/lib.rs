//! Web API 层。
//!
//! 提供 Axum 路由：健康检查、历史消息与在线状态查询，以及接入连接中枢的 WebSocket 端点。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{AuthError, AuthUser, Claims, JwtService};
pub use config::JwtConfig;
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
