//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 聊天/在线状态会话与 HTTP 历史接口，
//! 全部委托给应用层服务。

mod auth;
mod error;
mod protocol;
mod routes;
mod state;
mod ws_chat;
mod ws_presence;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
