//! 聊天消息投递系统核心领域模型
//!
//! 包含消息、用户引用、房间名等核心类型，以及直接消息房间的规范化规则。

pub mod errors;
pub mod message;
pub mod room;
pub mod user;

pub use errors::*;
pub use message::*;
pub use room::*;
pub use user::*;
