use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::room::RoomName;
use crate::user::UserRef;

/// 消息唯一标识，由持久层单调分配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
}

/// 已持久化的聊天消息。
///
/// 创建后唯一允许的变更是 `is_read` 从 false 翻转为 true。
/// 序列化字段集与广播载荷一致：广播转发的就是这份快照。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: UserRef,
    pub receiver: Option<UserRef>,
    pub message: Option<String>,
    pub image_content: Option<String>,
    pub message_type: MessageType,
    pub room_name: RoomName,
    pub is_dm: bool,
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
}

/// 待持久化的消息（id 和时间戳由持久层分配）。
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: UserRef,
    pub receiver: Option<UserRef>,
    pub message: Option<String>,
    pub image_content: Option<String>,
    pub message_type: MessageType,
    pub room_name: RoomName,
    pub is_dm: bool,
}

impl NewMessage {
    /// 校验不变量：`receiver` 存在当且仅当 `is_dm`，且正文不能两者皆空。
    pub fn new(
        sender: UserRef,
        receiver: Option<UserRef>,
        message: Option<String>,
        image_content: Option<String>,
        message_type: MessageType,
        room_name: RoomName,
    ) -> Result<Self, DomainError> {
        let is_dm = receiver.is_some();
        let has_text = message.as_deref().is_some_and(|m| !m.trim().is_empty());
        let has_image = image_content.as_deref().is_some_and(|c| !c.is_empty());
        if !has_text && !has_image {
            return Err(DomainError::invalid_argument(
                "message",
                "either message or image_content is required",
            ));
        }
        Ok(Self {
            sender,
            receiver,
            message,
            image_content,
            message_type,
            room_name,
            is_dm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> UserRef {
        UserRef::new(1, "alice")
    }

    #[test]
    fn new_message_requires_some_body() {
        let room = RoomName::parse("general").unwrap();
        let err = NewMessage::new(sender(), None, None, None, MessageType::Text, room);
        assert!(err.is_err());
    }

    #[test]
    fn dm_flag_follows_receiver() {
        let receiver = UserRef::new(2, "bob");
        let room = RoomName::direct("alice", "bob");
        let msg = NewMessage::new(
            sender(),
            Some(receiver),
            Some("hi".into()),
            None,
            MessageType::Text,
            room,
        )
        .unwrap();
        assert!(msg.is_dm);

        let room = RoomName::parse("general").unwrap();
        let msg = NewMessage::new(sender(), None, Some("hi".into()), None, MessageType::Text, room)
            .unwrap();
        assert!(!msg.is_dm);
    }
}
