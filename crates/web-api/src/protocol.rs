//! WebSocket 线上协议
//!
//! 进出方向都是 `type` 标签的封闭联合；入站解析失败不会断开会话，
//! 只记警告并丢弃该帧。

use domain::{ChatMessage, MessageId, MessageType, RoomName, UserRef};
use serde::{Deserialize, Serialize};

use application::{GroupEvent, RoomActivity};

/// 客户端发来的事件。
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    ChatMessage {
        message: Option<String>,
        image_content: Option<String>,
        #[serde(default)]
        msg_type: MessageType,
        receiver: Option<String>,
    },
    MarkReadBatch {
        message_ids: Vec<serde_json::Value>,
    },
}

/// 推送给客户端的事件。
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatMessage {
        #[serde(flatten)]
        message: ChatMessage,
    },
    MessagesMarkedAsRead {
        room_name: RoomName,
        message_ids: Vec<MessageId>,
        reader_username: String,
    },
    UserList {
        users: Vec<UserRef>,
    },
    DetailedRoomList {
        rooms: Vec<RoomActivity>,
    },
}

impl ServerEvent {
    /// 聊天会话关心的群组事件；在线状态事件在这里不可见。
    pub fn for_chat_session(event: GroupEvent) -> Option<ServerEvent> {
        match event {
            GroupEvent::ChatBroadcast(message) => Some(ServerEvent::ChatMessage { message }),
            GroupEvent::ReadReceiptsBroadcast {
                room_name,
                message_ids,
                reader_username,
            } => Some(ServerEvent::MessagesMarkedAsRead {
                room_name,
                message_ids,
                reader_username,
            }),
            GroupEvent::PresenceBroadcast(_) | GroupEvent::RoomActivityUpdate { .. } => None,
        }
    }

    /// 在线状态会话把一份快照拆成两帧推送。
    pub fn for_presence_session(event: GroupEvent) -> Vec<ServerEvent> {
        match event {
            GroupEvent::PresenceBroadcast(snapshot) => vec![
                ServerEvent::UserList {
                    users: snapshot.users,
                },
                ServerEvent::DetailedRoomList {
                    rooms: snapshot.rooms,
                },
            ],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_message_defaults_to_text_type() {
        let event: ClientEvent =
            serde_json::from_value(json!({"type": "chat_message", "message": "hi"})).unwrap();
        match event {
            ClientEvent::ChatMessage {
                message, msg_type, ..
            } => {
                assert_eq!(message.as_deref(), Some("hi"));
                assert_eq!(msg_type, MessageType::Text);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn mark_read_batch_accepts_mixed_id_types() {
        let event: ClientEvent = serde_json::from_value(
            json!({"type": "mark_read_batch", "message_ids": [1, "2", null]}),
        )
        .unwrap();
        match event {
            ClientEvent::MarkReadBatch { message_ids } => assert_eq!(message_ids.len(), 3),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_fails_to_parse() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({"type": "presence_ping"}));
        assert!(result.is_err());
    }

    #[test]
    fn chat_broadcast_flattens_the_message() {
        let message = ChatMessage {
            id: MessageId(1),
            sender: UserRef::new(1, "alice"),
            receiver: None,
            message: Some("hi".into()),
            image_content: None,
            message_type: MessageType::Text,
            room_name: RoomName::parse("general").unwrap(),
            is_dm: false,
            is_read: false,
            timestamp: chrono::Utc::now(),
        };
        let event = ServerEvent::for_chat_session(GroupEvent::ChatBroadcast(message)).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["room_name"], "general");
        assert_eq!(value["sender"]["username"], "alice");
    }

    #[test]
    fn presence_snapshot_becomes_two_frames() {
        let snapshot = application::PresenceSnapshot {
            users: vec![UserRef::new(1, "alice")],
            rooms: vec![RoomActivity {
                name: "general".into(),
                online_count: 1,
            }],
        };
        let frames = ServerEvent::for_presence_session(GroupEvent::PresenceBroadcast(snapshot));
        assert_eq!(frames.len(), 2);
        let first = serde_json::to_value(&frames[0]).unwrap();
        let second = serde_json::to_value(&frames[1]).unwrap();
        assert_eq!(first["type"], "user_list");
        assert_eq!(second["type"], "detailed_room_list");
    }
}
