use async_trait::async_trait;
use domain::{ChatMessage, MessageId, RoomName, UserRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// 广播群组名。
///
/// 每个房间对应一个聊天群组 `chat_{room}`，在线状态使用单例群组 `presence`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    pub fn chat(room: &RoomName) -> Self {
        Self(format!("chat_{room}"))
    }

    pub fn presence() -> Self {
        Self("presence".to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Joined,
    Left,
}

/// 在线状态快照：完整的在线用户列表加每个已知房间的活跃人数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub users: Vec<UserRef>,
    pub rooms: Vec<RoomActivity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomActivity {
    pub name: String,
    pub online_count: u64,
}

/// 群组内部事件的封闭联合
///
/// 穷举匹配取代开放的字符串分发，未处理的分支在编译期暴露。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupEvent {
    /// 新消息广播给房间群组，载荷就是持久化后的完整消息快照。
    ChatBroadcast(ChatMessage),
    /// 批量已读确认广播给房间群组。
    ReadReceiptsBroadcast {
        room_name: RoomName,
        message_ids: Vec<MessageId>,
        reader_username: String,
    },
    /// 在线状态快照推送给 presence 群组。
    PresenceBroadcast(PresenceSnapshot),
    /// 会话加入/离开房间的通知，由 PresenceTracker 的后台任务消费。
    RoomActivityUpdate {
        room_name: RoomName,
        username: String,
        action: ActivityKind,
    },
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 群组广播器端口
///
/// 核心从不持有其他会话的引用，只通过这个接口投递事件；
/// 离开群组即丢弃 `join` 返回的订阅句柄。
#[async_trait]
pub trait GroupBroadcaster: Send + Sync {
    async fn join(&self, group: GroupName) -> Result<GroupSubscription, BroadcastError>;
    async fn send(&self, group: &GroupName, event: GroupEvent) -> Result<(), BroadcastError>;
}

/// 单进程内的群组广播器，基于 tokio broadcast channel。
#[derive(Clone)]
pub struct LocalGroupBroadcaster {
    sender: broadcast::Sender<(GroupName, GroupEvent)>,
}

impl LocalGroupBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for LocalGroupBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl GroupBroadcaster for LocalGroupBroadcaster {
    async fn join(&self, group: GroupName) -> Result<GroupSubscription, BroadcastError> {
        Ok(GroupSubscription {
            receiver: self.sender.subscribe(),
            group,
        })
    }

    async fn send(&self, group: &GroupName, event: GroupEvent) -> Result<(), BroadcastError> {
        // send 只在没有任何订阅者时报错，这不算投递失败
        let _ = self.sender.send((group.clone(), event));
        Ok(())
    }
}

/// 单个群组的事件流。
pub struct GroupSubscription {
    receiver: broadcast::Receiver<(GroupName, GroupEvent)>,
    group: GroupName,
}

impl GroupSubscription {
    pub async fn recv(&mut self) -> Option<GroupEvent> {
        loop {
            match self.receiver.recv().await {
                Ok((group, event)) if group == self.group => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(group = %self.group, skipped, "group subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
