use std::sync::Arc;

use domain::{RoomName, UserRef};
use tokio::task::JoinHandle;

use crate::{
    broadcaster::{
        ActivityKind, GroupBroadcaster, GroupEvent, GroupName, PresenceSnapshot, RoomActivity,
    },
    directory::UserDirectory,
    error::ApplicationError,
    presence_store::PresenceStore,
};

pub struct PresenceTrackerDependencies {
    pub presence_store: Arc<dyn PresenceStore>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub broadcaster: Arc<dyn GroupBroadcaster>,
}

/// 在线状态追踪
///
/// 会话的上下线直接改在线集合并推送快照；房间加入/离开只发
/// `RoomActivityUpdate` 事件，由唯一的后台任务消费并落到集合，
/// 避免每个在线会话各改一遍集合。
pub struct PresenceTracker {
    deps: PresenceTrackerDependencies,
}

impl PresenceTracker {
    pub fn new(deps: PresenceTrackerDependencies) -> Self {
        Self { deps }
    }

    pub async fn connect(&self, user: &UserRef) -> Result<(), ApplicationError> {
        self.deps.presence_store.add_online(&user.username).await?;
        self.broadcast_snapshot().await;
        Ok(())
    }

    pub async fn disconnect(&self, user: &UserRef) -> Result<(), ApplicationError> {
        self.deps
            .presence_store
            .remove_online(&user.username)
            .await?;
        self.broadcast_snapshot().await;
        Ok(())
    }

    /// 会话加入房间：只发事件，不直接改集合。
    pub async fn record_join(
        &self,
        room: &RoomName,
        username: &str,
    ) -> Result<(), ApplicationError> {
        self.send_activity(room, username, ActivityKind::Joined)
            .await
    }

    pub async fn record_leave(
        &self,
        room: &RoomName,
        username: &str,
    ) -> Result<(), ApplicationError> {
        self.send_activity(room, username, ActivityKind::Left).await
    }

    async fn send_activity(
        &self,
        room: &RoomName,
        username: &str,
        action: ActivityKind,
    ) -> Result<(), ApplicationError> {
        self.deps
            .broadcaster
            .send(
                &GroupName::presence(),
                GroupEvent::RoomActivityUpdate {
                    room_name: room.clone(),
                    username: username.to_owned(),
                    action,
                },
            )
            .await
            .map_err(|err| ApplicationError::infrastructure(err.to_string()))
    }

    /// 当前快照：在线用户全量解析加每个已知房间的活跃人数。
    ///
    /// 单个房间计数失败按 0 上报，不中断整个快照。
    pub async fn snapshot(&self) -> Result<PresenceSnapshot, ApplicationError> {
        let usernames = self.deps.presence_store.online_users().await?;
        let mut users = self
            .deps
            .user_directory
            .find_by_usernames(&usernames)
            .await
            .map_err(|err| ApplicationError::infrastructure(err.to_string()))?;
        users.sort_by(|a, b| a.username.cmp(&b.username));

        let mut room_names = self.deps.presence_store.known_rooms().await?;
        room_names.sort();

        let mut rooms = Vec::with_capacity(room_names.len());
        for name in room_names {
            let online_count = match self.deps.presence_store.room_member_count(&name).await {
                Ok(count) => count,
                Err(err) => {
                    tracing::warn!(room = %name, error = %err, "room member count failed, reporting 0");
                    0
                }
            };
            rooms.push(RoomActivity { name, online_count });
        }

        Ok(PresenceSnapshot { users, rooms })
    }

    async fn broadcast_snapshot(&self) {
        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "presence snapshot failed, skipping broadcast");
                return;
            }
        };
        if let Err(err) = self
            .deps
            .broadcaster
            .send(
                &GroupName::presence(),
                GroupEvent::PresenceBroadcast(snapshot),
            )
            .await
        {
            tracing::warn!(error = %err, "presence broadcast failed");
        }
    }

    /// 启动唯一的房间活动消费任务。
    ///
    /// 订阅 presence 群组，只处理 `RoomActivityUpdate`：
    /// 落集合后重发一份新快照。
    pub fn spawn_room_activity_worker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut subscription = match self.deps.broadcaster.join(GroupName::presence()).await {
                Ok(subscription) => subscription,
                Err(err) => {
                    tracing::error!(error = %err, "room activity worker failed to subscribe");
                    return;
                }
            };

            while let Some(event) = subscription.recv().await {
                let GroupEvent::RoomActivityUpdate {
                    room_name,
                    username,
                    action,
                } = event
                else {
                    continue;
                };

                let result = match action {
                    ActivityKind::Joined => {
                        self.deps
                            .presence_store
                            .add_room_member(&room_name, &username)
                            .await
                    }
                    ActivityKind::Left => {
                        self.deps
                            .presence_store
                            .remove_room_member(&room_name, &username)
                            .await
                    }
                };
                if let Err(err) = result {
                    tracing::warn!(room = %room_name, user = %username, error = %err, "room activity update failed");
                    continue;
                }

                self.broadcast_snapshot().await;
            }
        })
    }
}
