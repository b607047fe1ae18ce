use async_trait::async_trait;
use domain::RoomName;

use crate::error::ApplicationError;

/// 在线状态集合端口
///
/// 三组集合都放在共享 KV 存储里：`online_users`、
/// `room:{room}:active_users` 和 `available_public_rooms`。
/// 所有变更都是单次往返的原子集合操作，不依赖进程内锁。
/// 集合语义：同一身份的多条连接折叠为一个成员（见 DESIGN.md）。
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn add_online(&self, username: &str) -> Result<(), ApplicationError>;
    async fn remove_online(&self, username: &str) -> Result<(), ApplicationError>;
    async fn online_users(&self) -> Result<Vec<String>, ApplicationError>;

    /// 把用户加入房间集合，同时把房间登记到已知房间集合。
    async fn add_room_member(&self, room: &RoomName, username: &str)
        -> Result<(), ApplicationError>;
    async fn remove_room_member(
        &self,
        room: &RoomName,
        username: &str,
    ) -> Result<(), ApplicationError>;

    /// 所有曾经有人加入过的房间；离开不会从这里移除。
    async fn known_rooms(&self) -> Result<Vec<String>, ApplicationError>;
    async fn room_member_count(&self, room: &str) -> Result<u64, ApplicationError>;
}

/// 内存实现（用于测试）。
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemoryPresenceStore {
        online: RwLock<HashSet<String>>,
        room_members: RwLock<HashMap<String, HashSet<String>>>,
        known_rooms: RwLock<HashSet<String>>,
        counts_unavailable: AtomicBool,
    }

    impl MemoryPresenceStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// 模拟按房间计数查询失败。
        pub fn set_counts_unavailable(&self, value: bool) {
            self.counts_unavailable.store(value, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PresenceStore for MemoryPresenceStore {
        async fn add_online(&self, username: &str) -> Result<(), ApplicationError> {
            self.online.write().await.insert(username.to_owned());
            Ok(())
        }

        async fn remove_online(&self, username: &str) -> Result<(), ApplicationError> {
            self.online.write().await.remove(username);
            Ok(())
        }

        async fn online_users(&self) -> Result<Vec<String>, ApplicationError> {
            Ok(self.online.read().await.iter().cloned().collect())
        }

        async fn add_room_member(
            &self,
            room: &RoomName,
            username: &str,
        ) -> Result<(), ApplicationError> {
            self.known_rooms.write().await.insert(room.to_string());
            self.room_members
                .write()
                .await
                .entry(room.to_string())
                .or_default()
                .insert(username.to_owned());
            Ok(())
        }

        async fn remove_room_member(
            &self,
            room: &RoomName,
            username: &str,
        ) -> Result<(), ApplicationError> {
            if let Some(members) = self.room_members.write().await.get_mut(room.as_str()) {
                members.remove(username);
            }
            Ok(())
        }

        async fn known_rooms(&self) -> Result<Vec<String>, ApplicationError> {
            Ok(self.known_rooms.read().await.iter().cloned().collect())
        }

        async fn room_member_count(&self, room: &str) -> Result<u64, ApplicationError> {
            if self.counts_unavailable.load(Ordering::SeqCst) {
                return Err(ApplicationError::infrastructure("simulated count failure"));
            }
            Ok(self
                .room_members
                .read()
                .await
                .get(room)
                .map(|members| members.len() as u64)
                .unwrap_or(0))
        }
    }
}
