use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;

use application::{ApplicationError, PresenceStore};
use domain::RoomName;

use super::connection::RedisConnection;

const ONLINE_USERS_KEY: &str = "online_users";
const KNOWN_ROOMS_KEY: &str = "available_public_rooms";

fn room_members_key(room: &str) -> String {
    format!("room:{room}:active_users")
}

fn map_redis_err(err: redis::RedisError) -> ApplicationError {
    ApplicationError::infrastructure(err.to_string())
}

/// Redis 在线状态集合
///
/// 集合操作天然折叠重复成员，同一用户的多条连接只算一个。
/// `available_public_rooms` 只增不减，离开房间不会把房间摘掉。
#[derive(Clone)]
pub struct RedisPresenceStore {
    conn: Arc<RedisConnection>,
}

impl RedisPresenceStore {
    pub fn new(conn: Arc<RedisConnection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn add_online(&self, username: &str) -> Result<(), ApplicationError> {
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        conn.sadd::<_, _, ()>(ONLINE_USERS_KEY, username)
            .await
            .map_err(map_redis_err)
    }

    async fn remove_online(&self, username: &str) -> Result<(), ApplicationError> {
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        conn.srem::<_, _, ()>(ONLINE_USERS_KEY, username)
            .await
            .map_err(map_redis_err)
    }

    async fn online_users(&self) -> Result<Vec<String>, ApplicationError> {
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        conn.smembers(ONLINE_USERS_KEY).await.map_err(map_redis_err)
    }

    async fn add_room_member(
        &self,
        room: &RoomName,
        username: &str,
    ) -> Result<(), ApplicationError> {
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        redis::pipe()
            .atomic()
            .sadd(room_members_key(room.as_str()), username)
            .ignore()
            .sadd(KNOWN_ROOMS_KEY, room.as_str())
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    async fn remove_room_member(
        &self,
        room: &RoomName,
        username: &str,
    ) -> Result<(), ApplicationError> {
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        conn.srem::<_, _, ()>(room_members_key(room.as_str()), username)
            .await
            .map_err(map_redis_err)
    }

    async fn known_rooms(&self) -> Result<Vec<String>, ApplicationError> {
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        conn.smembers(KNOWN_ROOMS_KEY).await.map_err(map_redis_err)
    }

    async fn room_member_count(&self, room: &str) -> Result<u64, ApplicationError> {
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        conn.scard(room_members_key(room)).await.map_err(map_redis_err)
    }
}
