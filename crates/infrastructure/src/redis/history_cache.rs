use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;

use application::{CacheError, HistoryCache, HISTORY_CACHE_LIMIT};
use domain::RoomName;

use super::connection::RedisConnection;

fn history_key(room: &RoomName) -> String {
    format!("chat_history:{room}")
}

fn map_redis_err(err: redis::RedisError) -> CacheError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        CacheError::Unavailable(err.to_string())
    } else {
        CacheError::Operation(err.to_string())
    }
}

/// Redis 历史缓存
///
/// 每个房间一条列表 `chat_history:{room}`，LPUSH 压表头后
/// LTRIM 保留最新 [`HISTORY_CACHE_LIMIT`] 条，两步在一个
/// 原子管道里提交。
#[derive(Clone)]
pub struct RedisHistoryCache {
    conn: Arc<RedisConnection>,
}

impl RedisHistoryCache {
    pub fn new(conn: Arc<RedisConnection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl HistoryCache for RedisHistoryCache {
    async fn push_front(&self, room: &RoomName, payload: String) -> Result<(), CacheError> {
        let key = history_key(room);
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        redis::pipe()
            .atomic()
            .lpush(&key, payload)
            .ignore()
            .ltrim(&key, 0, HISTORY_CACHE_LIMIT as isize - 1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    async fn read_all(&self, room: &RoomName) -> Result<Vec<String>, CacheError> {
        let key = history_key(room);
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        conn.lrange(&key, 0, -1).await.map_err(map_redis_err)
    }

    async fn rebuild(&self, room: &RoomName, newest_first: &[String]) -> Result<(), CacheError> {
        let key = history_key(room);
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        // RPUSH 按给定顺序追加，最新的留在表头
        for payload in newest_first.iter().take(HISTORY_CACHE_LIMIT) {
            pipe.rpush(&key, payload).ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    async fn invalidate(&self, room: &RoomName) -> Result<(), CacheError> {
        let key = history_key(room);
        let mut conn = self.conn.acquire().await.map_err(map_redis_err)?;
        conn.del::<_, ()>(&key).await.map_err(map_redis_err)
    }
}
