use std::time::Duration;

use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 惰性建立的共享 Redis 连接
///
/// 首次 `acquire` 时带超时建连，之后复用同一个多路复用连接；
/// `ConnectionManager` 自身负责断线重连。
pub struct RedisConnection {
    url: String,
    conn: Mutex<Option<ConnectionManager>>,
}

impl RedisConnection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            conn: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) -> Result<ConnectionManager, redis::RedisError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let client = redis::Client::open(self.url.as_str())?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                redis::RedisError::from((redis::ErrorKind::IoError, "redis connect timeout"))
            })??;

        *guard = Some(conn.clone());
        tracing::info!(url = %self.url, "redis connection established");
        Ok(conn)
    }
}

/// 直接建连，给只需要一次性连接的调用方用。
pub async fn create_redis_connection(url: &str) -> Result<ConnectionManager, redis::RedisError> {
    RedisConnection::new(url).acquire().await
}
