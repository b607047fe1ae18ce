use async_trait::async_trait;
use domain::RoomName;
use thiserror::Error;

/// 每个房间历史缓存保留的最大条数。
pub const HISTORY_CACHE_LIMIT: usize = 50;

/// 缓存错误
///
/// 缓存只是优化而非事实来源，所有调用点都把这个错误
/// 记为警告后继续走持久层。
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

/// 房间历史缓存端口
///
/// 每个房间一条有界列表，最新的序列化消息在表头，
/// 读取方需要反转才能得到时间顺序。
#[async_trait]
pub trait HistoryCache: Send + Sync {
    /// 把序列化消息压到表头并裁剪到 [`HISTORY_CACHE_LIMIT`]。
    async fn push_front(&self, room: &RoomName, payload: String) -> Result<(), CacheError>;

    /// 读取整条列表，最新在前；不存在时返回空。
    async fn read_all(&self, room: &RoomName) -> Result<Vec<String>, CacheError>;

    /// 清空后按给定顺序（最新在前）重建列表。
    async fn rebuild(&self, room: &RoomName, newest_first: &[String]) -> Result<(), CacheError>;

    /// 删除整条列表，下次读取回源重建。
    async fn invalidate(&self, room: &RoomName) -> Result<(), CacheError>;
}

/// 内存实现（用于测试），支持模拟缓存不可用。
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryHistoryCache {
        lists: Mutex<HashMap<String, Vec<String>>>,
        unavailable: AtomicBool,
    }

    impl MemoryHistoryCache {
        pub fn new() -> Self {
            Self::default()
        }

        /// 模拟缓存故障：之后所有操作返回 `CacheError::Unavailable`。
        pub fn set_unavailable(&self, value: bool) {
            self.unavailable.store(value, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), CacheError> {
            if self.unavailable.load(Ordering::SeqCst) {
                Err(CacheError::Unavailable("simulated outage".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl HistoryCache for MemoryHistoryCache {
        async fn push_front(&self, room: &RoomName, payload: String) -> Result<(), CacheError> {
            self.check()?;
            let mut lists = self.lists.lock().await;
            let list = lists.entry(room.to_string()).or_default();
            list.insert(0, payload);
            list.truncate(HISTORY_CACHE_LIMIT);
            Ok(())
        }

        async fn read_all(&self, room: &RoomName) -> Result<Vec<String>, CacheError> {
            self.check()?;
            let lists = self.lists.lock().await;
            Ok(lists.get(room.as_str()).cloned().unwrap_or_default())
        }

        async fn rebuild(&self, room: &RoomName, newest_first: &[String]) -> Result<(), CacheError> {
            self.check()?;
            let mut lists = self.lists.lock().await;
            let mut list = newest_first.to_vec();
            list.truncate(HISTORY_CACHE_LIMIT);
            lists.insert(room.to_string(), list);
            Ok(())
        }

        async fn invalidate(&self, room: &RoomName) -> Result<(), CacheError> {
            self.check()?;
            self.lists.lock().await.remove(room.as_str());
            Ok(())
        }
    }
}
