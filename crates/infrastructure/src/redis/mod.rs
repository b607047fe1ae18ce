//! Redis 适配器
//!
//! 历史缓存用有界列表，在线状态用共享集合，
//! 都通过单个多路复用连接访问。

pub mod connection;
pub mod history_cache;
pub mod presence_store;

pub use connection::{create_redis_connection, RedisConnection};
pub use history_cache::RedisHistoryCache;
pub use presence_store::RedisPresenceStore;
