//! 基础设施层：PostgreSQL 持久化与 Redis 适配器

pub mod redis;
pub mod repository;

pub use redis::{create_redis_connection, RedisConnection, RedisHistoryCache, RedisPresenceStore};
pub use repository::{create_pg_pool, PgMessageRepository, PgUserDirectory};
