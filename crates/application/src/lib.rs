//! 应用层：端口定义与核心服务
//!
//! 端口（trait）抽象持久化、缓存、在线状态集合、用户目录和群组广播；
//! 服务实现消息管道、在线状态跟踪、已读回执和历史查询。

pub mod broadcaster;
pub mod cache;
pub mod directory;
pub mod error;
pub mod presence_store;
pub mod repository;
pub mod services;

pub use broadcaster::{
    ActivityKind, BroadcastError, GroupBroadcaster, GroupEvent, GroupName, GroupSubscription,
    LocalGroupBroadcaster, PresenceSnapshot, RoomActivity,
};
pub use cache::{CacheError, HistoryCache, HISTORY_CACHE_LIMIT};
pub use directory::UserDirectory;
pub use error::ApplicationError;
pub use presence_store::PresenceStore;
pub use repository::MessageRepository;
pub use services::{
    HistoryPage, HistoryQuery, HistoryService, HistoryTarget, MessagePipeline,
    MessagePipelineDependencies, PresenceTracker, PresenceTrackerDependencies,
    ReadReceiptCoordinator, ReadReceiptDependencies, SendMessageRequest, DEFAULT_PAGE_SIZE,
};
