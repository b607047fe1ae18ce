//! 主应用程序入口
//!
//! 组装持久层、缓存、广播与 Web 层，启动 Axum 服务。

use std::sync::Arc;

use application::{
    GroupBroadcaster, HistoryService, LocalGroupBroadcaster, MessagePipeline,
    MessagePipelineDependencies, PresenceTracker, PresenceTrackerDependencies,
    ReadReceiptCoordinator, ReadReceiptDependencies,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, PgMessageRepository, PgUserDirectory, RedisConnection, RedisHistoryCache,
    RedisPresenceStore,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    // 开发默认值过不了生产校验，只告警不拦启动
    if let Err(err) = config.validate() {
        tracing::warn!(error = %err, "configuration validation failed, continuing with development settings");
    }

    tracing::info!(
        database = %config.database.url.split('@').next_back().unwrap_or("unknown"),
        "connecting to database"
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let redis_conn = Arc::new(RedisConnection::new(config.redis.url.clone()));

    let message_repository = Arc::new(PgMessageRepository::new(pg_pool.clone()));
    let user_directory = Arc::new(PgUserDirectory::new(pg_pool));
    let history_cache = Arc::new(RedisHistoryCache::new(redis_conn.clone()));
    let presence_store = Arc::new(RedisPresenceStore::new(redis_conn));
    let broadcaster: Arc<dyn GroupBroadcaster> =
        Arc::new(LocalGroupBroadcaster::new(config.broadcast.capacity));

    let message_pipeline = Arc::new(MessagePipeline::new(MessagePipelineDependencies {
        message_repository: message_repository.clone(),
        history_cache: history_cache.clone(),
        user_directory: user_directory.clone(),
        broadcaster: broadcaster.clone(),
    }));
    let presence_tracker = Arc::new(PresenceTracker::new(PresenceTrackerDependencies {
        presence_store,
        user_directory: user_directory.clone(),
        broadcaster: broadcaster.clone(),
    }));
    // 唯一的房间活动消费者
    presence_tracker.clone().spawn_room_activity_worker();

    let read_receipts = Arc::new(ReadReceiptCoordinator::new(ReadReceiptDependencies {
        message_repository: message_repository.clone(),
        history_cache: history_cache.clone(),
        broadcaster: broadcaster.clone(),
    }));
    let history_service = Arc::new(HistoryService::new(
        message_repository,
        history_cache,
        user_directory,
    ));

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        message_pipeline,
        presence_tracker,
        read_receipts,
        history_service,
        broadcaster,
        jwt_service,
    );

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(%addr, "chatbox server started");
    axum::serve(listener, app).await?;

    Ok(())
}
