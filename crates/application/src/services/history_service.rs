use std::sync::Arc;

use domain::{ChatMessage, RoomName, UserRef};
use serde::Serialize;

use crate::{
    cache::{HistoryCache, HISTORY_CACHE_LIMIT},
    directory::UserDirectory,
    error::ApplicationError,
    repository::MessageRepository,
};

/// 未指定时的每页条数。
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// 历史查询目标：公开房间按名字查，私聊按对端用户 id 查，
/// 房间名由请求者和对端的用户名推导。
#[derive(Debug, Clone)]
pub enum HistoryTarget {
    Room(RoomName),
    Direct { receiver_id: i64 },
}

#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub target: HistoryTarget,
    /// 从 1 开始的页号。
    pub page: u32,
    pub page_size: u32,
}

impl HistoryQuery {
    pub fn new(target: HistoryTarget) -> Self {
        Self {
            target,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// 一页历史，页内时间正序。`count` 是整个历史窗口的条数，
/// `next`/`previous` 是页号。
#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub results: Vec<ChatMessage>,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub count: usize,
}

pub struct HistoryService {
    message_repository: Arc<dyn MessageRepository>,
    history_cache: Arc<dyn HistoryCache>,
    user_directory: Arc<dyn UserDirectory>,
}

/// 历史读取：cache-aside
///
/// 先读缓存，未命中或内容损坏就回源持久层并重建缓存；
/// 缓存侧任何失败都只降级为回源，不向调用方冒泡。
/// 历史窗口与缓存同界：最新 [`HISTORY_CACHE_LIMIT`] 条。
impl HistoryService {
    pub fn new(
        message_repository: Arc<dyn MessageRepository>,
        history_cache: Arc<dyn HistoryCache>,
        user_directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            message_repository,
            history_cache,
            user_directory,
        }
    }

    pub async fn query(
        &self,
        requester: &UserRef,
        query: HistoryQuery,
    ) -> Result<HistoryPage, ApplicationError> {
        let room = self.resolve_room(requester, &query.target).await?;
        let window = self.room_history(&room).await?;

        let page = query.page.max(1);
        let page_size = query.page_size.max(1) as usize;
        let start = (page as usize - 1) * page_size;
        let results: Vec<ChatMessage> = window.iter().skip(start).take(page_size).cloned().collect();

        let has_more = start + results.len() < window.len();
        Ok(HistoryPage {
            next: has_more.then_some(page + 1),
            previous: (page > 1).then_some(page - 1),
            count: window.len(),
            results,
        })
    }

    /// 房间完整历史窗口，时间正序，也给会话初始回放用。
    pub async fn room_history(&self, room: &RoomName) -> Result<Vec<ChatMessage>, ApplicationError> {
        let mut window = self.load_window(room).await?;
        window.reverse();
        Ok(window)
    }

    async fn resolve_room(
        &self,
        requester: &UserRef,
        target: &HistoryTarget,
    ) -> Result<RoomName, ApplicationError> {
        match target {
            HistoryTarget::Room(room) => Ok(room.clone()),
            HistoryTarget::Direct { receiver_id } => {
                let receiver = self
                    .user_directory
                    .find_by_id(*receiver_id)
                    .await
                    .map_err(|err| ApplicationError::infrastructure(err.to_string()))?
                    .ok_or_else(|| {
                        ApplicationError::ReceiverNotFound(receiver_id.to_string())
                    })?;
                Ok(RoomName::direct(&requester.username, &receiver.username))
            }
        }
    }

    /// 历史窗口，最新在前。
    async fn load_window(&self, room: &RoomName) -> Result<Vec<ChatMessage>, ApplicationError> {
        match self.history_cache.read_all(room).await {
            Ok(cached) if !cached.is_empty() => {
                match cached
                    .iter()
                    .map(|raw| serde_json::from_str::<ChatMessage>(raw))
                    .collect::<Result<Vec<_>, _>>()
                {
                    Ok(messages) => return Ok(messages),
                    Err(err) => {
                        // 损坏的缓存条目：整条列表作废，回源重建
                        tracing::warn!(room = %room, error = %err, "corrupt history cache entry, falling back to repository");
                        if let Err(err) = self.history_cache.invalidate(room).await {
                            tracing::warn!(room = %room, error = %err, "history cache invalidate failed");
                        }
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(room = %room, error = %err, "history cache read failed, falling back to repository");
            }
        }

        let messages = self
            .message_repository
            .list_recent(room, HISTORY_CACHE_LIMIT as u32)
            .await?;

        if !messages.is_empty() {
            match messages
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()
            {
                Ok(payloads) => {
                    if let Err(err) = self.history_cache.rebuild(room, &payloads).await {
                        tracing::warn!(room = %room, error = %err, "history cache rebuild failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(room = %room, error = %err, "failed to serialize history for cache");
                }
            }
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryHistoryCache;
    use crate::directory::memory::MemoryUserDirectory;
    use crate::repository::memory::MemoryMessageRepository;
    use domain::{MessageType, NewMessage};

    struct Fixture {
        service: HistoryService,
        repository: Arc<MemoryMessageRepository>,
        cache: Arc<MemoryHistoryCache>,
    }

    async fn fixture() -> Fixture {
        let repository = Arc::new(MemoryMessageRepository::new());
        let cache = Arc::new(MemoryHistoryCache::new());
        let directory = Arc::new(MemoryUserDirectory::new());
        directory.insert(UserRef::new(1, "alice")).await;
        directory.insert(UserRef::new(2, "bob")).await;
        let service = HistoryService::new(repository.clone(), cache.clone(), directory);
        Fixture {
            service,
            repository,
            cache,
        }
    }

    async fn seed(fx: &Fixture, room: &RoomName, count: usize) {
        for i in 0..count {
            let message = NewMessage::new(
                UserRef::new(1, "alice"),
                None,
                Some(format!("msg-{i}")),
                None,
                MessageType::Text,
                room.clone(),
            )
            .unwrap();
            fx.repository.create(message).await.unwrap();
        }
    }

    fn room_query(room: &RoomName, page: u32) -> HistoryQuery {
        HistoryQuery {
            page,
            ..HistoryQuery::new(HistoryTarget::Room(room.clone()))
        }
    }

    #[tokio::test]
    async fn cold_cache_falls_back_to_repository_and_rebuilds() {
        let fx = fixture().await;
        let room = RoomName::parse("general").unwrap();
        seed(&fx, &room, 3).await;

        let alice = UserRef::new(1, "alice");
        let page = fx.service.query(&alice, room_query(&room, 1)).await.unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(page.results[0].message.as_deref(), Some("msg-0"));
        assert_eq!(page.results[2].message.as_deref(), Some("msg-2"));

        // 回源后缓存被重建，最新在表头
        let cached = fx.cache.read_all(&room).await.unwrap();
        assert_eq!(cached.len(), 3);
        let head: ChatMessage = serde_json::from_str(&cached[0]).unwrap();
        assert_eq!(head.message.as_deref(), Some("msg-2"));
    }

    #[tokio::test]
    async fn warm_cache_is_served_without_touching_the_repository() {
        let fx = fixture().await;
        let room = RoomName::parse("general").unwrap();

        // 只在缓存里放一条持久层没有的消息
        let message = ChatMessage {
            id: domain::MessageId(99),
            sender: UserRef::new(1, "alice"),
            receiver: None,
            message: Some("cache only".into()),
            image_content: None,
            message_type: MessageType::Text,
            room_name: room.clone(),
            is_dm: false,
            is_read: false,
            timestamp: chrono::Utc::now(),
        };
        fx.cache
            .push_front(&room, serde_json::to_string(&message).unwrap())
            .await
            .unwrap();

        let alice = UserRef::new(1, "alice");
        let page = fx.service.query(&alice, room_query(&room, 1)).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].message.as_deref(), Some("cache only"));
        assert_eq!(fx.repository.row_count().await, 0);
    }

    #[tokio::test]
    async fn corrupt_cache_entry_triggers_repository_fallback_and_repair() {
        let fx = fixture().await;
        let room = RoomName::parse("general").unwrap();
        seed(&fx, &room, 2).await;
        fx.cache
            .push_front(&room, "{not json".into())
            .await
            .unwrap();

        let alice = UserRef::new(1, "alice");
        let page = fx.service.query(&alice, room_query(&room, 1)).await.unwrap();
        assert_eq!(page.count, 2);

        let repaired = fx.cache.read_all(&room).await.unwrap();
        assert!(repaired
            .iter()
            .all(|raw| serde_json::from_str::<ChatMessage>(raw).is_ok()));
    }

    #[tokio::test]
    async fn room_without_messages_yields_an_empty_page() {
        let fx = fixture().await;
        let room = RoomName::parse("deserted").unwrap();

        let alice = UserRef::new(1, "alice");
        let page = fx.service.query(&alice, room_query(&room, 1)).await.unwrap();
        assert_eq!(page.count, 0);
        assert!(page.results.is_empty());
        assert_eq!(page.next, None);
        assert_eq!(page.previous, None);
    }

    #[tokio::test]
    async fn cache_outage_degrades_to_repository() {
        let fx = fixture().await;
        let room = RoomName::parse("general").unwrap();
        seed(&fx, &room, 1).await;
        fx.cache.set_unavailable(true);

        let alice = UserRef::new(1, "alice");
        let page = fx.service.query(&alice, room_query(&room, 1)).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].message.as_deref(), Some("msg-0"));
    }

    #[tokio::test]
    async fn pages_walk_the_window_chronologically() {
        let fx = fixture().await;
        let room = RoomName::parse("general").unwrap();
        seed(&fx, &room, 60).await;
        let alice = UserRef::new(1, "alice");

        // 窗口只覆盖最新 50 条：msg-10 .. msg-59
        let first = fx.service.query(&alice, room_query(&room, 1)).await.unwrap();
        assert_eq!(first.count, HISTORY_CACHE_LIMIT);
        assert_eq!(first.results.len(), DEFAULT_PAGE_SIZE as usize);
        assert_eq!(first.results[0].message.as_deref(), Some("msg-10"));
        assert_eq!(first.next, Some(2));
        assert_eq!(first.previous, None);

        let last = fx.service.query(&alice, room_query(&room, 3)).await.unwrap();
        assert_eq!(last.results.len(), 10);
        assert_eq!(last.results.last().unwrap().message.as_deref(), Some("msg-59"));
        assert_eq!(last.next, None);
        assert_eq!(last.previous, Some(2));
    }

    #[tokio::test]
    async fn custom_page_size_is_honored() {
        let fx = fixture().await;
        let room = RoomName::parse("general").unwrap();
        seed(&fx, &room, 5).await;
        let alice = UserRef::new(1, "alice");

        let query = HistoryQuery {
            page: 2,
            page_size: 2,
            ..HistoryQuery::new(HistoryTarget::Room(room.clone()))
        };
        let page = fx.service.query(&alice, query).await.unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].message.as_deref(), Some("msg-2"));
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));
    }

    #[tokio::test]
    async fn direct_target_resolves_the_canonical_room() {
        let fx = fixture().await;
        let dm = RoomName::direct("alice", "bob");
        seed(&fx, &dm, 1).await;

        let alice = UserRef::new(1, "alice");
        let query = HistoryQuery::new(HistoryTarget::Direct { receiver_id: 2 });
        let page = fx.service.query(&alice, query).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].room_name, dm);
    }

    #[tokio::test]
    async fn unknown_direct_receiver_is_an_error() {
        let fx = fixture().await;
        let alice = UserRef::new(1, "alice");
        let query = HistoryQuery::new(HistoryTarget::Direct { receiver_id: 404 });
        let err = fx.service.query(&alice, query).await.unwrap_err();
        assert!(matches!(err, ApplicationError::ReceiverNotFound(_)));
    }
}
