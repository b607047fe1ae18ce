use async_trait::async_trait;
use domain::{ChatMessage, MessageId, NewMessage, RepositoryError, RoomName};

/// 消息持久层端口
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 保存消息，id 和时间戳由存储分配；写入顺序是房间内广播顺序的权威。
    async fn create(&self, message: NewMessage) -> Result<ChatMessage, RepositoryError>;

    /// 房间最近的消息，最新在前。
    async fn list_recent(
        &self,
        room: &RoomName,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// 原子地把匹配 `receiver == reader AND is_read = false` 的行翻为已读，
    /// 精确返回发生变更的 id 集合（重复标记返回空集）。
    async fn mark_read(
        &self,
        ids: &[MessageId],
        reader_id: i64,
    ) -> Result<Vec<MessageId>, RepositoryError>;
}

/// 内存实现（用于测试），id 单调递增。
pub mod memory {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemoryMessageRepository {
        rows: RwLock<Vec<ChatMessage>>,
        next_id: AtomicI64,
    }

    impl MemoryMessageRepository {
        pub fn new() -> Self {
            Self {
                rows: RwLock::new(Vec::new()),
                next_id: AtomicI64::new(1),
            }
        }

        pub async fn row_count(&self) -> usize {
            self.rows.read().await.len()
        }

        pub async fn find(&self, id: MessageId) -> Option<ChatMessage> {
            self.rows.read().await.iter().find(|m| m.id == id).cloned()
        }
    }

    #[async_trait]
    impl MessageRepository for MemoryMessageRepository {
        async fn create(&self, message: NewMessage) -> Result<ChatMessage, RepositoryError> {
            let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
            let stored = ChatMessage {
                id,
                sender: message.sender,
                receiver: message.receiver,
                message: message.message,
                image_content: message.image_content,
                message_type: message.message_type,
                room_name: message.room_name,
                is_dm: message.is_dm,
                is_read: false,
                timestamp: Utc::now(),
            };
            self.rows.write().await.push(stored.clone());
            Ok(stored)
        }

        async fn list_recent(
            &self,
            room: &RoomName,
            limit: u32,
        ) -> Result<Vec<ChatMessage>, RepositoryError> {
            let rows = self.rows.read().await;
            let mut recent: Vec<ChatMessage> = rows
                .iter()
                .filter(|m| &m.room_name == room)
                .cloned()
                .collect();
            recent.sort_by(|a, b| b.id.cmp(&a.id));
            recent.truncate(limit as usize);
            Ok(recent)
        }

        async fn mark_read(
            &self,
            ids: &[MessageId],
            reader_id: i64,
        ) -> Result<Vec<MessageId>, RepositoryError> {
            let mut rows = self.rows.write().await;
            let mut updated = Vec::new();
            for row in rows.iter_mut() {
                if ids.contains(&row.id)
                    && !row.is_read
                    && row.receiver.as_ref().is_some_and(|r| r.id == reader_id)
                {
                    row.is_read = true;
                    updated.push(row.id);
                }
            }
            Ok(updated)
        }
    }
}
