use std::sync::Arc;

use domain::{MessageId, RoomName, UserRef};

use crate::{
    broadcaster::{GroupBroadcaster, GroupEvent, GroupName},
    cache::HistoryCache,
    error::ApplicationError,
    repository::MessageRepository,
};

pub struct ReadReceiptDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub history_cache: Arc<dyn HistoryCache>,
    pub broadcaster: Arc<dyn GroupBroadcaster>,
}

/// 批量已读回执
///
/// 一次调用对应一条 UPDATE，只把 `receiver == reader AND is_read = false`
/// 的行翻为已读；广播的 id 集合精确等于本次变更的集合，
/// 没有变更就不广播。
pub struct ReadReceiptCoordinator {
    deps: ReadReceiptDependencies,
}

impl ReadReceiptCoordinator {
    pub fn new(deps: ReadReceiptDependencies) -> Self {
        Self { deps }
    }

    pub async fn mark_read(
        &self,
        reader: &UserRef,
        raw_ids: &[serde_json::Value],
        room: &RoomName,
    ) -> Result<Vec<MessageId>, ApplicationError> {
        let ids = Self::coerce_ids(raw_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let updated = self
            .deps
            .message_repository
            .mark_read(&ids, reader.id)
            .await?;
        if updated.is_empty() {
            return Ok(updated);
        }

        // 缓存里的快照已经过期，删掉让下次读取回源
        if let Err(err) = self.deps.history_cache.invalidate(room).await {
            tracing::warn!(room = %room, error = %err, "history cache invalidate failed after read receipts");
        }

        let group = GroupName::chat(room);
        if let Err(err) = self
            .deps
            .broadcaster
            .send(
                &group,
                GroupEvent::ReadReceiptsBroadcast {
                    room_name: room.clone(),
                    message_ids: updated.clone(),
                    reader_username: reader.username.clone(),
                },
            )
            .await
        {
            // 已读状态已落库，只是回执没送达
            tracing::warn!(room = %room, reader = %reader.username, error = %err, "read receipt broadcast failed");
        }

        Ok(updated)
    }

    /// 客户端 id 列表可能混着整数和数字字符串，非数字条目跳过并记警告。
    fn coerce_ids(raw_ids: &[serde_json::Value]) -> Vec<MessageId> {
        let mut ids = Vec::with_capacity(raw_ids.len());
        for raw in raw_ids {
            let parsed = match raw {
                serde_json::Value::Number(n) => n.as_i64(),
                serde_json::Value::String(s) => s.parse::<i64>().ok(),
                _ => None,
            };
            match parsed {
                Some(id) => ids.push(MessageId(id)),
                None => tracing::warn!(raw = %raw, "skipping non-numeric message id"),
            }
        }
        ids
    }
}
