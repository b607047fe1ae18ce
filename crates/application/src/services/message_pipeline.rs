use std::sync::Arc;

use domain::{ChatMessage, MessageType, NewMessage, RoomName, UserRef};

use crate::{
    broadcaster::{GroupBroadcaster, GroupEvent, GroupName},
    cache::HistoryCache,
    directory::UserDirectory,
    error::ApplicationError,
    repository::MessageRepository,
};

/// 一次发送请求。
///
/// `is_dm` 的请求走直接消息路径，规范房间名由双方用户名推导，
/// 调用方传入的 `room_name` 只在房间消息路径下生效。
#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender: UserRef,
    pub room_name: Option<RoomName>,
    pub receiver: Option<String>,
    pub is_dm: bool,
    pub message: Option<String>,
    pub image_content: Option<String>,
    pub message_type: MessageType,
}

pub struct MessagePipelineDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub history_cache: Arc<dyn HistoryCache>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub broadcaster: Arc<dyn GroupBroadcaster>,
}

/// 消息管道：持久化 → 缓存 → 广播
///
/// 只有持久化失败会中断发送；缓存和广播都在持久化之后独立提交，
/// 失败时记日志放行（缓存可随时从持久层重建，广播失败只丢投递）。
pub struct MessagePipeline {
    deps: MessagePipelineDependencies,
}

impl MessagePipeline {
    pub fn new(deps: MessagePipelineDependencies) -> Self {
        Self { deps }
    }

    pub async fn send(&self, request: SendMessageRequest) -> Result<ChatMessage, ApplicationError> {
        let (room_name, receiver) = self.resolve_target(&request).await?;

        let new_message = NewMessage::new(
            request.sender,
            receiver,
            request.message,
            request.image_content,
            request.message_type,
            room_name,
        )?;

        // 持久化失败是终止性的：不写缓存、不广播
        let stored = self.deps.message_repository.create(new_message).await?;

        match serde_json::to_string(&stored) {
            Ok(payload) => {
                if let Err(err) = self
                    .deps
                    .history_cache
                    .push_front(&stored.room_name, payload)
                    .await
                {
                    tracing::warn!(
                        room = %stored.room_name,
                        message_id = %stored.id,
                        error = %err,
                        "history cache update failed, send continues"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(message_id = %stored.id, error = %err, "failed to serialize message for cache");
            }
        }

        let group = GroupName::chat(&stored.room_name);
        if let Err(err) = self
            .deps
            .broadcaster
            .send(&group, GroupEvent::ChatBroadcast(stored.clone()))
            .await
        {
            // 消息已落库，这里只是投递失败
            tracing::warn!(
                room = %stored.room_name,
                message_id = %stored.id,
                error = %err,
                "broadcast failed after persist"
            );
        }

        Ok(stored)
    }

    /// 判定 DM/房间消息并解析接收者。
    async fn resolve_target(
        &self,
        request: &SendMessageRequest,
    ) -> Result<(RoomName, Option<UserRef>), ApplicationError> {
        if request.is_dm || request.receiver.is_some() {
            let receiver_name = request.receiver.as_deref().ok_or_else(|| {
                ApplicationError::malformed("receiver is required for direct messages")
            })?;
            let receiver = self
                .deps
                .user_directory
                .find_by_username(receiver_name)
                .await
                .map_err(|err| ApplicationError::infrastructure(err.to_string()))?
                .ok_or_else(|| ApplicationError::ReceiverNotFound(receiver_name.to_owned()))?;
            let room = RoomName::direct(&request.sender.username, &receiver.username);
            return Ok((room, Some(receiver)));
        }

        let room = request
            .room_name
            .clone()
            .ok_or_else(|| ApplicationError::malformed("room_name or receiver is required"))?;
        Ok((room, None))
    }
}
