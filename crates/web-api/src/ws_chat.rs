use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message as WsMessage, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use application::{GroupName, SendMessageRequest};
use domain::{RoomName, UserRef};

use crate::{
    protocol::{ClientEvent, ServerEvent},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct TokenQuery {
    pub token: Option<String>,
}

/// 认证失败不报 HTTP 错误：先完成升级，再发关闭帧干净收场。
pub(crate) async fn close_unauthenticated(mut socket: WebSocket) {
    let _ = socket
        .send(WsMessage::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "authentication failed".into(),
        })))
        .await;
}

pub(crate) async fn chat_upgrade(
    State(state): State<AppState>,
    Path(room_name): Path<String>,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_name, query.token))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    room_name: String,
    token: Option<String>,
) {
    let user = match token.as_deref().map(|t| state.jwt_service.verify_token(t)) {
        Some(Ok(user)) => user,
        _ => {
            tracing::warn!(room = %room_name, "chat session rejected: missing or invalid token");
            close_unauthenticated(socket).await;
            return;
        }
    };
    let room = match RoomName::parse(room_name) {
        Ok(room) => room,
        Err(err) => {
            tracing::warn!(user = %user.username, error = %err, "chat session rejected: bad room name");
            close_unauthenticated(socket).await;
            return;
        }
    };

    ChatSession {
        socket,
        state,
        user,
        room,
    }
    .run()
    .await;
}

/// WebSocket 写操作命令，统一串行化对 sender 的写。
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

/// 单个聊天会话
///
/// 入群、转发、收发与清理都在这里；清理在 `select!` 之后执行，
/// 无论哪一侧先结束都会跑到。
struct ChatSession {
    socket: WebSocket,
    state: AppState,
    user: UserRef,
    room: RoomName,
}

impl ChatSession {
    async fn run(self) {
        let Self {
            socket,
            state,
            user,
            room,
        } = self;

        let mut subscription = match state.broadcaster.join(GroupName::chat(&room)).await {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::error!(user = %user.username, room = %room, error = %err, "failed to join chat group");
                return;
            }
        };

        // 私聊房间不进公共房间列表
        if !room.is_dm() {
            if let Err(err) = state.presence_tracker.record_join(&room, &user.username).await {
                tracing::warn!(user = %user.username, room = %room, error = %err, "failed to record room join");
            }
        }
        tracing::info!(user = %user.username, room = %room, "chat session established");

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：mpsc 命令与群组事件都经由这里写出
        let mut send_task = {
            let cmd_tx_for_events = cmd_tx.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(cmd) = cmd_rx.recv() => {
                            let result = match cmd {
                                WsCommand::SendText(text) => sender.send(WsMessage::Text(text.into())).await,
                                WsCommand::SendPong(data) => sender.send(WsMessage::Pong(data.into())).await,
                            };
                            if result.is_err() {
                                break;
                            }
                        }
                        event = subscription.recv() => {
                            let Some(event) = event else { break };
                            let Some(server_event) = ServerEvent::for_chat_session(event) else { continue };
                            match serde_json::to_string(&server_event) {
                                Ok(json) => {
                                    if cmd_tx_for_events.send(WsCommand::SendText(json)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(err) => {
                                    tracing::warn!(error = %err, "failed to serialize outbound event");
                                }
                            }
                        }
                    }
                }
            })
        };

        // 接收任务：客户端帧驱动消息管道和已读回执
        let mut recv_task = {
            let state = state.clone();
            let user = user.clone();
            let room = room.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    match message {
                        WsMessage::Close(_) => break,
                        WsMessage::Ping(data) => {
                            if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        WsMessage::Pong(_) => {}
                        WsMessage::Text(text) => {
                            handle_client_event(&state, &user, &room, text.as_str()).await;
                        }
                        WsMessage::Binary(_) => {
                            tracing::debug!(user = %user.username, "ignoring binary frame");
                        }
                    }
                }
            })
        };

        // 任意一侧结束就中止另一侧，再做清理
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        if !room.is_dm() {
            if let Err(err) = state
                .presence_tracker
                .record_leave(&room, &user.username)
                .await
            {
                tracing::warn!(user = %user.username, room = %room, error = %err, "failed to record room leave");
            }
        }
        tracing::info!(user = %user.username, room = %room, "chat session closed");
    }
}

/// 解析失败只丢帧，不断开会话。
async fn handle_client_event(state: &AppState, user: &UserRef, room: &RoomName, raw: &str) {
    let event = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(user = %user.username, room = %room, error = %err, "dropping malformed client frame");
            return;
        }
    };

    match event {
        ClientEvent::ChatMessage {
            message,
            image_content,
            msg_type,
            receiver,
        } => {
            // receiver 只在 DM 房间的会话里生效，公开房间忽略它
            let receiver = if room.is_dm() { receiver } else { None };
            let request = SendMessageRequest {
                sender: user.clone(),
                room_name: Some(room.clone()),
                is_dm: room.is_dm(),
                receiver,
                message,
                image_content,
                message_type: msg_type,
            };
            if let Err(err) = state.message_pipeline.send(request).await {
                tracing::warn!(user = %user.username, room = %room, error = %err, "message send failed");
            }
        }
        ClientEvent::MarkReadBatch { message_ids } => {
            if let Err(err) = state.read_receipts.mark_read(user, &message_ids, room).await {
                tracing::warn!(user = %user.username, room = %room, error = %err, "mark read failed");
            }
        }
    }
}
