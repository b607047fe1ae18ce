use axum::{
    extract::{ws::Message as WsMessage, ws::WebSocket, Query, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use application::GroupName;
use domain::UserRef;

use crate::{
    protocol::ServerEvent,
    state::AppState,
    ws_chat::{close_unauthenticated, TokenQuery},
};

pub(crate) async fn presence_upgrade(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let user = match token.as_deref().map(|t| state.jwt_service.verify_token(t)) {
        Some(Ok(user)) => user,
        _ => {
            tracing::warn!("presence session rejected: missing or invalid token");
            close_unauthenticated(socket).await;
            return;
        }
    };

    PresenceSession {
        socket,
        state,
        user,
    }
    .run()
    .await;
}

#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

/// 单个在线状态会话，只出不进
///
/// 先入群再上线，自己的上线快照也会推回给自己。
struct PresenceSession {
    socket: WebSocket,
    state: AppState,
    user: UserRef,
}

impl PresenceSession {
    async fn run(self) {
        let Self {
            socket,
            state,
            user,
        } = self;

        let mut subscription = match state.broadcaster.join(GroupName::presence()).await {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::error!(user = %user.username, error = %err, "failed to join presence group");
                return;
            }
        };

        if let Err(err) = state.presence_tracker.connect(&user).await {
            tracing::error!(user = %user.username, error = %err, "failed to mark user online");
            return;
        }
        tracing::info!(user = %user.username, "presence session established");

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

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
                            let mut failed = false;
                            for frame in ServerEvent::for_presence_session(event) {
                                match serde_json::to_string(&frame) {
                                    Ok(json) => {
                                        if cmd_tx_for_events.send(WsCommand::SendText(json)).await.is_err() {
                                            failed = true;
                                            break;
                                        }
                                    }
                                    Err(err) => {
                                        tracing::warn!(error = %err, "failed to serialize presence frame");
                                    }
                                }
                            }
                            if failed {
                                break;
                            }
                        }
                    }
                }
            })
        };

        // 接收任务只为感知断开和回应 ping，文本帧一律忽略
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                match message {
                    WsMessage::Close(_) => break,
                    WsMessage::Ping(data) => {
                        if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        if let Err(err) = state.presence_tracker.disconnect(&user).await {
            tracing::warn!(user = %user.username, error = %err, "failed to mark user offline");
        }
        tracing::info!(user = %user.username, "presence session closed");
    }
}
