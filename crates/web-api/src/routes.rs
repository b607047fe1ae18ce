use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::{
    HistoryPage, HistoryQuery, HistoryTarget, SendMessageRequest, DEFAULT_PAGE_SIZE,
};
use domain::{ChatMessage, MessageType, RoomName};

use crate::{error::ApiError, state::AppState, ws_chat, ws_presence};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/chat/{room_name}", get(ws_chat::chat_upgrade))
        .route("/ws/presence", get(ws_presence::presence_upgrade))
        .route("/api/messages", get(get_history).post(send_message))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    room_name: Option<String>,
    receiver_id: Option<i64>,
    page: Option<u32>,
    page_size: Option<u32>,
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryPage>, ApiError> {
    let user = state.jwt_service.extract_user_from_headers(&headers)?;

    // 目标必须是房间名或对端用户 id 二选一
    let target = match (params.room_name, params.receiver_id) {
        (Some(room), None) => HistoryTarget::Room(
            RoomName::parse(room).map_err(|err| ApiError::bad_request(err.to_string()))?,
        ),
        (None, Some(receiver_id)) => HistoryTarget::Direct { receiver_id },
        _ => {
            return Err(ApiError::bad_request(
                "exactly one of room_name or receiver_id is required",
            ))
        }
    };

    let query = HistoryQuery {
        target,
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    let page = state.history_service.query(&user, query).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    room_name: Option<String>,
    receiver: Option<String>,
    #[serde(default)]
    is_dm: bool,
    message: Option<String>,
    image_content: Option<String>,
    #[serde(default)]
    msg_type: MessageType,
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let user = state.jwt_service.extract_user_from_headers(&headers)?;

    let room_name = payload
        .room_name
        .map(RoomName::parse)
        .transpose()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let stored = state
        .message_pipeline
        .send(SendMessageRequest {
            sender: user,
            room_name,
            receiver: payload.receiver,
            is_dm: payload.is_dm,
            message: payload.message,
            image_content: payload.image_content,
            message_type: payload.msg_type,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}
