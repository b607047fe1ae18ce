#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    cache::memory::MemoryHistoryCache, directory::memory::MemoryUserDirectory,
    presence_store::memory::MemoryPresenceStore, repository::memory::MemoryMessageRepository,
    GroupBroadcaster, HistoryService, LocalGroupBroadcaster, MessagePipeline,
    MessagePipelineDependencies, PresenceTracker, PresenceTrackerDependencies,
    ReadReceiptCoordinator, ReadReceiptDependencies,
};
use domain::UserRef;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream};
use web_api::{router, AppState, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestApp {
    pub addr: SocketAddr,
    pub jwt: Arc<JwtService>,
    pub repository: Arc<MemoryMessageRepository>,
}

/// 内存端口搭一整套服务并起一个真实监听的服务器。
pub async fn spawn_app() -> TestApp {
    let repository = Arc::new(MemoryMessageRepository::new());
    let cache = Arc::new(MemoryHistoryCache::new());
    let directory = Arc::new(MemoryUserDirectory::new());
    directory.insert(UserRef::new(1, "alice")).await;
    directory.insert(UserRef::new(2, "bob")).await;
    let presence_store = Arc::new(MemoryPresenceStore::new());
    let broadcaster = Arc::new(LocalGroupBroadcaster::default());
    let broadcaster_dyn: Arc<dyn GroupBroadcaster> = broadcaster.clone();

    let pipeline = Arc::new(MessagePipeline::new(MessagePipelineDependencies {
        message_repository: repository.clone(),
        history_cache: cache.clone(),
        user_directory: directory.clone(),
        broadcaster: broadcaster_dyn.clone(),
    }));
    let tracker = Arc::new(PresenceTracker::new(PresenceTrackerDependencies {
        presence_store,
        user_directory: directory.clone(),
        broadcaster: broadcaster_dyn.clone(),
    }));
    tracker.clone().spawn_room_activity_worker();
    let read_receipts = Arc::new(ReadReceiptCoordinator::new(ReadReceiptDependencies {
        message_repository: repository.clone(),
        history_cache: cache.clone(),
        broadcaster: broadcaster_dyn.clone(),
    }));
    let history_service = Arc::new(HistoryService::new(
        repository.clone(),
        cache,
        directory,
    ));
    let jwt = Arc::new(JwtService::new(JwtConfig {
        secret: "integration-test-secret-key-32-chars".to_string(),
        expiration_hours: 24,
    }));

    let state = AppState::new(
        pipeline,
        tracker,
        read_receipts,
        history_service,
        broadcaster_dyn,
        jwt.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.ok();
    });

    TestApp {
        addr,
        jwt,
        repository,
    }
}

impl TestApp {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn token_for(&self, id: i64, username: &str) -> String {
        self.jwt
            .generate_token(&UserRef::new(id, username))
            .expect("token")
    }

    pub async fn connect_chat(&self, room: &str, token: &str) -> WsClient {
        let url = format!("ws://{}/ws/chat/{room}?token={token}", self.addr);
        let (ws, _) = connect_async(url).await.expect("ws connect");
        // 握手完成不代表服务端会话已入群，给它一点时间
        tokio::time::sleep(Duration::from_millis(50)).await;
        ws
    }

    pub async fn connect_presence(&self, token: &str) -> WsClient {
        let url = format!("ws://{}/ws/presence?token={token}", self.addr);
        let (ws, _) = connect_async(url).await.expect("ws connect");
        tokio::time::sleep(Duration::from_millis(50)).await;
        ws
    }
}

/// 读下一帧 JSON，跳过非文本帧；5 秒读不到算失败。
pub async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        match frame {
            TungsteniteMessage::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("json frame")
            }
            TungsteniteMessage::Close(_) => panic!("connection closed while waiting for frame"),
            _ => continue,
        }
    }
}

/// 一直读，直到读到指定 `type` 的帧。
pub async fn next_json_of_type(ws: &mut WsClient, event_type: &str) -> serde_json::Value {
    loop {
        let value = next_json(ws).await;
        if value["type"] == event_type {
            return value;
        }
    }
}

pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("ws send");
}
