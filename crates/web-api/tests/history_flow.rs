mod support;

use reqwest::{Client, StatusCode};
use serde_json::json;

use support::spawn_app;

#[tokio::test]
async fn post_then_get_round_trip() {
    let app = spawn_app().await;
    let client = Client::new();
    let token = app.token_for(1, "alice");

    for i in 0..3 {
        let response = client
            .post(app.http("/api/messages"))
            .bearer_auth(&token)
            .json(&json!({"room_name": "general", "message": format!("msg-{i}")}))
            .send()
            .await
            .expect("post");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let page = client
        .get(app.http("/api/messages?room_name=general"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get")
        .json::<serde_json::Value>()
        .await
        .expect("json");

    assert_eq!(page["count"], 3);
    assert_eq!(page["next"], serde_json::Value::Null);
    assert_eq!(page["previous"], serde_json::Value::Null);
    let results = page["results"].as_array().unwrap();
    // 页内时间正序
    assert_eq!(results[0]["message"], "msg-0");
    assert_eq!(results[2]["message"], "msg-2");
}

#[tokio::test]
async fn dm_history_is_shared_between_both_sides() {
    let app = spawn_app().await;
    let client = Client::new();
    let alice_token = app.token_for(1, "alice");
    let bob_token = app.token_for(2, "bob");

    let created = client
        .post(app.http("/api/messages"))
        .bearer_auth(&alice_token)
        .json(&json!({"receiver": "bob", "is_dm": true, "message": "hi bob"}))
        .send()
        .await
        .expect("post")
        .json::<serde_json::Value>()
        .await
        .expect("json");
    assert_eq!(created["room_name"], "dm_alice_bob");

    // bob 用对端 id 查到同一间房
    let page = client
        .get(app.http("/api/messages?receiver_id=1"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .expect("get")
        .json::<serde_json::Value>()
        .await
        .expect("json");
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["message"], "hi bob");
}

#[tokio::test]
async fn pagination_walks_pages_with_cursors() {
    let app = spawn_app().await;
    let client = Client::new();
    let token = app.token_for(1, "alice");

    for i in 0..5 {
        client
            .post(app.http("/api/messages"))
            .bearer_auth(&token)
            .json(&json!({"room_name": "general", "message": format!("msg-{i}")}))
            .send()
            .await
            .expect("post");
    }

    let page = client
        .get(app.http("/api/messages?room_name=general&page=2&page_size=2"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get")
        .json::<serde_json::Value>()
        .await
        .expect("json");

    assert_eq!(page["count"], 5);
    assert_eq!(page["results"][0]["message"], "msg-2");
    assert_eq!(page["next"], 3);
    assert_eq!(page["previous"], 1);
}

#[tokio::test]
async fn empty_room_returns_an_empty_page() {
    let app = spawn_app().await;
    let client = Client::new();
    let token = app.token_for(1, "alice");

    let response = client
        .get(app.http("/api/messages?room_name=deserted"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::OK);

    let page = response.json::<serde_json::Value>().await.expect("json");
    assert_eq!(page["count"], 0);
    assert!(page["results"].as_array().unwrap().is_empty());
    assert_eq!(page["next"], serde_json::Value::Null);
    assert_eq!(page["previous"], serde_json::Value::Null);
}

#[tokio::test]
async fn target_must_be_exactly_one_of_room_or_receiver() {
    let app = spawn_app().await;
    let client = Client::new();
    let token = app.token_for(1, "alice");

    let both = client
        .get(app.http("/api/messages?room_name=general&receiver_id=2"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get");
    assert_eq!(both.status(), StatusCode::BAD_REQUEST);

    let neither = client
        .get(app.http("/api/messages"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get");
    assert_eq!(neither.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_receiver_is_a_bad_request_and_persists_nothing() {
    let app = spawn_app().await;
    let client = Client::new();
    let token = app.token_for(1, "alice");

    let response = client
        .post(app.http("/api/messages"))
        .bearer_auth(&token)
        .json(&json!({"receiver": "nobody", "is_dm": true, "message": "hi"}))
        .send()
        .await
        .expect("post");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.json::<serde_json::Value>().await.expect("json");
    assert_eq!(body["code"], "RECEIVER_NOT_FOUND");
    assert_eq!(app.repository.row_count().await, 0);
}

#[tokio::test]
async fn http_endpoints_require_a_bearer_token() {
    let app = spawn_app().await;
    let client = Client::new();

    let response = client
        .get(app.http("/api/messages?room_name=general"))
        .send()
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .post(app.http("/api/messages"))
        .json(&json!({"room_name": "general", "message": "hi"}))
        .send()
        .await
        .expect("post");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_public() {
    let app = spawn_app().await;
    let response = reqwest::get(app.http("/health")).await.expect("get");
    assert_eq!(response.status(), StatusCode::OK);
}
