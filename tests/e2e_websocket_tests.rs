//! End-to-end tests for the WebSocket session broadcaster: roles, displays and admin
//! commands.

mod common;

use common::{
    connect_admin, connect_ws, connect_ws_request, send_message, wait_for_message, TestClient,
    TestServer, ADMIN_PASS, ADMIN_USER,
};
use jukebox_server::store::FallbackCatalogStore;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_connect_sends_session_and_state() {
    let server = TestServer::spawn().await;

    let mut ws = connect_ws_request(&server.base_url, "display", None)
        .await
        .unwrap();
    let connected = wait_for_message(&mut ws, "connected").await.unwrap();
    assert_eq!(connected["payload"]["role"], "display");
    assert!(connected["payload"]["sessionId"].is_string());
    assert!(connected["payload"]["serverVersion"].is_string());

    let state = wait_for_message(&mut ws, "state.update").await.unwrap();
    assert!(state["payload"]["nowPlaying"].is_null());
    assert_eq!(state["payload"]["queue"], json!([]));
}

#[tokio::test]
async fn test_unknown_role_is_rejected() {
    let server = TestServer::spawn().await;
    assert!(connect_ws_request(&server.base_url, "dj", None).await.is_err());
}

#[tokio::test]
async fn test_admin_socket_requires_credentials() {
    let server = TestServer::spawn().await;

    assert!(connect_ws_request(&server.base_url, "admin", None).await.is_err());
    assert!(
        connect_ws_request(&server.base_url, "admin", Some((ADMIN_USER, "wrong")))
            .await
            .is_err()
    );
    assert!(
        connect_ws_request(&server.base_url, "admin", Some((ADMIN_USER, ADMIN_PASS)))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_ping_pong() {
    let server = TestServer::spawn().await;
    let (mut ws, _) = connect_ws(&server.base_url, "viewer").await;

    send_message(&mut ws, "ping", Value::Null).await;
    assert!(wait_for_message(&mut ws, "pong").await.is_some());
}

#[tokio::test]
async fn test_commands_are_checked_against_role() {
    let server = TestServer::spawn().await;
    let (mut viewer, _) = connect_ws(&server.base_url, "viewer").await;
    let (mut display, _) = connect_ws(&server.base_url, "display").await;

    send_message(&mut viewer, "admin.skip", Value::Null).await;
    let error = wait_for_message(&mut viewer, "error").await.unwrap();
    assert_eq!(error["payload"]["code"], "forbidden");

    send_message(&mut viewer, "display.finished", json!({"playId": 1})).await;
    let error = wait_for_message(&mut viewer, "error").await.unwrap();
    assert_eq!(error["payload"]["code"], "forbidden");

    send_message(
        &mut display,
        "admin.add_to_queue",
        json!({"mediaId": "x", "title": "X"}),
    )
    .await;
    let error = wait_for_message(&mut display, "error").await.unwrap();
    assert_eq!(error["payload"]["code"], "forbidden");

    send_message(&mut display, "playback.hello", json!({})).await;
    let error = wait_for_message(&mut display, "error").await.unwrap();
    assert_eq!(error["payload"]["code"], "unknown_type");

    let client = TestClient::new(server.base_url.clone());
    assert_eq!(client.state().await["queue"], json!([]));
}

#[tokio::test]
async fn test_malformed_message_reports_parse_error() {
    let server = TestServer::spawn().await;
    let (mut ws, _) = connect_ws(&server.base_url, "viewer").await;

    use futures::SinkExt;
    ws.send(tokio_tungstenite::tungstenite::Message::Text("not json".into()))
        .await
        .unwrap();
    let error = wait_for_message(&mut ws, "error").await.unwrap();
    assert_eq!(error["payload"]["code"], "parse_error");
}

#[tokio::test]
async fn test_display_handshake_sends_volume_and_promo() {
    let server = TestServer::spawn().await;
    let (mut display, _) = connect_ws(&server.base_url, "display").await;

    send_message(&mut display, "display.ready", Value::Null).await;
    let init = wait_for_message(&mut display, "player.init").await.unwrap();
    assert_eq!(init["payload"]["volume"], 50);
    assert_eq!(init["payload"]["muted"], true);
    let promo = wait_for_message(&mut display, "promo.update").await.unwrap();
    assert!(promo["payload"]["text"].is_string());
}

#[tokio::test]
async fn test_admin_queue_drives_display_playback() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let (mut admin, _) = connect_admin(&server.base_url).await;
    let (mut display, _) = connect_ws(&server.base_url, "display").await;

    send_message(
        &mut admin,
        "admin.add_to_queue",
        json!({"mediaId": "x1", "title": "Primeira"}),
    )
    .await;
    let first = wait_for_message(&mut display, "player.play").await.unwrap();
    assert_eq!(first["payload"]["mediaId"], "x1");
    let first_play_id = first["payload"]["playId"].as_u64().unwrap();

    send_message(
        &mut admin,
        "admin.add_to_queue",
        json!({"mediaId": "x2", "title": "Segunda"}),
    )
    .await;
    send_message(&mut admin, "ping", Value::Null).await;
    wait_for_message(&mut admin, "pong").await.unwrap();
    assert_eq!(client.state().await["queue"][0]["mediaId"], "x2");

    send_message(&mut display, "display.finished", json!({"playId": first_play_id})).await;
    let second = wait_for_message(&mut display, "player.play").await.unwrap();
    assert_eq!(second["payload"]["mediaId"], "x2");

    // A late duplicate for the first track must not skip the second.
    send_message(&mut display, "display.finished", json!({"playId": first_play_id})).await;
    send_message(&mut display, "ping", Value::Null).await;
    wait_for_message(&mut display, "pong").await.unwrap();
    let state = client.state().await;
    assert_eq!(state["nowPlaying"]["mediaId"], "x2");
    assert_eq!(state["state"], "playing_customer");

    send_message(&mut admin, "admin.skip", Value::Null).await;
    send_message(&mut admin, "ping", Value::Null).await;
    wait_for_message(&mut admin, "pong").await.unwrap();
    assert!(client.state().await["nowPlaying"].is_null());
}

#[tokio::test]
async fn test_admin_remove_and_clear_queue() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let (mut admin, _) = connect_admin(&server.base_url).await;

    for (media_id, title) in [("a", "A"), ("b", "B"), ("c", "C")] {
        send_message(
            &mut admin,
            "admin.add_to_queue",
            json!({"mediaId": media_id, "title": title}),
        )
        .await;
    }
    send_message(&mut admin, "ping", Value::Null).await;
    wait_for_message(&mut admin, "pong").await.unwrap();

    let state = client.state().await;
    assert_eq!(state["nowPlaying"]["mediaId"], "a");
    let queue = state["queue"].as_array().unwrap();
    assert_eq!(queue.len(), 2);
    let id_of_b = queue[0]["id"].as_str().unwrap().to_string();

    send_message(&mut admin, "admin.remove_from_queue", json!({"id": id_of_b})).await;
    send_message(&mut admin, "ping", Value::Null).await;
    wait_for_message(&mut admin, "pong").await.unwrap();
    let state = client.state().await;
    assert_eq!(state["queue"].as_array().unwrap().len(), 1);
    assert_eq!(state["queue"][0]["mediaId"], "c");

    send_message(&mut admin, "admin.clear_queue", Value::Null).await;
    send_message(&mut admin, "ping", Value::Null).await;
    wait_for_message(&mut admin, "pong").await.unwrap();
    let state = client.state().await;
    assert_eq!(state["queue"], json!([]));
    assert_eq!(state["nowPlaying"]["mediaId"], "a");
}

#[tokio::test]
async fn test_blank_admin_entry_is_invalid() {
    let server = TestServer::spawn().await;
    let (mut admin, _) = connect_admin(&server.base_url).await;

    send_message(
        &mut admin,
        "admin.add_to_queue",
        json!({"mediaId": "  ", "title": "Sem id"}),
    )
    .await;
    let error = wait_for_message(&mut admin, "error").await.unwrap();
    assert_eq!(error["payload"]["code"], "invalid_command");
}

#[tokio::test]
async fn test_fallback_catalog_fills_idle_time() {
    let server = TestServer::spawn().await;
    let (mut admin, _) = connect_admin(&server.base_url).await;
    let (mut display, _) = connect_ws(&server.base_url, "display").await;

    send_message(
        &mut admin,
        "admin.save_fallback_catalog",
        json!({"items": [{"title": "Trem das Onze"}, {"title": "  "}]}),
    )
    .await;
    let catalog = wait_for_message(&mut admin, "admin.catalog").await.unwrap();
    assert_eq!(
        catalog["payload"]["items"],
        json!([{"title": "Trem das Onze", "mediaId": "trem-das-onze-1"}])
    );
    assert_eq!(server.store.get_fallback_catalog().unwrap().len(), 1);

    let play = wait_for_message(&mut display, "player.play").await.unwrap();
    assert_eq!(play["payload"]["mediaId"], "trem-das-onze-1");

    let client = TestClient::new(server.base_url.clone());
    assert_eq!(client.state().await["state"], "playing_fallback");
}

#[tokio::test]
async fn test_admin_state_search_volume_and_promo() {
    let server = TestServer::spawn().await;
    let (mut admin, _) = connect_admin(&server.base_url).await;
    let (mut display, _) = connect_ws(&server.base_url, "display").await;
    let (mut viewer, _) = connect_ws(&server.base_url, "viewer").await;

    send_message(&mut admin, "admin.get_state", Value::Null).await;
    let revenue = wait_for_message(&mut admin, "admin.revenue").await.unwrap();
    assert_eq!(revenue["payload"]["revenueCents"], 0);

    send_message(&mut admin, "admin.search", json!({"query": "Aquarela"})).await;
    send_message(&mut admin, "admin.search", json!({"query": "Aquarela"})).await;
    let results = wait_for_message(&mut admin, "admin.search_results").await.unwrap();
    assert_eq!(results["payload"]["results"][0]["mediaId"], "aquarela-1");
    wait_for_message(&mut admin, "admin.search_results").await.unwrap();
    // Admin searches skip the cache.
    assert_eq!(server.search.calls.load(Ordering::SeqCst), 2);

    send_message(&mut admin, "admin.set_volume", json!({"volume": 150})).await;
    let volume = wait_for_message(&mut display, "player.set_volume").await.unwrap();
    assert_eq!(volume["payload"], json!({"volume": 100, "muted": false}));

    send_message(&mut admin, "admin.set_promo_text", json!({"text": "Chopp em dobro!"})).await;
    let promo = wait_for_message(&mut viewer, "promo.update").await.unwrap();
    assert_eq!(promo["payload"]["text"], "Chopp em dobro!");

    send_message(&mut admin, "admin.pause", Value::Null).await;
    assert!(wait_for_message(&mut display, "player.pause").await.is_some());
}

#[tokio::test]
async fn test_reactions_reach_displays() {
    let server = TestServer::spawn().await;
    let (mut viewer, _) = connect_ws(&server.base_url, "viewer").await;
    let (mut display, _) = connect_ws(&server.base_url, "display").await;

    send_message(&mut viewer, "reaction", json!({"emoji": "🔥"})).await;
    let reaction = wait_for_message(&mut display, "player.reaction").await.unwrap();
    assert_eq!(reaction["payload"]["emoji"], "🔥");

    send_message(&mut viewer, "reaction", json!({"emoji": "x".repeat(40)})).await;
    let error = wait_for_message(&mut viewer, "error").await.unwrap();
    assert_eq!(error["payload"]["code"], "invalid_command");
}

#[tokio::test]
async fn test_admin_page_requires_basic_auth() {
    let frontend = tempfile::tempdir().unwrap();
    std::fs::write(frontend.path().join("admin.html"), "<h1>painel</h1>").unwrap();
    std::fs::write(frontend.path().join("index.html"), "<h1>jukebox</h1>").unwrap();
    let server =
        TestServer::spawn_with_frontend(Some(frontend.path().to_string_lossy().to_string())).await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_admin_page(None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));

    let response = client.get_admin_page(Some((ADMIN_USER, "nope"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client.get_admin_page(Some((ADMIN_USER, ADMIN_PASS))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "<h1>painel</h1>");

    let response = client
        .client
        .get(format!("{}/", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
