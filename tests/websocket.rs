mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use canvas_sync::{build_router, AppState};
use common::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    let url = format!("ws://{}/ws?token={}", addr, token_for(user));
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn send(client: &mut Client, event: Value) {
    client.send(Message::Text(event.to_string().into())).await.unwrap();
}

/// Next JSON event, skipping control frames
async fn recv(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("no frame within two seconds")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn two_clients_share_scene_and_comments() {
    let state = build_state();
    seed_doc1(&state).await;
    let addr = serve(state.clone()).await;

    let mut a = connect(addr, "alice").await;
    let mut b = connect(addr, "bob").await;

    send(&mut a, json!({"type": "join-document", "documentId": "doc1"})).await;
    let joined = recv(&mut a).await;
    assert_eq!(joined["type"], "joined");
    assert_eq!(joined["role"], "owner");
    assert_eq!(joined["seq"], 0);

    send(&mut b, json!({"type": "join-document", "documentId": "doc1"})).await;
    assert_eq!(recv(&mut b).await["role"], "editor");

    send(&mut a, json!({"type": "scene-update", "documentId": "doc1", "scene": {"shapes": ["rect1"]}})).await;
    let ack = recv(&mut a).await;
    assert_eq!(ack["type"], "scene-ack");
    assert_eq!(ack["seq"], 1);

    let relayed = recv(&mut b).await;
    assert_eq!(relayed["type"], "scene-update");
    assert_eq!(relayed["scene"], json!({"shapes": ["rect1"]}));
    assert_eq!(relayed["authorUserId"], "alice");

    send(&mut b, json!({"type": "new-comment", "documentId": "doc1", "text": "nice!"})).await;
    for client in [&mut a, &mut b] {
        let event = recv(client).await;
        assert_eq!(event["type"], "comment-received");
        assert_eq!(event["seq"], 1);
        assert_eq!(event["authorUserId"], "bob");
        assert_eq!(event["text"], "nice!");
    }

    send(&mut a, json!({"type": "ping"})).await;
    assert_eq!(recv(&mut a).await["type"], "pong");
}

#[tokio::test]
async fn bad_frames_get_an_error_event() {
    let state = build_state();
    seed_doc1(&state).await;
    let addr = serve(state).await;
    let mut carol = connect(addr, "carol").await;

    send(&mut carol, json!({"type": "no-such-event"})).await;
    assert_eq!(recv(&mut carol).await["code"], "invalid-payload");

    carol.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    assert_eq!(recv(&mut carol).await["code"], "invalid-payload");

    send(&mut carol, json!({"type": "join-document", "documentId": "doc1"})).await;
    assert_eq!(recv(&mut carol).await["role"], "viewer");
    send(&mut carol, json!({"type": "scene-update", "documentId": "doc1", "scene": {}})).await;
    let err = recv(&mut carol).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "forbidden");
    assert_eq!(err["documentId"], "doc1");
}

#[tokio::test]
async fn connection_without_valid_token_is_refused() {
    let addr = serve(build_state()).await;

    for url in [format!("ws://{}/ws", addr), format!("ws://{}/ws?token=garbage", addr)] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("connection should be refused"),
        }
    }
}

#[tokio::test]
async fn closing_the_socket_leaves_every_room() {
    let state = build_state();
    let doc = seed_doc1(&state).await;
    let addr = serve(state.clone()).await;

    let mut a = connect(addr, "alice").await;
    send(&mut a, json!({"type": "join-document", "documentId": "doc1"})).await;
    recv(&mut a).await;
    assert_eq!(state.registry.members(&doc).len(), 1);
    assert_eq!(state.gateway.active_sessions(), 1);

    a.close(None).await.unwrap();
    drop(a);

    let mut cleaned = false;
    for _ in 0..50 {
        if state.registry.members(&doc).is_empty() && state.gateway.active_sessions() == 0 {
            cleaned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(cleaned, "session still registered after close");
}
