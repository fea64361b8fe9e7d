mod common;

use common::{ advisor, spawn_fake_backend };
use futures::{ SinkExt, StreamExt };
use robo_advisor::agent::TypingDelay;
use robo_advisor::data::CacheTtls;
use robo_advisor::server::websocket::handle_connection;
use serde_json::{ json, Value };
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{ TcpListener, TcpStream };
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{ accept_async, connect_async, MaybeTlsStream, WebSocketStream };

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_chat_server(typing_delay: TypingDelay) -> String {
    let fake = spawn_fake_backend().await;
    let advisor = advisor(&fake, CacheTtls::default(), typing_delay);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, peer) = listener.accept().await.unwrap();
            let session = Arc::new(advisor.new_session());
            tokio::spawn(async move {
                let ws = accept_async(stream).await.unwrap();
                handle_connection(peer, ws, session).await;
            });
        }
    });

    format!("ws://{}", addr)
}

async fn connect(url: &str) -> Client {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_frame(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next()).await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn chat_frame_gets_processing_then_response() {
    let url = start_chat_server(TypingDelay::NONE).await;
    let mut ws = connect(&url).await;

    send(&mut ws, json!({ "type": "chat", "content": "Should I rebalance?" })).await;

    assert_eq!(next_frame(&mut ws).await["type"], "processing");
    let reply = next_frame(&mut ws).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["topic"], "rebalancing");
    assert_eq!(reply["agent"], "Rebalancing Advisor");
    assert!(reply["content"].as_str().is_some_and(|c| !c.is_empty()));
    assert!(reply["followUp"].is_string() || reply["followUp"].is_array());
    assert!(reply["timestamp"].as_i64().is_some_and(|ts| ts > 0));
}

#[tokio::test]
async fn clear_frame_is_acknowledged() {
    let url = start_chat_server(TypingDelay::NONE).await;
    let mut ws = connect(&url).await;

    send(&mut ws, json!({ "type": "clear" })).await;

    assert_eq!(next_frame(&mut ws).await, json!({ "type": "cleared" }));
}

#[tokio::test]
async fn malformed_frame_gets_an_error() {
    let url = start_chat_server(TypingDelay::NONE).await;
    let mut ws = connect(&url).await;

    ws.send(Message::Text("{not json".to_string())).await.unwrap();

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert!(frame["message"].as_str().unwrap().starts_with("Failed to parse message"));

    send(&mut ws, json!({ "type": "clear" })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "cleared");
}

#[tokio::test]
async fn oversized_frame_closes_the_connection() {
    let url = start_chat_server(TypingDelay::NONE).await;
    let mut ws = connect(&url).await;

    let content = "a".repeat(1024 * 1024 + 1);
    send(&mut ws, json!({ "type": "chat", "content": content })).await;

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame, json!({ "type": "error", "message": "Message too large" }));

    let rest = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                return Some(text);
            }
        }
        None
    }).await.unwrap();
    assert_eq!(rest, None);
}

#[tokio::test]
async fn second_chat_while_typing_is_rejected() {
    let url = start_chat_server(TypingDelay::from_millis(300, 300)).await;
    let mut ws = connect(&url).await;

    send(&mut ws, json!({ "type": "chat", "content": "Should I rebalance?" })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "processing");
    tokio::time::sleep(Duration::from_millis(100)).await;
    send(&mut ws, json!({ "type": "chat", "content": "What about taxes?" })).await;

    assert_eq!(next_frame(&mut ws).await["type"], "processing");
    let rejected = next_frame(&mut ws).await;
    assert_eq!(rejected["type"], "error");
    assert_eq!(rejected["message"], "Still answering the previous message");

    let reply = next_frame(&mut ws).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["topic"], "rebalancing");
}

#[tokio::test]
async fn clear_while_typing_drops_the_reply() {
    let url = start_chat_server(TypingDelay::from_millis(300, 300)).await;
    let mut ws = connect(&url).await;

    send(&mut ws, json!({ "type": "chat", "content": "How is the market doing?" })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "processing");
    send(&mut ws, json!({ "type": "clear" })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "cleared");

    let late = tokio::time::timeout(Duration::from_millis(600), ws.next()).await;
    assert!(late.is_err(), "cancelled reply was delivered: {:?}", late);

    send(&mut ws, json!({ "type": "chat", "content": "How is the market doing?" })).await;
    assert_eq!(next_frame(&mut ws).await["type"], "processing");
    assert_eq!(next_frame(&mut ws).await["topic"], "marketTrends");
}
