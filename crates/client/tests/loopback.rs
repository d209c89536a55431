//! End-to-end check against a local WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use casalink_client::{Callbacks, ConnectionState, SessionBuilder, StaticToken};
use casalink_shared::ChatMessage;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn talks_to_a_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let path = Arc::new(Mutex::new(None::<String>));
    let (from_client_tx, mut from_client) = mpsc::unbounded_channel::<String>();

    let seen_path = path.clone();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let record = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            *seen_path.lock().unwrap() = Some(req.uri().to_string());
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, record).await.unwrap();

        ws.send(Message::text(
            r#"{"type":"message","message":{"id":"m1","content":"hola","sender_id":7}}"#,
        ))
        .await
        .unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = from_client_tx.send(text.to_string());
            }
        }
    });

    let (inbound_tx, mut inbound) = mpsc::unbounded_channel::<ChatMessage>();
    let callbacks = Callbacks::new().on_message(move |msg| {
        let _ = inbound_tx.send(msg);
    });

    let ws_base = Url::parse(&format!("ws://{addr}")).unwrap();
    let session = SessionBuilder::new("abc123", ws_base, StaticToken::new("tok1"))
        .callbacks(callbacks)
        .start();

    let mut status = session.watch_status();
    timeout(WAIT, status.wait_for(|s| s.state == ConnectionState::Connected))
        .await
        .expect("connect timed out")
        .unwrap();

    assert_eq!(
        path.lock().unwrap().as_deref(),
        Some("/chat/ws/chat/abc123?token=tok1")
    );

    let msg = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
    assert_eq!(msg.id, "m1");
    assert_eq!(msg.content, "hola");
    assert_eq!(msg.sender_id.as_deref(), Some("7"));

    session.send_text("Is the flat still available?").unwrap();
    let sent = timeout(WAIT, from_client.recv()).await.unwrap().unwrap();
    let sent: serde_json::Value = serde_json::from_str(&sent).unwrap();
    assert_eq!(
        sent,
        serde_json::json!({
            "type": "message",
            "content": "Is the flat still available?",
            "message_type": "text",
        })
    );

    session.stop().await;
    timeout(WAIT, server).await.unwrap().unwrap();
}
