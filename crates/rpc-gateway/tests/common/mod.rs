//! Shared scripted WebSocket server for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

/// What the server does with an inbound frame.
pub enum Reaction {
    /// Send these raw text frames back, in order.
    Reply(Vec<String>),
    /// Swallow the frame.
    Ignore,
    /// Close the connection.
    Close,
}

pub type Responder = Arc<dyn Fn(&Value) -> Reaction + Send + Sync>;

pub struct TestServer {
    pub url: String,
    /// Every parsed frame the server received, in order.
    pub inbound: mpsc::UnboundedReceiver<Value>,
    /// Raw text frames to push to the connected client.
    pub push: mpsc::UnboundedSender<String>,
}

/// Start a single-connection server on an ephemeral port.
pub async fn start(responder: Responder) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (inbound_tx, inbound) = mpsc::unbounded_channel();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let mut ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(_) => return,
        };

        loop {
            tokio::select! {
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };
                        let reaction = responder(&value);
                        let _ = inbound_tx.send(value);
                        match reaction {
                            Reaction::Reply(replies) => {
                                for reply in replies {
                                    if ws.send(Message::Text(reply.into())).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Reaction::Ignore => {}
                            Reaction::Close => {
                                let _ = ws.close(None).await;
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                },
                pushed = push_rx.recv() => match pushed {
                    Some(text) => {
                        if ws.send(Message::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                },
            }
        }
    });

    TestServer {
        url: format!("ws://{addr}"),
        inbound,
        push: push_tx,
    }
}

/// Echo server: answers every request with `result` = its `params`.
pub fn echo_responder() -> Responder {
    Arc::new(|frame| {
        let id = frame.get("id").cloned().unwrap_or(Value::Null);
        let params = frame.get("params").cloned().unwrap_or(Value::Null);
        Reaction::Reply(vec![
            json!({"jsonrpc": "2.0", "id": id, "result": params}).to_string(),
        ])
    })
}

/// Never answers.
pub fn silent_responder() -> Responder {
    Arc::new(|_| Reaction::Ignore)
}

/// Acknowledges listen/unlisten handshakes with a matching `listening`
/// flag; echoes everything else.
pub fn listen_responder() -> Responder {
    Arc::new(|frame| {
        let id = frame.get("id").cloned().unwrap_or(Value::Null);
        let listen = frame
            .get("params")
            .and_then(|params| params.get("listen"))
            .and_then(Value::as_bool);
        match listen {
            Some(listen) => Reaction::Reply(vec![json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"listening": listen}
            })
            .to_string()]),
            None => {
                let params = frame.get("params").cloned().unwrap_or(Value::Null);
                Reaction::Reply(vec![
                    json!({"jsonrpc": "2.0", "id": id, "result": params}).to_string(),
                ])
            }
        }
    })
}

/// Receive the next frame the server saw, within 2 seconds.
pub async fn expect_frame(inbound: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(2), inbound.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("server stopped")
}

/// Assert no frame arrives within `window`.
pub async fn assert_no_frame(inbound: &mut mpsc::UnboundedReceiver<Value>, window: Duration) {
    if let Ok(Some(frame)) = tokio::time::timeout(window, inbound.recv()).await {
        panic!("unexpected frame on the wire: {frame}");
    }
}
