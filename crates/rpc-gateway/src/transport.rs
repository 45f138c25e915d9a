//! WebSocket transport driving a single full-duplex connection.
//!
//! The transport owns the socket, allocates message ids, serializes
//! outbound frames, and runs the message pump task. All inbound dispatch
//! and both callbacks fire on the pump task; `connect`, `disconnect`,
//! `send`, and `next_message_id` are callable from any task.
//!
//! State machine:
//!
//! ```text
//! NotStarted ──connect──▶ Disconnected ──handshake──▶ Connected
//!      ▲                        ▲                         │
//!      └──────disconnect────────┴──close / error / fail───┘
//! ```
//!
//! The `Connected ↔ Disconnected` transitions fire the connection-change
//! callback.

use std::sync::{
    atomic::{AtomicU32, AtomicU8, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::logging;

/// Correlation id of an outbound request. Unique and strictly increasing
/// within a session.
pub type MessageId = u32;

/// Invoked on the pump task for every successfully parsed inbound frame.
pub type MessageCallback = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Invoked for every observable connection-state transition as
/// `(connected, error)`.
pub type ConnectionCallback = Arc<dyn Fn(bool, Option<GatewayError>) + Send + Sync>;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    /// No session has been started (or a previous one was torn down).
    NotStarted = 0,
    /// Session started but no live connection.
    Disconnected = 1,
    /// Connection is open for traffic.
    Connected = 2,
}

/// WebSocket transport. Cheap to share behind an [`Arc`].
pub struct Transport {
    state: AtomicU8,
    id_counter: AtomicU32,
    log_channels: AtomicU32,
    sink: Mutex<Option<WsSink>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TransportState::NotStarted as u8),
            id_counter: AtomicU32::new(0),
            log_channels: AtomicU32::new(logging::effective_channels(None, None)),
            sink: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> TransportState {
        match self.state.load(Ordering::Acquire) {
            s if s == TransportState::Connected as u8 => TransportState::Connected,
            s if s == TransportState::Disconnected as u8 => TransportState::Disconnected,
            _ => TransportState::NotStarted,
        }
    }

    fn set_state(&self, state: TransportState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn channel_enabled(&self, channel: u32) -> bool {
        self.log_channels.load(Ordering::Relaxed) & channel != 0
    }

    /// Allocate the next message id. Wraps only after exhausting the
    /// 32-bit range.
    pub fn next_message_id(&self) -> MessageId {
        self.id_counter.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Dial `url` and start the message pump.
    ///
    /// The handshake is bounded by `handshake_timeout`; expiry maps to
    /// [`GatewayError::Timedout`], other dial failures to
    /// [`GatewayError::NotConnected`]. A second connect while connected is
    /// refused with [`GatewayError::AlreadyConnected`]. Failures are also
    /// reported through `on_connection_change` as `(false, Some(error))`.
    pub async fn connect(
        self: Arc<Self>,
        url: &str,
        handshake_timeout: Duration,
        on_message: MessageCallback,
        on_connection_change: ConnectionCallback,
        log_include: Option<u32>,
        log_exclude: Option<u32>,
    ) -> GatewayResult<()> {
        match self.state() {
            TransportState::Connected => {
                warn!("connect called while already connected; ignoring");
                return Err(GatewayError::AlreadyConnected);
            }
            TransportState::NotStarted => self.set_state(TransportState::Disconnected),
            TransportState::Disconnected => {}
        }
        self.log_channels.store(
            logging::effective_channels(log_include, log_exclude),
            Ordering::Relaxed,
        );

        // A pump from a previous connection has nothing left to do once the
        // state left Connected; reap it before starting a new one.
        if let Some(previous) = self.pump.lock().await.take() {
            let _ = previous.await;
        }

        let dialed = tokio::time::timeout(handshake_timeout, connect_async(url)).await;
        let (stream, response) = match dialed {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                error!(error = %e, "could not establish connection");
                on_connection_change(false, Some(GatewayError::NotConnected));
                return Err(GatewayError::NotConnected);
            }
            Err(_) => {
                error!(
                    timeout_ms = handshake_timeout.as_millis() as u64,
                    "connection handshake timed out"
                );
                on_connection_change(false, Some(GatewayError::Timedout));
                return Err(GatewayError::Timedout);
            }
        };
        if self.channel_enabled(logging::CHANNEL_CONNECT) {
            debug!(status = response.status().as_u16(), "websocket handshake complete");
        }

        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);
        self.set_state(TransportState::Connected);
        on_connection_change(true, None);

        let pump = tokio::spawn(Self::pump(
            Arc::clone(&self),
            source,
            on_message,
            on_connection_change,
        ));
        *self.pump.lock().await = Some(pump);
        Ok(())
    }

    /// Gracefully close the connection and join the pump task.
    ///
    /// Sends a going-away close frame when connected. A transport that was
    /// never started returns `Ok`.
    pub async fn disconnect(&self) -> GatewayResult<()> {
        if self.state() == TransportState::NotStarted {
            return Ok(());
        }

        if self.state() == TransportState::Connected {
            let mut guard = self.sink.lock().await;
            if let Some(sink) = guard.as_mut() {
                let frame = CloseFrame {
                    code: CloseCode::Away,
                    reason: "".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    warn!(error = %e, "error closing connection");
                }
            }
        }

        let pump = self.pump.lock().await.take();
        if let Some(handle) = pump {
            let _ = handle.await;
        }

        self.set_state(TransportState::NotStarted);
        Ok(())
    }

    /// Serialize and send a request or notification frame.
    ///
    /// `params` is omitted from the envelope when it is `null` or an empty
    /// object.
    pub async fn send(&self, method: &str, params: &Value, id: MessageId) -> GatewayResult<()> {
        if self.state() != TransportState::Connected {
            return Err(GatewayError::NotConnected);
        }

        let mut frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        let omit_params = params.is_null()
            || params.as_object().map(|map| map.is_empty()).unwrap_or(false);
        if !omit_params {
            frame["params"] = params.clone();
        }
        self.write_text(frame.to_string()).await
    }

    /// Send a response to a server-initiated provider request.
    ///
    /// `result` is the handler's JSON text; it is embedded verbatim as the
    /// `result` member (or as a JSON string if it does not parse).
    #[cfg(feature = "provider")]
    pub async fn send_response(&self, id: MessageId, result: &str) -> GatewayResult<()> {
        if self.state() != TransportState::Connected {
            return Err(GatewayError::NotConnected);
        }

        let value = serde_json::from_str::<Value>(result)
            .unwrap_or_else(|_| Value::String(result.to_string()));
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": value,
        });
        self.write_text(frame.to_string()).await
    }

    async fn write_text(&self, text: String) -> GatewayResult<()> {
        if self.channel_enabled(logging::CHANNEL_FRAME_PAYLOAD) {
            debug!(frame = %text, "send");
        }
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(GatewayError::NotConnected)?;
        sink.send(Message::Text(text.into())).await.map_err(|e| {
            error!(error = %e, "error sending message");
            GatewayError::General
        })
    }

    /// Message pump: reads frames until the connection dies, then performs
    /// the `Connected → Disconnected` transition.
    async fn pump(
        this: Arc<Transport>,
        mut source: WsSource,
        on_message: MessageCallback,
        on_connection_change: ConnectionCallback,
    ) {
        let close_error = loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(message) => {
                            if this.channel_enabled(logging::CHANNEL_FRAME_PAYLOAD) {
                                debug!(frame = %message, "received");
                            }
                            on_message(message).await;
                        }
                        // Parse failures are logged and dropped; the pump
                        // keeps running.
                        Err(_) => error!(payload = text.as_str(), "cannot parse payload"),
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    if this.channel_enabled(logging::CHANNEL_FRAME_PAYLOAD) {
                        debug!("ignoring binary frame");
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if this.channel_enabled(logging::CHANNEL_CONTROL) {
                        debug!("ping");
                    }
                    let mut guard = this.sink.lock().await;
                    if let Some(sink) = guard.as_mut() {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    if this.channel_enabled(logging::CHANNEL_CONTROL) {
                        debug!(?frame, "close frame received");
                    }
                    break None;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket stream error");
                    break Some(GatewayError::General);
                }
                None => break None,
            }
        };

        this.sink.lock().await.take();
        let was_connected = this
            .state
            .compare_exchange(
                TransportState::Connected as u8,
                TransportState::Disconnected as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if was_connected {
            if this.channel_enabled(logging::CHANNEL_CONNECT) {
                debug!("connection closed");
            }
            on_connection_change(false, close_error);
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_strictly_increase() {
        let transport = Transport::new();
        assert_eq!(transport.next_message_id(), 1);
        assert_eq!(transport.next_message_id(), 2);
        assert_eq!(transport.next_message_id(), 3);
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let transport = Transport::new();
        let status = transport.send("test.method", &Value::Null, 1).await;
        assert_eq!(status, Err(GatewayError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_without_start() {
        let transport = Transport::new();
        assert_eq!(transport.state(), TransportState::NotStarted);
        assert_eq!(transport.disconnect().await, Ok(()));
        assert_eq!(transport.state(), TransportState::NotStarted);
    }

    #[cfg(feature = "provider")]
    #[tokio::test]
    async fn test_send_response_without_connection() {
        let transport = Transport::new();
        let status = transport.send_response(1, "{}").await;
        assert_eq!(status, Err(GatewayError::NotConnected));
    }
}
