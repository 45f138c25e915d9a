//! JSON-RPC 2.0 gateway over a single persistent WebSocket connection.
//!
//! This crate is the RPC core of a client SDK talking to a local platform
//! service: synchronous request/response calls, server-push event
//! subscriptions, and (with the `provider` feature) server-callable
//! provider methods, all multiplexed over one full-duplex text stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐      ┌─────────────────────┐      ┌──────────────┐
//! │   Gateway    │─────▶│      Transport      │─────▶│   Platform   │
//! │   (facade)   │      │  (pump task + I/O)  │      │   Service    │
//! └──────┬───────┘      └──────────┬──────────┘      └──────────────┘
//!        │                         │ inbound frames
//!        │              ┌──────────▼──────────┐
//!        │              │      Dispatcher     │
//!        │              └───┬─────────────┬───┘
//!        ▼                  ▼             ▼
//! ┌──────────────┐  ┌───────────────┐  ┌──────────────────────┐
//! │   Watchdog   │─▶│ PendingCall   │  │ SubscriptionRegistry │
//! │  (eviction)  │  │ Registry      │  │ (events, providers)  │
//! └──────────────┘  └───────────────┘  └──────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rpc_gateway::{Config, Gateway};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::instance();
//!     gateway
//!         .connect(
//!             Config::new("ws://127.0.0.1:9998"),
//!             Arc::new(|connected, failure| {
//!                 println!("connected={connected} failure={failure:?}");
//!             }),
//!         )
//!         .await?;
//!
//!     let info = gateway.request("device.info", json!({})).await?;
//!     println!("{info}");
//!
//!     let listener = gateway
//!         .subscribe(
//!             "Device.onNameChanged",
//!             Arc::new(|payload| println!("name changed: {payload}")),
//!         )
//!         .await?;
//!
//!     gateway.unsubscribe("Device.onNameChanged", listener).await?;
//!     gateway.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Callback contract
//!
//! Event callbacks and the connection-change callback run on the
//! transport's message pump task. A callback blocks the pump until it
//! returns, so callbacks must be short, and they must be reentrancy-aware
//! if they call back into the gateway (the registries are never locked
//! around a callback invocation).

pub mod config;
mod dispatch;
pub mod error;
pub mod gateway;
pub mod json;
pub mod logging;
pub mod pending;
pub mod subscriptions;
pub mod transport;
pub mod watchdog;

pub use config::{Config, LogConfig, LogFormat, LogLevel};
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use json::{enum_from_str, enum_to_str, EnumTable, FromJson};
pub use pending::PendingCallRegistry;
#[cfg(feature = "provider")]
pub use subscriptions::{ProviderCallback, ProviderId};
pub use subscriptions::{normalize_event_key, EventCallback, ListenerId, SubscriptionRegistry};
pub use transport::{ConnectionCallback, MessageCallback, MessageId, Transport, TransportState};
pub use watchdog::Watchdog;
