//! Process-wide gateway facade.
//!
//! Composes the transport, the pending-call registry, the watchdog, and the
//! subscription registry behind the public connect / disconnect / request /
//! subscribe / unsubscribe surface. A lazily initialized process-wide
//! instance is available through [`Gateway::instance`]; independent
//! instances can be constructed for embedding several gateways in one
//! process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use futures_util::FutureExt;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{GatewayError, GatewayResult};
use crate::json::FromJson;
use crate::logging;
use crate::pending::PendingCallRegistry;
#[cfg(feature = "provider")]
use crate::subscriptions::{ProviderCallback, ProviderId};
use crate::subscriptions::{normalize_event_key, EventCallback, ListenerId, SubscriptionRegistry};
use crate::transport::{ConnectionCallback, MessageCallback, Transport};
use crate::watchdog::Watchdog;

/// Acknowledgement of a listen / unlisten handshake.
struct ListeningAck {
    listening: bool,
}

impl FromJson for ListeningAck {
    fn from_json(value: &Value) -> GatewayResult<Self> {
        // A response without the flag does not acknowledge anything.
        let listening = value
            .get("listening")
            .and_then(Value::as_bool)
            .ok_or(GatewayError::General)?;
        Ok(Self { listening })
    }
}

/// The gateway facade.
pub struct Gateway {
    transport: Arc<Transport>,
    pending: Arc<PendingCallRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    watchdog: tokio::sync::Mutex<Option<Watchdog>>,
    listener_ids: AtomicU64,
    #[cfg(feature = "provider")]
    provider_ids: AtomicU64,
}

static INSTANCE: OnceLock<Gateway> = OnceLock::new();

impl Gateway {
    /// The process-wide instance, created lazily on first access.
    ///
    /// Its lifetime is bound to `connect` / `disconnect`: call
    /// [`Gateway::disconnect`] on shutdown to tear the session down.
    pub fn instance() -> &'static Gateway {
        INSTANCE.get_or_init(Gateway::new)
    }

    /// Create an independent gateway instance.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(Transport::new()),
            pending: Arc::new(PendingCallRegistry::new()),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            watchdog: tokio::sync::Mutex::new(None),
            listener_ids: AtomicU64::new(0),
            #[cfg(feature = "provider")]
            provider_ids: AtomicU64::new(0),
        }
    }

    /// Validate the configuration, apply log settings, dial the service,
    /// and start the watchdog.
    ///
    /// `on_connection_change` is invoked for every observable transition of
    /// the connection state, on the transport pump task.
    pub async fn connect(
        &self,
        config: Config,
        on_connection_change: ConnectionCallback,
    ) -> GatewayResult<()> {
        if let Err(reason) = config.validate() {
            error!(%reason, "invalid configuration");
            return Err(GatewayError::General);
        }
        logging::init(&config.log);

        let url = config.connection_url();
        info!(%url, "connecting");

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.pending),
            Arc::clone(&self.subscriptions),
            Arc::clone(&self.transport),
        ));
        let on_message: MessageCallback = Arc::new(move |message| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.dispatch(message).await }.boxed()
        });

        // Connection loss must release every waiter before the application
        // hears about the drop.
        let pending = Arc::clone(&self.pending);
        let adapter: ConnectionCallback = Arc::new(move |connected, failure| {
            if !connected {
                pending.fail_all(GatewayError::NotConnected);
            }
            on_connection_change(connected, failure);
        });

        Arc::clone(&self.transport)
            .connect(
                &url,
                config.request_timeout,
                on_message,
                adapter,
                config.log.transport_include,
                config.log.transport_exclude,
            )
            .await?;

        let watchdog = Watchdog::start(
            Arc::clone(&self.pending),
            config.watchdog_cycle,
            config.request_timeout,
        );
        if let Some(previous) = self.watchdog.lock().await.replace(watchdog) {
            previous.stop().await;
        }
        Ok(())
    }

    /// Stop the watchdog, close the connection, drain outstanding calls,
    /// and clear all subscriptions.
    pub async fn disconnect(&self) -> GatewayResult<()> {
        if let Some(watchdog) = self.watchdog.lock().await.take() {
            watchdog.stop().await;
        }
        let status = self.transport.disconnect().await;
        self.pending.fail_all(GatewayError::NotConnected);
        self.subscriptions.clear();
        status
    }

    /// Issue a request and await its correlated response.
    ///
    /// Resolves with the response `result`, the mapped `error.code`, or
    /// [`GatewayError::Timedout`] once the watchdog gives up on it.
    pub async fn request(&self, method: &str, params: Value) -> GatewayResult<Value> {
        let id = self.transport.next_message_id();
        let receiver = match self.pending.insert(id) {
            Some(receiver) => receiver,
            None => return Err(GatewayError::General),
        };

        if let Err(failure) = self.transport.send(method, &params, id).await {
            self.pending.remove(id);
            return Err(failure);
        }

        match receiver.await {
            Ok(outcome) => outcome,
            // The registry was torn down under us.
            Err(_) => Err(GatewayError::General),
        }
    }

    /// [`Gateway::request`], parsed through a typed wrapper.
    pub async fn request_as<T: FromJson>(&self, method: &str, params: Value) -> GatewayResult<T> {
        let result = self.request(method, params).await?;
        T::from_json(&result)
    }

    /// Register a listener for a server-push event.
    ///
    /// The first listener for an event triggers a `{"listen": true}`
    /// handshake with the service; if the service refuses, the registration
    /// is rolled back. Returns the id identifying this listener to
    /// [`Gateway::unsubscribe`].
    pub async fn subscribe(&self, event: &str, callback: EventCallback) -> GatewayResult<ListenerId> {
        let id = self.listener_ids.fetch_add(1, Ordering::Relaxed) + 1;
        let first = self.subscriptions.subscribe(event, id, callback)?;
        if !first {
            return Ok(id);
        }

        if let Err(failure) = self.listen_request(event, true).await {
            let _ = self.subscriptions.unsubscribe(event, id);
            return Err(failure);
        }
        Ok(id)
    }

    /// Remove the listener identified by `(event, id)`.
    ///
    /// Removing the last listener for an event triggers a
    /// `{"listen": false}` handshake with the service.
    pub async fn unsubscribe(&self, event: &str, id: ListenerId) -> GatewayResult<()> {
        let last = self.subscriptions.unsubscribe(event, id)?;
        if !last {
            return Ok(());
        }
        self.listen_request(event, false).await
    }

    /// Register a server-callable provider method given as
    /// `Interface.method`. No handshake is required; the service dispatches
    /// by method name.
    #[cfg(feature = "provider")]
    pub fn register_provider(
        &self,
        method: &str,
        callback: ProviderCallback,
    ) -> GatewayResult<ProviderId> {
        let id = self.provider_ids.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscriptions.register_provider(method, id, callback)?;
        Ok(id)
    }

    /// Remove the provider method identified by `(interface, method, id)`.
    #[cfg(feature = "provider")]
    pub fn unregister_provider(
        &self,
        interface: &str,
        method: &str,
        id: ProviderId,
    ) -> GatewayResult<()> {
        self.subscriptions.unregister_provider(interface, method, id);
        Ok(())
    }

    /// Issue the listen / unlisten handshake for `event` and validate the
    /// acknowledgement.
    ///
    /// An acknowledgement that is missing or contradicts the request maps
    /// to [`GatewayError::General`].
    async fn listen_request(&self, event: &str, listen: bool) -> GatewayResult<()> {
        let method = normalize_event_key(event);
        let ack: ListeningAck = self
            .request_as(&method, json!({ "listen": listen }))
            .await?;
        if ack.listening != listen {
            return Err(GatewayError::General);
        }
        Ok(())
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}
