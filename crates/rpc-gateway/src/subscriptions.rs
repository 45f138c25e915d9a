//! Event-listener and provider-method bookkeeping.
//!
//! Listeners are tracked per normalized event key; several listeners may
//! share a key, each identified by the `(key, ListenerId)` pair. The
//! registry only does in-process bookkeeping; the gateway facade owns the
//! server-side listen handshake and uses the first/last flags returned by
//! [`SubscriptionRegistry::subscribe`] / [`SubscriptionRegistry::unsubscribe`]
//! to decide when wire traffic is due.
//!
//! Callbacks run on the transport pump task and must be short and
//! reentrancy-aware: a callback may call back into the gateway, so they are
//! always invoked outside the registry's internal structures.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

/// Identifies one listener within an event's listener list.
pub type ListenerId = u64;

/// Invoked with the notification payload on the transport pump task.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handler for a server-called provider method; the returned string is the
/// JSON text used as the response `result`.
#[cfg(feature = "provider")]
pub type ProviderCallback = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Identifies one registered provider method.
#[cfg(feature = "provider")]
pub type ProviderId = u64;

struct EventListener {
    id: ListenerId,
    callback: EventCallback,
}

#[cfg(feature = "provider")]
struct ProviderMethod {
    name: String,
    id: ProviderId,
    callback: ProviderCallback,
}

/// Normalize a wire event name into the internal lookup key.
///
/// The module segment (before the first `.`) is lower-cased; an `on` prefix
/// on the remainder is dropped with the following character lower-cased, so
/// `Device.onFooChanged` and `device.fooChanged` resolve to the same key.
/// Names without a dot pass through unchanged. The rule is idempotent.
pub fn normalize_event_key(event: &str) -> String {
    match event.find('.') {
        Some(dot) => format!(
            "{}.{}",
            event[..dot].to_ascii_lowercase(),
            strip_on_prefix(&event[dot + 1..])
        ),
        None => event.to_string(),
    }
}

fn strip_on_prefix(name: &str) -> String {
    if name.len() > 2 && name.starts_with("on") {
        let mut chars = name[2..].chars();
        match chars.next() {
            Some(first) => format!("{}{}", first.to_ascii_lowercase(), chars.as_str()),
            None => name.to_string(),
        }
    } else {
        name.to_string()
    }
}

/// Tracks event listeners and, with the `provider` feature, server-callable
/// provider methods.
pub struct SubscriptionRegistry {
    events: scc::HashMap<String, Vec<EventListener>>,
    #[cfg(feature = "provider")]
    providers: scc::HashMap<String, Vec<ProviderMethod>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            events: scc::HashMap::new(),
            #[cfg(feature = "provider")]
            providers: scc::HashMap::new(),
        }
    }

    /// Register a listener for `event`.
    ///
    /// Returns `Ok(true)` if this is the first listener for the normalized
    /// key (server-side listen is due); a duplicate `(key, id)` pair is
    /// rejected with [`GatewayError::General`].
    pub fn subscribe(
        &self,
        event: &str,
        id: ListenerId,
        callback: EventCallback,
    ) -> GatewayResult<bool> {
        let key = normalize_event_key(event);
        let mut duplicate = false;
        let mut first = false;

        let append = |list: &mut Vec<EventListener>, duplicate: &mut bool, first: &mut bool| {
            if list.iter().any(|listener| listener.id == id) {
                *duplicate = true;
            } else {
                *first = list.is_empty();
                list.push(EventListener {
                    id,
                    callback: Arc::clone(&callback),
                });
            }
        };

        let present = self
            .events
            .update(&key, |_, list| append(list, &mut duplicate, &mut first))
            .is_some();
        if !present {
            let listener = EventListener {
                id,
                callback: Arc::clone(&callback),
            };
            match self.events.insert(key.clone(), vec![listener]) {
                Ok(()) => first = true,
                Err(_) => {
                    // Lost the creation race; append to the winner's list.
                    self.events
                        .update(&key, |_, list| append(list, &mut duplicate, &mut first));
                }
            }
        }

        if duplicate {
            return Err(GatewayError::General);
        }
        Ok(first)
    }

    /// Remove the listener identified by `(event, id)`.
    ///
    /// Returns `Ok(true)` if this was the last listener for the key
    /// (server-side unlisten is due); an unknown pair fails with
    /// [`GatewayError::General`].
    pub fn unsubscribe(&self, event: &str, id: ListenerId) -> GatewayResult<bool> {
        let key = normalize_event_key(event);
        let mut removed = false;
        let mut last = false;

        self.events.update(&key, |_, list| {
            if let Some(pos) = list.iter().position(|listener| listener.id == id) {
                list.remove(pos);
                removed = true;
                last = list.is_empty();
            }
        });
        if removed && last {
            self.events.remove(&key);
        }

        if removed {
            Ok(last)
        } else {
            Err(GatewayError::General)
        }
    }

    /// Whether any listener is registered for `event`.
    pub fn any_subscriber(&self, event: &str) -> bool {
        let key = normalize_event_key(event);
        self.events
            .update(&key, |_, list| !list.is_empty())
            .unwrap_or(false)
    }

    /// Deliver a notification to every listener of `method`, in
    /// registration order.
    ///
    /// A `{"value": X}` payload with no other members is unwrapped to `X`.
    pub fn notify(&self, method: &str, params: &Value) {
        let key = normalize_event_key(method);
        let callbacks = self
            .events
            .update(&key, |_, list| {
                list.iter()
                    .map(|listener| Arc::clone(&listener.callback))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if callbacks.is_empty() {
            debug!(event = %key, "notification without subscribers");
            return;
        }

        let payload = unwrap_value(params);
        for callback in callbacks {
            callback(&payload);
        }
    }

    /// Drop all listeners and provider methods.
    pub fn clear(&self) {
        self.events.clear();
        #[cfg(feature = "provider")]
        self.providers.clear();
    }

    /// Register a provider method given as `Interface.method`.
    ///
    /// The method part gets the same `on`-prefix treatment as event keys.
    /// Registration is idempotent per `(method, id)` pair.
    #[cfg(feature = "provider")]
    pub fn register_provider(
        &self,
        method: &str,
        id: ProviderId,
        callback: ProviderCallback,
    ) -> GatewayResult<()> {
        let Some(dot) = method.find('.') else {
            return Err(GatewayError::InvalidParams);
        };
        let interface = method[..dot].to_string();
        let name = strip_on_prefix(&method[dot + 1..]);

        let append = |methods: &mut Vec<ProviderMethod>| {
            let exists = methods
                .iter()
                .any(|entry| entry.name == name && entry.id == id);
            if !exists {
                methods.push(ProviderMethod {
                    name: name.clone(),
                    id,
                    callback: Arc::clone(&callback),
                });
            }
        };

        let present = self.providers.update(&interface, |_, methods| append(methods));
        if present.is_none() {
            let entry = ProviderMethod {
                name: name.clone(),
                id,
                callback: Arc::clone(&callback),
            };
            if self.providers.insert(interface.clone(), vec![entry]).is_err() {
                self.providers.update(&interface, |_, methods| append(methods));
            }
        }
        Ok(())
    }

    /// Remove the provider method identified by `(interface, method, id)`.
    ///
    /// Removing an unknown entry is a no-op.
    #[cfg(feature = "provider")]
    pub fn unregister_provider(&self, interface: &str, method: &str, id: ProviderId) {
        let key = interface.to_string();
        self.providers.update(&key, |_, methods| {
            if let Some(pos) = methods
                .iter()
                .position(|entry| entry.name == method && entry.id == id)
            {
                methods.remove(pos);
            }
        });
    }

    /// Invoke the first provider method matching an inbound
    /// `Interface.method` request.
    ///
    /// Returns the handler's JSON response text, or `None` when no matching
    /// provider is registered.
    #[cfg(feature = "provider")]
    pub fn dispatch_provider(&self, method: &str, params: &Value) -> Option<String> {
        let dot = method.find('.')?;
        let interface = method[..dot].to_string();
        let name = &method[dot + 1..];

        let callback = self
            .providers
            .update(&interface, |_, methods| {
                methods
                    .iter()
                    .find(|entry| entry.name == name)
                    .map(|entry| Arc::clone(&entry.callback))
            })
            .flatten()?;
        Some(callback(params))
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn unwrap_value(params: &Value) -> Value {
    match params.as_object() {
        Some(map) if map.len() == 1 && map.contains_key("value") => map["value"].clone(),
        _ => params.clone(),
    }
}
