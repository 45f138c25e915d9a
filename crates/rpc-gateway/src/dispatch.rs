//! Inbound frame classification and routing.
//!
//! Every parsed frame from the pump lands here exactly once:
//!
//! | Shape                  | Route                                  |
//! |------------------------|----------------------------------------|
//! | `method` + `id`        | provider request → response on the wire |
//! | `method`, no `id`      | event notification → listener fan-out   |
//! | no `method`, no `error`| success → pending-call completion       |
//! | no `method`, `error`   | failure → pending-call failure          |

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::pending::PendingCallRegistry;
use crate::subscriptions::SubscriptionRegistry;
use crate::transport::{MessageId, Transport};

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

pub(crate) struct Dispatcher {
    pending: Arc<PendingCallRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    #[cfg_attr(not(feature = "provider"), allow(dead_code))]
    transport: Arc<Transport>,
}

impl Dispatcher {
    pub fn new(
        pending: Arc<PendingCallRegistry>,
        subscriptions: Arc<SubscriptionRegistry>,
        transport: Arc<Transport>,
    ) -> Self {
        Self {
            pending,
            subscriptions,
            transport,
        }
    }

    /// Route one inbound frame.
    pub async fn dispatch(&self, message: Value) {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = message
            .get("id")
            .and_then(Value::as_u64)
            .and_then(|id| MessageId::try_from(id).ok());

        match (method, id) {
            (Some(method), Some(id)) => {
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                self.provider_request(id, &method, &params).await;
            }
            (Some(method), None) => {
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                self.subscriptions.notify(&method, &params);
            }
            (None, Some(id)) => self.response(id, &message),
            (None, None) => warn!(frame = %message, "dropping frame with neither method nor id"),
        }
    }

    fn response(&self, id: MessageId, message: &Value) {
        let delivered = match message.get("error") {
            Some(error) => {
                let error = match serde_json::from_value::<ErrorObject>(error.clone()) {
                    Ok(object) => {
                        debug!(id, code = object.code, message = %object.message, "error response");
                        GatewayError::from_code(object.code)
                    }
                    Err(_) => {
                        warn!(id, "malformed error object in response");
                        GatewayError::General
                    }
                };
                self.pending.fail(id, error)
            }
            None => {
                let result = message.get("result").cloned().unwrap_or(Value::Null);
                self.pending.complete(id, result)
            }
        };
        // The waiter may have been evicted by the watchdog already.
        if !delivered {
            debug!(id, "no receiver for message id");
        }
    }

    #[cfg(feature = "provider")]
    async fn provider_request(&self, id: MessageId, method: &str, params: &Value) {
        match self.subscriptions.dispatch_provider(method, params) {
            Some(result) => {
                if let Err(error) = self.transport.send_response(id, &result).await {
                    warn!(id, %method, %error, "failed to send provider response");
                }
            }
            None => debug!(id, %method, "no provider registered for request"),
        }
    }

    #[cfg(not(feature = "provider"))]
    async fn provider_request(&self, id: MessageId, method: &str, _params: &Value) {
        debug!(id, %method, "provider support disabled; dropping request");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn dispatcher() -> (Dispatcher, Arc<PendingCallRegistry>, Arc<SubscriptionRegistry>) {
        let pending = Arc::new(PendingCallRegistry::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let transport = Arc::new(Transport::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&pending),
            Arc::clone(&subscriptions),
            transport,
        );
        (dispatcher, pending, subscriptions)
    }

    #[tokio::test]
    async fn test_success_response_completes_pending() {
        let (dispatcher, pending, _) = dispatcher();
        let mut rx = pending.insert(1).expect("insert");

        dispatcher
            .dispatch(json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}}))
            .await;

        assert_eq!(rx.try_recv().expect("signalled"), Ok(json!({"ok": true})));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_error_response_fails_pending() {
        let (dispatcher, pending, _) = dispatcher();
        let mut rx = pending.insert(2).expect("insert");

        dispatcher
            .dispatch(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": {"code": -32601, "message": "no such method"}
            }))
            .await;

        assert_eq!(
            rx.try_recv().expect("signalled"),
            Err(GatewayError::MethodNotFound)
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_dropped() {
        let (dispatcher, pending, _) = dispatcher();
        dispatcher
            .dispatch(json!({"jsonrpc": "2.0", "id": 42, "result": null}))
            .await;
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_notification_fans_out() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (dispatcher, _, subscriptions) = dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&counter);
        subscriptions
            .subscribe(
                "Device.onFooChanged",
                1,
                Arc::new(move |payload| {
                    assert_eq!(payload, &json!(42));
                    observed.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("subscribe");

        dispatcher
            .dispatch(json!({
                "jsonrpc": "2.0",
                "method": "device.fooChanged",
                "params": {"value": 42}
            }))
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_frame_without_method_or_id() {
        let (dispatcher, pending, _) = dispatcher();
        dispatcher.dispatch(json!({"jsonrpc": "2.0"})).await;
        assert!(pending.is_empty());
    }
}
