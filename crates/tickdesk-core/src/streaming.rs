//! Live quote subscription over the backend WebSocket.
//!
//! A subscription owns one connection running on a spawned tokio task. The
//! task sends `{"type":"subscribe","symbol":...}` once connected and forwards
//! every inbound text frame that parses as JSON. Frames that do not parse are
//! logged and dropped without ending the subscription. Opening the connection
//! and sending the subscribe frame are bounded by the caller's timeout.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

use crate::adapters::backend::quote_from_value;
use crate::data_source::SourceError;
use crate::{Quote, Symbol};

pub type MessageCallback = Box<dyn FnMut(StreamMessage) + Send>;
pub type ErrorCallback = Box<dyn FnMut(SourceError) + Send>;
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// One decoded frame from the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StreamMessage(Value);

impl StreamMessage {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The frame's `type` field, e.g. `quote_update`.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn symbol(&self) -> Option<&str> {
        self.0.get("symbol").and_then(Value::as_str)
    }

    pub fn data(&self) -> Option<&Value> {
        self.0.get("data")
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Decodes the payload of a `quote_update` frame. Returns `None` for any
    /// other frame type.
    pub fn quote_update(&self) -> Option<Result<Quote, SourceError>> {
        if self.kind() != Some("quote_update") {
            return None;
        }
        Some(self.decode_quote())
    }

    fn decode_quote(&self) -> Result<Quote, SourceError> {
        let data = self
            .data()
            .ok_or_else(|| SourceError::parse("quote_update frame has no data"))?;
        let raw_symbol = self
            .symbol()
            .or_else(|| data.get("symbol").and_then(Value::as_str))
            .ok_or_else(|| SourceError::parse("quote_update frame has no symbol"))?;
        let symbol = Symbol::parse(raw_symbol).map_err(|e| SourceError::parse(e.to_string()))?;
        quote_from_value(data, &symbol)
    }
}

thread_local! {
    /// Address of the subscription whose callback is running on this thread.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks this thread as delivering for one subscription until dropped.
struct DeliveryGuard {
    previous: usize,
}

impl DeliveryGuard {
    fn enter(shared: &Shared) -> Self {
        let previous = DELIVERING.with(|current| current.replace(shared.address()));
        Self { previous }
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        DELIVERING.with(|current| current.set(self.previous));
    }
}

struct Callbacks {
    on_message: MessageCallback,
    on_error: ErrorCallback,
    on_close: Option<CloseCallback>,
}

struct Shared {
    closed: AtomicBool,
    callbacks: Mutex<Callbacks>,
    shutdown: Notify,
}

impl Shared {
    fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// True while one of this subscription's callbacks runs on this thread.
    fn delivering_here(&self) -> bool {
        DELIVERING.with(|current| current.get() == self.address())
    }

    fn emit_message(&self, message: StreamMessage) {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _delivering = DeliveryGuard::enter(self);
        (callbacks.on_message)(message);
    }

    fn emit_error(&self, error: SourceError) {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _delivering = DeliveryGuard::enter(self);
        (callbacks.on_error)(error);
    }

    /// Reports a terminal failure, then closes.
    fn fail(&self, error: SourceError) {
        self.emit_error(error);
        self.finish();
    }

    /// Marks the subscription closed and fires `on_close` if nobody has yet.
    fn finish(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let on_close = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_close
            .take();
        if let Some(on_close) = on_close {
            on_close();
        }
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle closes the subscription. A callback may close (or
/// drop) its own handle; `on_close` then runs once the delivering task
/// winds down.
pub struct SubscriptionHandle {
    symbol: Symbol,
    shared: Arc<Shared>,
}

impl SubscriptionHandle {
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stops the subscription. Idempotent; once this returns no further
    /// `on_message` or `on_error` call happens.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(symbol = %self.symbol, "closing subscription");
        self.shared.shutdown.notify_one();
        if self.shared.delivering_here() {
            // The delivery lock is held further up this stack; the task's
            // `finish` fires `on_close`.
            return;
        }
        // Waits out any callback that is mid-delivery on another thread.
        let on_close = self
            .shared
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_close
            .take();
        if let Some(on_close) = on_close {
            on_close();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens a subscription for `symbol` against the WebSocket at `url`.
///
/// `connect_timeout` bounds the handshake and the subscribe frame; on expiry
/// `on_error` receives a transport error and the subscription closes. Must be
/// called from within a tokio runtime.
pub fn subscribe<M, E, C>(
    url: impl Into<String>,
    symbol: Symbol,
    connect_timeout: Duration,
    on_message: M,
    on_error: E,
    on_close: C,
) -> SubscriptionHandle
where
    M: FnMut(StreamMessage) + Send + 'static,
    E: FnMut(SourceError) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    let shared = Arc::new(Shared {
        closed: AtomicBool::new(false),
        callbacks: Mutex::new(Callbacks {
            on_message: Box::new(on_message),
            on_error: Box::new(on_error),
            on_close: Some(Box::new(on_close)),
        }),
        shutdown: Notify::new(),
    });

    tokio::spawn(run(
        url.into(),
        symbol.clone(),
        connect_timeout,
        Arc::clone(&shared),
    ));

    SubscriptionHandle { symbol, shared }
}

async fn run(url: String, symbol: Symbol, connect_timeout: Duration, shared: Arc<Shared>) {
    let connected = tokio::select! {
        _ = shared.shutdown.notified() => {
            shared.finish();
            return;
        }
        result = timeout(connect_timeout, connect_async(url.as_str())) => result,
    };

    let ws_stream = match connected {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            error!(url = %url, symbol = %symbol, error = %e, "websocket connect failed");
            shared.fail(SourceError::transport(format!("websocket connect failed: {e}")));
            return;
        }
        Err(_) => {
            let timeout_ms = u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX);
            error!(url = %url, symbol = %symbol, timeout_ms, "websocket connect timed out");
            shared.fail(SourceError::transport(format!(
                "websocket connect timed out after {timeout_ms} ms"
            )));
            return;
        }
    };
    debug!(url = %url, symbol = %symbol, "websocket connected");

    let (mut write, mut read) = ws_stream.split();
    let subscribe = json!({ "type": "subscribe", "symbol": symbol.as_str() }).to_string();
    match timeout(connect_timeout, write.send(Message::Text(subscribe.into()))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(symbol = %symbol, error = %e, "failed to send subscribe frame");
            shared.fail(SourceError::transport(format!("subscribe failed: {e}")));
            return;
        }
        Err(_) => {
            error!(symbol = %symbol, "subscribe frame timed out");
            shared.fail(SourceError::transport("subscribe frame timed out"));
            return;
        }
    }

    loop {
        tokio::select! {
            _ = shared.shutdown.notified() => {
                let _ = timeout(connect_timeout, write.send(Message::Close(None))).await;
                break;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(value) => shared.emit_message(StreamMessage::new(value)),
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "dropping non-JSON stream frame");
                        }
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    warn!(symbol = %symbol, len = bytes.len(), "dropping binary stream frame");
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(symbol = %symbol, "websocket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(symbol = %symbol, error = %e, "websocket transport error");
                    shared.emit_error(SourceError::transport(e.to_string()));
                    break;
                }
            },
        }
    }

    shared.finish();
}
