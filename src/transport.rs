//! The contract between the socket context and the client it wraps.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Lifecycle events fired by the client itself. They cannot be emitted and
/// are not delivered to catch-all listeners.
pub const RESERVED_EVENTS: [&str; 3] = ["connect", "disconnect", "connect_error"];

/// Check whether an event name belongs to the connection lifecycle
pub fn is_reserved(event: &str) -> bool {
    RESERVED_EVENTS.contains(&event)
}

/// Handler for a single named event.
///
/// Handlers are compared by identity: two clones of the same `EventHandler`
/// are the same handler, two handlers built from equal closures are not.
#[derive(Clone)]
pub struct EventHandler(Arc<dyn Fn(Option<Value>) + Send + Sync>);

impl EventHandler {
    pub fn new(f: impl Fn(Option<Value>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, data: Option<Value>) {
        (self.0)(data)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Arc::as_ptr(&self.0))
    }
}

/// Catch-all handler, called with the event name and its payload.
#[derive(Clone)]
pub struct AnyEventHandler(Arc<dyn Fn(&str, Option<Value>) + Send + Sync>);

impl AnyEventHandler {
    pub fn new(f: impl Fn(&str, Option<Value>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, event: &str, data: Option<Value>) {
        (self.0)(event, data)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AnyEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyEventHandler({:p})", Arc::as_ptr(&self.0))
    }
}

/// A real-time client the socket context can drive.
///
/// Every method is fire-and-forget: connection progress and failures are
/// reported through the `connect`, `disconnect` and `connect_error` events.
pub trait SocketTransport: Send + Sync + 'static {
    /// Whether the transport currently has a live connection
    fn connected(&self) -> bool;

    /// Start connecting
    fn connect(&self);

    /// Close the connection, if any
    fn disconnect(&self);

    /// Register `handler` for `event`. Registering the same handler twice
    /// registers it twice.
    fn on(&self, event: &str, handler: EventHandler);

    /// Remove one registration of `handler` for `event`
    fn off(&self, event: &str, handler: &EventHandler);

    /// Register `handler` for the next `event` only
    fn once(&self, event: &str, handler: EventHandler);

    /// Register `handler` for every incoming event
    fn on_any(&self, handler: AnyEventHandler);

    /// Remove one catch-all registration of `handler`
    fn off_any(&self, handler: &AnyEventHandler);

    /// Send `event` with optional `data`
    fn emit(&self, event: &str, data: Option<Value>);

    /// Number of handlers registered for `event`
    fn listener_count(&self, event: &str) -> usize;

    /// Number of catch-all handlers
    fn any_listener_count(&self) -> usize;
}
