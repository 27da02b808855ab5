//! The socket context: the capability set handed to descendants of a
//! `SocketProvider`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dioxus::prelude::*;
use serde_json::Value;

use crate::error::SocketError;
use crate::transport::{AnyEventHandler, EventHandler, SocketTransport};

/// Connect, disconnect, emit and subscribe on the provider's socket.
///
/// Cloning is cheap and every clone drives the same socket.
#[derive(Clone)]
pub struct SocketContext {
    socket: Arc<dyn SocketTransport>,
}

impl SocketContext {
    pub fn new(socket: Arc<dyn SocketTransport>) -> Self {
        Self { socket }
    }

    /// Connect to the remote socket server, unless already connected.
    ///
    /// Returns immediately; subscribe to `connect` to learn when it succeeds.
    pub fn connect(&self) {
        if !self.socket.connected() {
            self.socket.connect();
        }
    }

    /// Disconnect from the remote socket server
    pub fn disconnect(&self) {
        self.socket.disconnect();
    }

    /// Subscribe to a socket event
    pub fn subscribe(
        &self,
        event: &str,
        handler: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_handler(event, EventHandler::new(handler))
    }

    /// Subscribe an existing handler to a socket event.
    ///
    /// Each call is its own registration, even for the same handler.
    pub fn subscribe_handler(&self, event: &str, handler: EventHandler) -> Subscription {
        self.socket.on(event, handler.clone());
        Subscription::new(
            self.socket.clone(),
            Target::Event {
                name: event.to_string(),
                handler,
            },
        )
    }

    /// Subscribe to the next occurrence of a socket event. It cannot be
    /// cancelled before it fires.
    pub fn subscribe_once(
        &self,
        event: &str,
        handler: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) {
        self.socket.once(event, EventHandler::new(handler));
    }

    /// Subscribe to every incoming socket event
    pub fn subscribe_any(
        &self,
        handler: impl Fn(&str, Option<Value>) + Send + Sync + 'static,
    ) -> Subscription {
        let handler = AnyEventHandler::new(handler);
        self.socket.on_any(handler.clone());
        Subscription::new(self.socket.clone(), Target::Any(handler))
    }

    /// Send a socket event with optional data
    pub fn emit(&self, event: &str, data: Option<Value>) {
        self.socket.emit(event, data);
    }

    /// The socket behind this context
    pub fn socket(&self) -> &Arc<dyn SocketTransport> {
        &self.socket
    }
}

impl fmt::Debug for SocketContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketContext")
            .field("connected", &self.socket.connected())
            .finish()
    }
}

enum Target {
    Event { name: String, handler: EventHandler },
    Any(AnyEventHandler),
}

/// Handle for one registration made through [`SocketContext`].
///
/// Dropping it keeps the registration alive; call `unsubscribe` to remove it.
pub struct Subscription {
    socket: Arc<dyn SocketTransport>,
    target: Target,
    active: AtomicBool,
}

impl Subscription {
    fn new(socket: Arc<dyn SocketTransport>, target: Target) -> Self {
        Self {
            socket,
            target,
            active: AtomicBool::new(true),
        }
    }

    /// Remove the registration. Later calls do nothing.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        match &self.target {
            Target::Event { name, handler } => self.socket.off(name, handler),
            Target::Any(handler) => self.socket.off_any(handler),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event = match &self.target {
            Target::Event { name, .. } => name.as_str(),
            Target::Any(_) => "*",
        };
        f.debug_struct("Subscription")
            .field("event", &event)
            .field("active", &self.is_active())
            .finish()
    }
}

/// The socket context of the nearest `SocketProvider`, or
/// [`SocketError::MissingProvider`] when there is none.
pub fn try_use_socket_context() -> Result<SocketContext, SocketError> {
    try_use_context::<SocketContext>().ok_or(SocketError::MissingProvider)
}

/// The socket context of the nearest `SocketProvider`.
///
/// # Panics
/// When no `SocketProvider` is mounted above the calling component.
pub fn use_socket_context() -> SocketContext {
    match try_use_socket_context() {
        Ok(context) => context,
        Err(e) => panic!("{e}"),
    }
}
