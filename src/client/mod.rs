//! Socket.IO client with listener registry, send buffering and auto-reconnect.
//!
//! This module provides the shared state and conditionally includes the
//! platform-specific session loop: the `rust_socketio` client natively, a
//! browser websocket speaking Engine.IO v4 on wasm.

mod frame;
mod listeners;

pub use frame::{Frame, Packet};
pub(crate) use listeners::Listeners;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use serde_json::Value;

use crate::config::{ClientOptions, SocketIoConfig};
use crate::error::SocketError;
use crate::transport::{is_reserved, AnyEventHandler, EventHandler, SocketTransport};

/// Connection state of a [`SocketClient`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Whether to reconnect at all
    pub enabled: bool,
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ClientOptions::default().reconnect_config()
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    /// Whether another attempt may follow `attempt` failed ones
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt < self.max_attempts)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frames waiting for a session, and the sender of the live one
#[derive(Default)]
struct Outbox {
    sender: Option<UnboundedSender<Frame>>,
    buffer: Vec<Frame>,
}

/// State shared between the client handle and its session task.
///
/// Every `connect()` starts a session tagged with a new generation. A session
/// whose generation is no longer current must not touch the state or
/// dispatch events.
pub(crate) struct Shared {
    config: SocketIoConfig,
    options: ClientOptions,
    state: Mutex<ConnectionState>,
    generation: AtomicU64,
    listeners: Mutex<Listeners>,
    outbox: Mutex<Outbox>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Set the state if `generation` is still current
    fn set_state(&self, generation: u64, next: ConnectionState) -> bool {
        let mut state = lock(&self.state);
        if !self.is_current(generation) {
            return false;
        }
        *state = next;
        true
    }

    /// The live connection of `generation` went away
    fn connection_lost(&self, generation: u64, reason: &str, reconnecting: bool) -> bool {
        let next = if reconnecting {
            ConnectionState::Reconnecting { attempt: 1 }
        } else {
            ConnectionState::Disconnected
        };
        if !self.set_state(generation, next) {
            return false;
        }
        crate::log_info!("Socket to {} closed: {}", self.config_label(), reason);
        self.fire("disconnect", Some(Value::String(reason.to_string())));
        true
    }

    /// Give up on `generation`
    fn fail(&self, generation: u64, reason: String) {
        crate::log_error!("Socket to {} failed: {}", self.config_label(), reason);
        self.set_state(generation, ConnectionState::Failed { reason });
    }

    /// Take back the frames a finished session never sent.
    ///
    /// They go to the live session of a newer generation if there is one,
    /// otherwise to the buffer flushed by the next `connect()`.
    fn reclaim(
        &self,
        generation: u64,
        unsent: impl IntoIterator<Item = Frame>,
        receiver: &mut UnboundedReceiver<Frame>,
    ) {
        let mut guard = lock(&self.outbox);
        if self.is_current(generation) {
            guard.sender = None;
        }
        receiver.close();

        let mut frames: Vec<Frame> = unsent.into_iter().collect();
        while let Ok(Some(frame)) = receiver.try_next() {
            frames.push(frame);
        }
        if frames.is_empty() {
            return;
        }
        crate::log_debug!("Keeping {} unsent frames for the next connection", frames.len());

        let Outbox { sender, buffer } = &mut *guard;
        for frame in frames {
            match sender {
                Some(sender) => {
                    if let Err(e) = sender.unbounded_send(frame) {
                        buffer.push(e.into_inner());
                    }
                }
                None => buffer.push(frame),
            }
        }
    }

    /// Deliver a lifecycle event to named listeners
    fn fire(&self, event: &str, data: Option<Value>) {
        let handlers = lock(&self.listeners).take_for_dispatch(event);
        for handler in handlers {
            handler.call(data.clone());
        }
    }

    /// Deliver an incoming frame: catch-all listeners first, then named ones
    fn dispatch(&self, generation: u64, frame: Frame) {
        if !self.is_current(generation) {
            return;
        }
        if is_reserved(&frame.event) {
            crate::log_warn!("Ignoring incoming frame with reserved name '{}'", frame.event);
            return;
        }
        crate::log_debug!("Socket received '{}'", frame.event);

        let any = lock(&self.listeners).any_snapshot();
        for handler in any {
            handler.call(&frame.event, frame.data.clone());
        }
        self.fire(&frame.event, frame.data);
    }

    fn config_label(&self) -> String {
        match &self.config.uri {
            crate::config::Endpoint::Uri(uri) => uri.clone(),
            crate::config::Endpoint::Options(options) => {
                options.hostname.clone().unwrap_or_else(|| "default host".to_string())
            }
        }
    }
}

/// A real-time client speaking `[event, data]` JSON frames over a websocket.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct SocketClient {
    shared: Arc<Shared>,
}

impl SocketClient {
    /// Create a client. Connects right away when `autoConnect` is set.
    pub fn new(config: SocketIoConfig) -> Self {
        let options = config.effective_options();
        let auto_connect = options.auto_connect;
        let client = Self {
            shared: Arc::new(Shared {
                config,
                options,
                state: Mutex::new(ConnectionState::Disconnected),
                generation: AtomicU64::new(0),
                listeners: Mutex::new(Listeners::default()),
                outbox: Mutex::new(Outbox::default()),
            }),
        };

        if auto_connect {
            client.connect();
        }
        client
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.state).clone()
    }

    /// Frames waiting for the next connection
    pub fn buffered(&self) -> usize {
        lock(&self.shared.outbox).buffer.len()
    }
}

impl SocketTransport for SocketClient {
    fn connected(&self) -> bool {
        self.state().is_connected()
    }

    fn connect(&self) {
        let generation = {
            let mut state = lock(&self.shared.state);
            if state.is_connected() || state.is_connecting() {
                crate::log_debug!("connect() ignored, socket is {:?}", *state);
                return;
            }
            *state = ConnectionState::Connecting;
            self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let url = match connection::endpoint(&self.shared.config) {
            Ok(url) => url,
            Err(e) => {
                self.shared.fail(generation, e.to_string());
                self.shared.fire("connect_error", Some(Value::String(e.to_string())));
                return;
            }
        };

        let (sender, receiver) = unbounded();
        {
            let mut outbox = lock(&self.shared.outbox);
            for frame in outbox.buffer.drain(..) {
                let _ = sender.unbounded_send(frame);
            }
            outbox.sender = Some(sender);
        }

        crate::log_info!("Connecting to {}", url);
        connection::start(self.shared.clone(), generation, url.to_string(), receiver);
    }

    fn disconnect(&self) {
        let previous = {
            let mut state = lock(&self.shared.state);
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };
        // Dropping the sender ends the session's send loop, which closes the socket
        lock(&self.shared.outbox).sender = None;

        if previous.is_connected() {
            crate::log_info!("Disconnected from {}", self.shared.config_label());
            self.shared
                .fire("disconnect", Some(Value::String("io client disconnect".to_string())));
        }
    }

    fn on(&self, event: &str, handler: EventHandler) {
        lock(&self.shared.listeners).add(event, handler, false);
    }

    fn off(&self, event: &str, handler: &EventHandler) {
        lock(&self.shared.listeners).remove(event, handler);
    }

    fn once(&self, event: &str, handler: EventHandler) {
        lock(&self.shared.listeners).add(event, handler, true);
    }

    fn on_any(&self, handler: AnyEventHandler) {
        lock(&self.shared.listeners).add_any(handler);
    }

    fn off_any(&self, handler: &AnyEventHandler) {
        lock(&self.shared.listeners).remove_any(handler);
    }

    fn emit(&self, event: &str, data: Option<Value>) {
        if is_reserved(event) {
            crate::log_warn!("{}", SocketError::ReservedEvent(event.to_string()));
            return;
        }

        let frame = Frame::new(event, data);
        let mut outbox = lock(&self.shared.outbox);
        let frame = match outbox.sender.as_ref() {
            Some(sender) => match sender.unbounded_send(frame) {
                Ok(()) => return,
                Err(e) => e.into_inner(),
            },
            None => frame,
        };
        crate::log_debug!("Buffering '{}' until the socket connects", frame.event);
        outbox.buffer.push(frame);
    }

    fn listener_count(&self, event: &str) -> usize {
        lock(&self.shared.listeners).count(event)
    }

    fn any_listener_count(&self) -> usize {
        lock(&self.shared.listeners).any_count()
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
#[path = "connection_wasm.rs"]
mod connection;

#[cfg(not(target_arch = "wasm32"))]
#[path = "connection_native.rs"]
mod connection;
