//! An in-process socket that routes every emitted event back to itself.
//!
//! Handy for previews and tests: no server, no runtime, and dispatch
//! happens synchronously inside `emit`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::Value;

use crate::client::{lock, Listeners};
use crate::error::SocketError;
use crate::transport::{is_reserved, AnyEventHandler, EventHandler, SocketTransport};

#[derive(Default)]
pub struct LoopbackSocket {
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    emitted: Mutex<Vec<(String, Option<Value>)>>,
    listeners: Mutex<Listeners>,
}

impl LoopbackSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `connect()` reached this socket
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Every event emitted so far, in order
    pub fn emitted(&self) -> Vec<(String, Option<Value>)> {
        lock(&self.emitted).clone()
    }

    /// Deliver an event as if the server had sent it
    pub fn receive(&self, event: &str, data: Option<Value>) {
        if !is_reserved(event) {
            let any = lock(&self.listeners).any_snapshot();
            for handler in any {
                handler.call(event, data.clone());
            }
        }
        self.fire(event, data);
    }

    fn fire(&self, event: &str, data: Option<Value>) {
        let handlers = lock(&self.listeners).take_for_dispatch(event);
        for handler in handlers {
            handler.call(data.clone());
        }
    }
}

impl SocketTransport for LoopbackSocket {
    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.fire("connect", None);
        }
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.fire(
                "disconnect",
                Some(Value::String("io client disconnect".to_string())),
            );
        }
    }

    fn on(&self, event: &str, handler: EventHandler) {
        lock(&self.listeners).add(event, handler, false);
    }

    fn off(&self, event: &str, handler: &EventHandler) {
        lock(&self.listeners).remove(event, handler);
    }

    fn once(&self, event: &str, handler: EventHandler) {
        lock(&self.listeners).add(event, handler, true);
    }

    fn on_any(&self, handler: AnyEventHandler) {
        lock(&self.listeners).add_any(handler);
    }

    fn off_any(&self, handler: &AnyEventHandler) {
        lock(&self.listeners).remove_any(handler);
    }

    fn emit(&self, event: &str, data: Option<Value>) {
        if is_reserved(event) {
            crate::log_warn!("{}", SocketError::ReservedEvent(event.to_string()));
            return;
        }
        lock(&self.emitted).push((event.to_string(), data.clone()));
        self.receive(event, data);
    }

    fn listener_count(&self, event: &str) -> usize {
        lock(&self.listeners).count(event)
    }

    fn any_listener_count(&self) -> usize {
        lock(&self.listeners).any_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emitted_events_come_back() {
        let socket = LoopbackSocket::new();
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            socket.on("echo", EventHandler::new(move |data| lock(&seen).push(data)));
        }
        socket.emit("echo", Some(json!("hi")));
        assert_eq!(*lock(&seen), vec![Some(json!("hi"))]);
        assert_eq!(socket.emitted(), vec![("echo".to_string(), Some(json!("hi")))]);
    }

    #[test]
    fn connect_and_disconnect_fire_lifecycle_events() {
        let socket = LoopbackSocket::new();
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        for event in ["connect", "disconnect"] {
            let log = log.clone();
            socket.on(event, EventHandler::new(move |_| lock(&log).push(event)));
        }

        socket.connect();
        socket.connect();
        socket.disconnect();
        socket.disconnect();

        assert_eq!(*lock(&log), vec!["connect", "disconnect"]);
        assert_eq!(socket.connect_calls(), 2);
    }
}
