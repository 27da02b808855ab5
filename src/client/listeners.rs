//! Listener registry shared by the socket implementations.

use std::collections::HashMap;

use crate::transport::{AnyEventHandler, EventHandler};

struct Registration {
    handler: EventHandler,
    once: bool,
}

/// Named and catch-all listeners, in registration order
#[derive(Default)]
pub(crate) struct Listeners {
    named: HashMap<String, Vec<Registration>>,
    any: Vec<AnyEventHandler>,
}

impl Listeners {
    pub fn add(&mut self, event: &str, handler: EventHandler, once: bool) {
        self.named
            .entry(event.to_string())
            .or_default()
            .push(Registration { handler, once });
    }

    /// Remove the first registration of `handler` for `event`
    pub fn remove(&mut self, event: &str, handler: &EventHandler) -> bool {
        let Some(registrations) = self.named.get_mut(event) else {
            return false;
        };
        let Some(index) = registrations
            .iter()
            .position(|r| r.handler.ptr_eq(handler))
        else {
            return false;
        };
        registrations.remove(index);
        if registrations.is_empty() {
            self.named.remove(event);
        }
        true
    }

    pub fn add_any(&mut self, handler: AnyEventHandler) {
        self.any.push(handler);
    }

    /// Remove the first catch-all registration of `handler`
    pub fn remove_any(&mut self, handler: &AnyEventHandler) -> bool {
        match self.any.iter().position(|h| h.ptr_eq(handler)) {
            Some(index) => {
                self.any.remove(index);
                true
            }
            None => false,
        }
    }

    /// Handlers to run for `event`. Once-registrations are dropped from the
    /// registry before they are handed out.
    pub fn take_for_dispatch(&mut self, event: &str) -> Vec<EventHandler> {
        let Some(registrations) = self.named.get_mut(event) else {
            return Vec::new();
        };
        let handlers = registrations.iter().map(|r| r.handler.clone()).collect();
        registrations.retain(|r| !r.once);
        if registrations.is_empty() {
            self.named.remove(event);
        }
        handlers
    }

    pub fn any_snapshot(&self) -> Vec<AnyEventHandler> {
        self.any.clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.named.get(event).map_or(0, Vec::len)
    }

    pub fn any_count(&self) -> usize {
        self.any.len()
    }
}
