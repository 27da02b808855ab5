//! `SocketProvider`: owns one socket for its subtree and publishes the
//! socket context to it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use dioxus::prelude::*;
use serde_json::Value;

use crate::client::SocketClient;
use crate::config::SocketIoConfig;
use crate::context::{SocketContext, Subscription};
use crate::transport::{EventHandler, SocketTransport};

/// Handlers registered for the provider's whole lifetime, keyed by event name
#[derive(Clone, Debug, Default)]
pub struct GlobalEventHandlers(BTreeMap<String, EventHandler>);

impl GlobalEventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        self,
        event: impl Into<String>,
        handler: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> Self {
        self.on_handler(event, EventHandler::new(handler))
    }

    pub fn on_handler(mut self, event: impl Into<String>, handler: EventHandler) -> Self {
        self.0.insert(event.into(), handler);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EventHandler)> {
        self.0.iter().map(|(event, handler)| (event.as_str(), handler))
    }
}

impl PartialEq for GlobalEventHandlers {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|((a, ha), (b, hb))| a == b && ha.ptr_eq(hb))
    }
}

/// Subscriptions made on mount, released on unmount
#[derive(Default)]
struct GlobalSubscriptions(RefCell<Vec<Subscription>>);

impl GlobalSubscriptions {
    fn register(context: &SocketContext, handlers: Option<&GlobalEventHandlers>) -> Self {
        let subscriptions = handlers
            .map(|handlers| {
                handlers
                    .iter()
                    .map(|(event, handler)| context.subscribe_handler(event, handler.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Self(RefCell::new(subscriptions))
    }

    fn release(&self) {
        for subscription in self.0.borrow_mut().drain(..) {
            subscription.unsubscribe();
        }
    }
}

/// Provide a socket context built from any transport.
///
/// `init` runs once, on the first render. Global handlers are subscribed at
/// the same time and unsubscribed when the calling component is dropped.
/// Later arguments are ignored.
pub fn use_socket_provider(
    init: impl FnOnce() -> Arc<dyn SocketTransport>,
    global_event_handlers: Option<GlobalEventHandlers>,
) -> SocketContext {
    let context = use_context_provider(|| SocketContext::new(init()));

    let subscriptions = use_hook(|| {
        let subscriptions =
            GlobalSubscriptions::register(&context, global_event_handlers.as_ref());
        if !subscriptions.0.borrow().is_empty() {
            crate::log_debug!(
                "SocketProvider: registered {} global handlers",
                subscriptions.0.borrow().len()
            );
        }
        Rc::new(subscriptions)
    });

    use_drop(move || {
        // Unsubscribe global socket events during unmount
        subscriptions.release();
    });

    context
}

/// Wrap your app in the SocketProvider to give every descendant access to
/// the socket through `use_socket_context`.
///
/// The client is created once from the first `config`; later config changes
/// are not applied.
#[component]
pub fn SocketProvider(
    config: SocketIoConfig,
    global_event_handlers: Option<GlobalEventHandlers>,
    children: Element,
) -> Element {
    use_socket_provider(
        move || Arc::new(SocketClient::new(config)) as Arc<dyn SocketTransport>,
        global_event_handlers,
    );

    children
}
