//! Socket hooks for Dioxus components.

use std::rc::Rc;

use dioxus::prelude::*;
use serde_json::Value;

use crate::context::use_socket_context;

/// Subscribe to `event` for as long as the calling component is mounted.
///
/// The handler from the first render is used; handlers passed on later
/// renders are ignored. Handlers that update component state should write
/// to a `SyncSignal` (see `use_signal_sync`).
///
/// ```rust,ignore
/// let connected = use_signal_sync(|| false);
/// use_socket_event("connect", move |_| {
///     let mut connected = connected;
///     connected.set(true);
/// });
/// ```
///
/// # Panics
/// When no `SocketProvider` is mounted above the calling component.
pub fn use_socket_event(event: &str, handler: impl Fn(Option<Value>) + Send + Sync + 'static) {
    let context = use_socket_context();
    let subscription = use_hook(|| Rc::new(context.subscribe(event, handler)));

    use_drop(move || subscription.unsubscribe());
}
