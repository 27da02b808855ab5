//! Native/Desktop session loop backed by the `rust_socketio` async client.
//!
//! `rust_socketio` handles the Engine.IO handshake, heartbeats and packet
//! framing. This loop owns connect timeouts, reconnection and the outbox.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{FutureExt, StreamExt};
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::{Event, Payload, TransportType};
use serde_json::Value;
use url::Url;

use super::{ConnectionState, Frame, Shared};
use crate::config::{ClientOptions, SocketIoConfig};
use crate::error::SocketError;

/// Why a live connection ended
enum SessionEnd {
    /// `disconnect()` dropped the outbox sender
    ClientClosed,
    /// The server or the network closed the socket
    TransportClosed,
}

/// Lifecycle callbacks of one connection attempt
enum Signal {
    /// The server acknowledged the namespace connect
    Open,
    Close,
    Error(String),
}

/// The URL handed to `rust_socketio`, which adds the Engine.IO query itself
pub(super) fn endpoint(config: &SocketIoConfig) -> Result<Url, SocketError> {
    config.resolve_url()
}

/// Start the session for `generation` in a background tokio task
pub(super) fn start(
    shared: Arc<Shared>,
    generation: u64,
    url: String,
    mut receiver: UnboundedReceiver<Frame>,
) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(run_session(shared, generation, url, receiver));
        }
        Err(e) => {
            let reason = format!("no tokio runtime to drive the socket: {e}");
            shared.reclaim(generation, Vec::new(), &mut receiver);
            shared.fail(generation, reason.clone());
            shared.fire("connect_error", Some(Value::String(reason)));
        }
    }
}

async fn run_session(
    shared: Arc<Shared>,
    generation: u64,
    url: String,
    mut receiver: UnboundedReceiver<Frame>,
) {
    let reconnect = shared.options.reconnect_config();
    let mut attempt = 0u32;
    let mut unsent = VecDeque::new();

    let failure = loop {
        if !shared.is_current(generation) {
            break None;
        }
        if attempt > 0 {
            shared.set_state(generation, ConnectionState::Reconnecting { attempt });
        }

        match open_client(&shared, generation, &url).await {
            Ok((client, mut signals)) => {
                if !shared.set_state(generation, ConnectionState::Connected) {
                    // disconnect() won the race against the handshake
                    let _ = client.disconnect().await;
                    break None;
                }
                attempt = 0;
                crate::log_info!("Socket connected to {}", url);
                shared.fire("connect", None);

                let end = pump(&client, &mut signals, &mut receiver, &mut unsent).await;
                let _ = client.disconnect().await;
                match end {
                    SessionEnd::ClientClosed => break None,
                    SessionEnd::TransportClosed => {
                        if !shared.connection_lost(generation, "transport close", reconnect.enabled)
                            || !reconnect.enabled
                        {
                            break None;
                        }
                        let delay = reconnect.delay_for_attempt(0);
                        crate::log_info!("Reconnecting to {} in {}ms", url, delay);
                        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                        attempt = 1;
                    }
                }
            }
            Err(reason) => {
                if !shared.is_current(generation) {
                    break None;
                }
                crate::log_error!("Socket error for {}: {}", url, reason);
                shared.fire("connect_error", Some(Value::String(reason.clone())));

                if !reconnect.should_retry(attempt) {
                    break Some(if reconnect.enabled {
                        format!("Max reconnect attempts ({}) exceeded", reconnect.max_attempts)
                    } else {
                        reason
                    });
                }

                let delay = reconnect.delay_for_attempt(attempt);
                crate::log_info!(
                    "Reconnecting to {} in {}ms (attempt {})",
                    url,
                    delay,
                    attempt + 1
                );
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                attempt += 1;
            }
        }
    };

    shared.reclaim(generation, unsent, &mut receiver);
    if let Some(reason) = failure {
        shared.fail(generation, reason);
    }
}

/// Connect and wait for the namespace acknowledgement, up to the connect timeout
async fn open_client(
    shared: &Arc<Shared>,
    generation: u64,
    url: &str,
) -> Result<(Client, UnboundedReceiver<Signal>), String> {
    let timeout = Duration::from_millis(shared.options.timeout as u64);
    let (signal_tx, mut signals) = unbounded();

    let client = tokio::time::timeout(timeout, builder(shared, generation, url, signal_tx).connect())
        .await
        .map_err(|_| "timeout".to_string())?
        .map_err(|e| e.to_string())?;

    let opened = tokio::time::timeout(timeout, async {
        loop {
            match signals.next().await {
                Some(Signal::Open) => return Ok(()),
                Some(Signal::Error(reason)) => return Err(reason),
                Some(Signal::Close) | None => return Err("transport close".to_string()),
            }
        }
    })
    .await
    .unwrap_or_else(|_| Err("timeout".to_string()));

    match opened {
        Ok(()) => Ok((client, signals)),
        Err(reason) => {
            let _ = client.disconnect().await;
            Err(reason)
        }
    }
}

fn builder(
    shared: &Arc<Shared>,
    generation: u64,
    url: &str,
    signals: UnboundedSender<Signal>,
) -> ClientBuilder {
    let on_open = signals.clone();
    let on_close = signals.clone();
    let on_error = signals;
    let incoming = shared.clone();

    let mut builder = ClientBuilder::new(url)
        .namespace(shared.config.namespace())
        .transport_type(transport_type(&shared.options))
        .reconnect(false)
        .on(Event::Connect, move |_, _| {
            let _ = on_open.unbounded_send(Signal::Open);
            async {}.boxed()
        })
        .on(Event::Close, move |_, _| {
            let _ = on_close.unbounded_send(Signal::Close);
            async {}.boxed()
        })
        .on(Event::Error, move |payload, _| {
            let _ = on_error.unbounded_send(Signal::Error(payload_text(payload)));
            async {}.boxed()
        })
        .on_any(move |event, payload, _| {
            let event = match event {
                Event::Custom(name) => name,
                Event::Message => "message".to_string(),
                _ => return async {}.boxed(),
            };
            incoming.dispatch(generation, Frame::new(event, first_argument(payload)));
            async {}.boxed()
        });

    if let Some(auth) = &shared.options.auth {
        builder = builder.auth(auth.clone());
    }
    builder
}

/// Send outgoing frames until either side closes.
/// Incoming events are dispatched by the `on_any` callback.
async fn pump(
    client: &Client,
    signals: &mut UnboundedReceiver<Signal>,
    receiver: &mut UnboundedReceiver<Frame>,
    unsent: &mut VecDeque<Frame>,
) -> SessionEnd {
    // Frames left over from a dropped connection go first
    while let Some(frame) = unsent.pop_front() {
        if let Err(e) = send(client, &frame).await {
            crate::log_error!("Send of '{}' failed: {}", frame.event, e);
            unsent.push_front(frame);
            return SessionEnd::TransportClosed;
        }
    }

    loop {
        tokio::select! {
            signal = signals.next() => match signal {
                Some(Signal::Close) | None => return SessionEnd::TransportClosed,
                Some(Signal::Error(reason)) => crate::log_warn!("Socket error: {}", reason),
                Some(Signal::Open) => {}
            },
            outgoing = receiver.next() => match outgoing {
                Some(frame) => {
                    if let Err(e) = send(client, &frame).await {
                        crate::log_error!("Send of '{}' failed: {}", frame.event, e);
                        unsent.push_back(frame);
                        return SessionEnd::TransportClosed;
                    }
                }
                None => return SessionEnd::ClientClosed,
            },
        }
    }
}

async fn send(client: &Client, frame: &Frame) -> Result<(), String> {
    let args: Vec<Value> = frame.data.iter().cloned().collect();
    client
        .emit(frame.event.as_str(), Payload::Text(args))
        .await
        .map_err(|e| e.to_string())
}

fn transport_type(options: &ClientOptions) -> TransportType {
    match (options.allows_polling(), options.allows_websocket()) {
        (false, true) => TransportType::Websocket,
        (true, false) => TransportType::Polling,
        _ => TransportType::Any,
    }
}

fn first_argument(payload: Payload) -> Option<Value> {
    match payload {
        Payload::Text(values) => values.into_iter().next(),
        other => {
            crate::log_warn!("Ignoring unsupported payload: {:?}", other);
            None
        }
    }
}

fn payload_text(payload: Payload) -> String {
    match payload {
        Payload::Text(values) => match values.into_iter().next() {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => "socket error".to_string(),
        },
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transports_select_the_engine_transport() {
        let options = ClientOptions::default();
        assert!(matches!(transport_type(&options), TransportType::Any));
        assert!(matches!(
            transport_type(&options.clone().transports(["websocket"])),
            TransportType::Websocket
        ));
        assert!(matches!(
            transport_type(&options.transports(["polling"])),
            TransportType::Polling
        ));
    }

    #[test]
    fn events_carry_their_first_argument() {
        let payload = Payload::Text(vec![json!({"text": "hi"}), json!(2)]);
        assert_eq!(first_argument(payload), Some(json!({"text": "hi"})));
        assert_eq!(first_argument(Payload::Text(Vec::new())), None);
    }
}
