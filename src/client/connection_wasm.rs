//! WASM/Web session loop: Engine.IO v4 over a browser `WebSocket`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::future::{select, Either};
use futures_util::StreamExt;
use serde_json::Value;
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{CloseEvent, MessageEvent, WebSocket};

use super::{ConnectionState, Frame, Packet, Shared};
use crate::config::SocketIoConfig;
use crate::error::SocketError;

/// Why a live connection ended
enum SessionEnd {
    /// `disconnect()` dropped the outbox sender
    ClientClosed,
    /// The server or the network closed the socket
    TransportClosed,
}

enum OpenStatus {
    Pending,
    Open,
    Failed(String),
}

/// An open socket and the callbacks wired into it
struct OpenSocket {
    ws: WebSocket,
    namespace: String,
    closed: UnboundedReceiver<()>,
    _onerror: Closure<dyn FnMut(web_sys::Event)>,
    _onclose: Closure<dyn FnMut(CloseEvent)>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
}

impl Drop for OpenSocket {
    fn drop(&mut self) {
        self.ws.set_onerror(None);
        self.ws.set_onclose(None);
        self.ws.set_onmessage(None);
    }
}

fn send(ws: &WebSocket, packet: &Packet) -> Result<(), String> {
    if ws.ready_state() != WebSocket::OPEN {
        return Err("socket is not open".to_string());
    }
    ws.send_with_str(&packet.encode())
        .map_err(|e| format!("{:?}", e))
}

/// Browsers only get the websocket transport
pub(super) fn endpoint(config: &SocketIoConfig) -> Result<Url, SocketError> {
    if !config.effective_options().allows_websocket() {
        crate::log_warn!("Only the websocket transport is available in the browser");
    }
    config.websocket_url()
}

/// Start the session for `generation` on the browser's event loop
pub(super) fn start(
    shared: Arc<Shared>,
    generation: u64,
    url: String,
    receiver: UnboundedReceiver<Frame>,
) {
    spawn_local(run_session(shared, generation, url, receiver));
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

        match open_socket(&shared, generation, &url).await {
            Ok(socket) => {
                if !shared.set_state(generation, ConnectionState::Connected) {
                    // disconnect() won the race against the handshake
                    let _ = socket.ws.close();
                    break None;
                }
                attempt = 0;
                crate::log_info!("Socket connected to {}", url);
                shared.fire("connect", None);

                match pump(socket, &mut receiver, &mut unsent).await {
                    SessionEnd::ClientClosed => break None,
                    SessionEnd::TransportClosed => {
                        if !shared.connection_lost(generation, "transport close", reconnect.enabled)
                            || !reconnect.enabled
                        {
                            break None;
                        }
                        let delay = reconnect.delay_for_attempt(0);
                        crate::log_info!("Reconnecting to {} in {}ms", url, delay);
                        gloo_timers::future::TimeoutFuture::new(delay).await;
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
                gloo_timers::future::TimeoutFuture::new(delay).await;
                attempt += 1;
            }
        }
    };

    shared.reclaim(generation, unsent, &mut receiver);
    if let Some(reason) = failure {
        shared.fail(generation, reason);
    }
}

/// Open a socket and join the namespace, up to the connect timeout.
///
/// The server opens with the Engine.IO handshake; the client answers with a
/// namespace connect and is ready once the server acknowledges it.
async fn open_socket(shared: &Arc<Shared>, generation: u64, url: &str) -> Result<OpenSocket, String> {
    let ws = WebSocket::new(url).map_err(|e| format!("Failed to create WebSocket: {:?}", e))?;
    let namespace = shared.config.namespace();

    let status = Rc::new(RefCell::new(OpenStatus::Pending));
    let (close_tx, closed) = unbounded::<()>();

    let status_error = status.clone();
    let onerror = Closure::wrap(Box::new(move |_: web_sys::Event| {
        let mut status = status_error.borrow_mut();
        if matches!(*status, OpenStatus::Pending) {
            *status = OpenStatus::Failed("WebSocket error".to_string());
        }
    }) as Box<dyn FnMut(web_sys::Event)>);
    ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));

    let status_close = status.clone();
    let onclose = Closure::wrap(Box::new(move |e: CloseEvent| {
        let reason = if e.reason().is_empty() {
            format!("Code {}", e.code())
        } else {
            e.reason()
        };
        let mut status = status_close.borrow_mut();
        if matches!(*status, OpenStatus::Pending) {
            *status = OpenStatus::Failed(reason);
        }
        let _ = close_tx.unbounded_send(());
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));

    let status_message = status.clone();
    let shared_message = shared.clone();
    let ws_message = ws.clone();
    let joined = namespace.clone();
    let auth = shared.options.auth.clone();
    let onmessage = Closure::wrap(Box::new(move |e: MessageEvent| {
        let Some(text) = e.data().as_string() else {
            crate::log_warn!("Ignoring binary frame");
            return;
        };
        let packet = match Packet::decode(&text) {
            Ok(packet) => packet,
            Err(e) => {
                crate::log_warn!("Dropping incoming frame: {}", e);
                return;
            }
        };

        match packet {
            Packet::Open(_) => {
                let connect = Packet::Connect {
                    namespace: joined.clone(),
                    data: auth.clone(),
                };
                let _ = ws_message.send_with_str(&connect.encode());
            }
            Packet::Ping => {
                let _ = ws_message.send_with_str(&Packet::Pong.encode());
            }
            Packet::Connect { namespace, .. } if namespace == joined => {
                *status_message.borrow_mut() = OpenStatus::Open;
            }
            Packet::ConnectError { namespace, data } if namespace == joined => {
                let reason = data
                    .as_ref()
                    .and_then(|data| data.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("connect refused")
                    .to_string();
                let mut status = status_message.borrow_mut();
                if matches!(*status, OpenStatus::Pending) {
                    *status = OpenStatus::Failed(reason);
                }
                let _ = ws_message.close();
            }
            Packet::Event { namespace, frame } if namespace == joined => {
                shared_message.dispatch(generation, frame);
            }
            Packet::Disconnect { namespace } if namespace == joined => {
                let _ = ws_message.close();
            }
            Packet::Close => {
                let _ = ws_message.close();
            }
            _ => {}
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

    let socket = OpenSocket {
        ws,
        namespace,
        closed,
        _onerror: onerror,
        _onclose: onclose,
        _onmessage: onmessage,
    };

    // Poll every 10ms so the callbacks above get a chance to run
    let polls = (shared.options.timeout / 10).max(1);
    for _ in 0..polls {
        match &*status.borrow() {
            OpenStatus::Open => return Ok(socket),
            OpenStatus::Failed(reason) => return Err(reason.clone()),
            OpenStatus::Pending => {}
        }
        gloo_timers::future::TimeoutFuture::new(10).await;
    }

    let _ = socket.ws.close();
    Err("timeout".to_string())
}

/// Move outgoing frames to the socket until either side closes.
/// Incoming packets are handled by the `onmessage` callback.
async fn pump(
    mut socket: OpenSocket,
    receiver: &mut UnboundedReceiver<Frame>,
    unsent: &mut VecDeque<Frame>,
) -> SessionEnd {
    // Frames left over from a dropped connection go first
    while let Some(frame) = unsent.pop_front() {
        if let Err(e) = send(&socket.ws, &Packet::event(&socket.namespace, frame.clone())) {
            crate::log_error!("Send of '{}' failed: {}", frame.event, e);
            unsent.push_front(frame);
            return SessionEnd::TransportClosed;
        }
    }

    loop {
        match select(receiver.next(), socket.closed.next()).await {
            Either::Left((Some(frame), _)) => {
                if let Err(e) = send(&socket.ws, &Packet::event(&socket.namespace, frame.clone())) {
                    crate::log_error!("Send of '{}' failed: {}", frame.event, e);
                    unsent.push_back(frame);
                    return SessionEnd::TransportClosed;
                }
            }
            Either::Left((None, _)) => {
                let _ = send(&socket.ws, &Packet::Disconnect {
                    namespace: socket.namespace.clone(),
                });
                let _ = socket.ws.close();
                return SessionEnd::ClientClosed;
            }
            Either::Right(_) => return SessionEnd::TransportClosed,
        }
    }
}
