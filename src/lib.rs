//! Dioxus Socket Context - real-time sockets for Dioxus component trees
//!
//! Wrap part of your app in [`SocketProvider`] and every descendant can
//! connect, disconnect, emit, and subscribe to named events through
//! [`use_socket_context`] without touching the underlying client.
//!
//! ```rust,ignore
//! rsx! {
//!     SocketProvider {
//!         config: SocketIoConfig::new("http://127.0.0.1:3000")
//!             .with_options(ClientOptions::default().auto_connect(false)),
//!         Chat {}
//!     }
//! }
//!
//! #[component]
//! fn Chat() -> Element {
//!     let socket = use_socket_context();
//!     use_socket_event("response", |data| log_info!("response: {data:?}"));
//!
//!     rsx! {
//!         button { onclick: move |_| socket.connect(), "Connect" }
//!     }
//! }
//! ```

pub mod logging;

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod loopback;
pub mod provider;
pub mod transport;

pub use client::{ConnectionState, Frame, Packet, ReconnectConfig, SocketClient};
pub use config::{ClientOptions, Endpoint, SocketIoConfig};
pub use context::{try_use_socket_context, use_socket_context, SocketContext, Subscription};
pub use error::SocketError;
pub use hooks::use_socket_event;
pub use loopback::LoopbackSocket;
pub use provider::{use_socket_provider, GlobalEventHandlers, SocketProvider};
pub use transport::{AnyEventHandler, EventHandler, SocketTransport, RESERVED_EVENTS};
