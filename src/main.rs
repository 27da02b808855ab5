//! Socket demo - main entry point
//!
//! Connects to a socket server, emits `message` events and shows the
//! `response` events coming back. Supports both web (WASM) and desktop.
//!
//! The server is configured through the `SOCKET_*` environment variables
//! (see `SocketIoConfig::from_env`).

#![allow(non_snake_case)]

use dioxus::prelude::*;
use dioxus_socket_context::{
    log_info, log_warn, use_socket_context, use_socket_event, GlobalEventHandlers,
    SocketIoConfig, SocketProvider,
};
use serde::Deserialize;
use serde_json::Value;

fn main() -> anyhow::Result<()> {
    // Initialize tracing for desktop
    #[cfg(not(target_arch = "wasm32"))]
    {
        use tracing_subscriber::EnvFilter;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("dioxus_socket_context=debug")),
            )
            .init();
    }

    let config = SocketIoConfig::from_env()?;
    log_info!("Socket demo using {:?}", config.uri);

    dioxus::LaunchBuilder::new().with_context(config).launch(App);
    Ok(())
}

#[component]
fn App() -> Element {
    let config = use_context::<SocketIoConfig>();
    let handlers = use_hook(|| {
        GlobalEventHandlers::new().on("connect_error", |error| {
            log_warn!("Could not reach the socket server: {:?}", error)
        })
    });

    rsx! {
        SocketProvider {
            config,
            global_event_handlers: handlers,
            Chat {}
        }
    }
}

/// Payload of the server's `response` event
#[derive(Clone, Debug, PartialEq, Deserialize)]
struct Response {
    text: String,
    rnd: f64,
}

#[component]
fn Chat() -> Element {
    let socket = use_socket_context();
    let connected = use_signal_sync(|| false);
    let response = use_signal_sync(|| None::<Response>);
    let mut input = use_signal_sync(String::new);

    use_socket_event("connect", move |_| {
        let mut connected = connected;
        connected.set(true);
    });

    use_socket_event("disconnect", move |_| {
        let (mut connected, mut response, mut input) = (connected, response, input);
        connected.set(false);
        response.set(None);
        input.set(String::new());
    });

    use_socket_event("response", move |data| {
        let mut response = response;
        match data.map(serde_json::from_value::<Response>) {
            Some(Ok(res)) => response.set(Some(res)),
            Some(Err(e)) => log_warn!("Unexpected response payload: {}", e),
            None => response.set(None),
        }
    });

    let socket_connect = socket.clone();
    let socket_emit = socket.clone();
    let socket_disconnect = socket;

    rsx! {
        div { style: "max-width: 480px; margin: 0 auto; font-family: sans-serif;",
            p { style: "text-align: center;", "Dioxus Socket Usage" }
            hr {}

            if !*connected.read() {
                button { onclick: move |_| socket_connect.connect(), "Connect To Socket" }
            } else {
                p { style: "text-align: center;", "Connected to socket!" }

                label { "Socket Message" }
                input {
                    placeholder: "Type a message to emit",
                    value: "{input}",
                    oninput: move |e| input.set(e.value()),
                }

                button {
                    disabled: input.read().is_empty(),
                    onclick: move |_| {
                        let text = input.read().clone();
                        socket_emit.emit("message", Some(Value::String(text)));
                        input.set(String::new());
                    },
                    "Emit"
                }

                if let Some(res) = response.read().clone() {
                    div { style: "box-shadow: 0 2px 8px #0003; padding: 12px; margin-bottom: 10px;",
                        small { "Response Text" }
                        p { "{res.text}" }
                        small { "Response Random Number" }
                        p { "{res.rnd}" }
                    }
                }

                button { onclick: move |_| socket_disconnect.disconnect(), "Disconnect From Socket" }
            }
        }
    }
}
