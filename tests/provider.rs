//! Mount `SocketProvider`-style trees headlessly and check what reaches the socket.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dioxus::prelude::*;
use dioxus_core::VirtualDom;
use dioxus_socket_context::{
    try_use_socket_context, use_socket_context, use_socket_event, use_socket_provider,
    ClientOptions, EventHandler, GlobalEventHandlers, LoopbackSocket, SocketError,
    SocketIoConfig, SocketProvider, SocketTransport,
};
use serde_json::json;

thread_local! {
    static SOCKET: RefCell<Option<Arc<LoopbackSocket>>> = const { RefCell::new(None) };
    static HANDLERS: RefCell<Option<GlobalEventHandlers>> = const { RefCell::new(None) };
    static LOOKUP: RefCell<Option<Result<(), SocketError>>> = const { RefCell::new(None) };
}

fn install(socket: &Arc<LoopbackSocket>, handlers: Option<GlobalEventHandlers>) {
    SOCKET.with(|s| *s.borrow_mut() = Some(socket.clone()));
    HANDLERS.with(|h| *h.borrow_mut() = handlers);
}

fn installed_socket() -> Arc<dyn SocketTransport> {
    SOCKET.with(|s| s.borrow().clone()).expect("socket installed") as Arc<dyn SocketTransport>
}

fn counting(count: &Arc<AtomicUsize>) -> EventHandler {
    let count = count.clone();
    EventHandler::new(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    })
}

fn loopback_root() -> Element {
    let handlers = HANDLERS.with(|h| h.borrow().clone());
    use_socket_provider(installed_socket, handlers);

    rsx! {
        Consumer {}
    }
}

#[component]
fn Consumer() -> Element {
    let socket = use_socket_context();
    use_hook(move || {
        socket.connect();
        socket.connect();
        socket.emit("ping", Some(json!({ "n": 1 })));
    });

    rsx! {
        div { "consumer" }
    }
}

#[test]
fn consumers_reach_the_provider_socket() {
    let socket = Arc::new(LoopbackSocket::new());
    install(&socket, None);

    let mut dom = VirtualDom::new(loopback_root);
    dom.rebuild_in_place();

    assert_eq!(socket.connect_calls(), 1);
    assert!(socket.connected());
    assert_eq!(
        socket.emitted(),
        vec![("ping".to_string(), Some(json!({ "n": 1 })))]
    );
}

#[test]
fn global_handlers_live_exactly_as_long_as_the_provider() {
    let socket = Arc::new(LoopbackSocket::new());
    let connects = Arc::new(AtomicUsize::new(0));
    let responses = Arc::new(AtomicUsize::new(0));
    let handlers = GlobalEventHandlers::new()
        .on_handler("connect", counting(&connects))
        .on_handler("response", counting(&responses))
        .on_handler("notice", counting(&responses));
    install(&socket, Some(handlers));

    let baseline = socket.listener_count("connect");
    let mut dom = VirtualDom::new(loopback_root);
    dom.rebuild_in_place();

    assert_eq!(socket.listener_count("connect"), baseline + 1);
    assert_eq!(socket.listener_count("response"), 1);
    assert_eq!(socket.listener_count("notice"), 1);
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    socket.receive("response", Some(json!({ "text": "hi", "rnd": 4 })));
    assert_eq!(responses.load(Ordering::SeqCst), 1);

    drop(dom);

    assert_eq!(socket.listener_count("connect"), baseline);
    assert_eq!(socket.listener_count("response"), 0);
    assert_eq!(socket.listener_count("notice"), 0);

    socket.receive("response", None);
    assert_eq!(responses.load(Ordering::SeqCst), 1);
}

fn lookup_root() -> Element {
    let result = try_use_socket_context().map(|_| ());
    LOOKUP.with(|l| *l.borrow_mut() = Some(result));
    rsx! {}
}

#[test]
fn missing_provider_is_an_explicit_error() {
    let mut dom = VirtualDom::new(lookup_root);
    dom.rebuild_in_place();

    let result = LOOKUP.with(|l| l.borrow_mut().take());
    assert_eq!(result, Some(Err(SocketError::MissingProvider)));
}

fn event_hook_root() -> Element {
    use_socket_provider(installed_socket, None);
    rsx! {
        Listener {}
    }
}

#[component]
fn Listener() -> Element {
    let seen = SEEN.with(|s| s.clone());
    use_socket_event("response", move |data| {
        seen.lock().unwrap().push(data);
    });
    rsx! {}
}

thread_local! {
    static SEEN: Arc<Mutex<Vec<Option<serde_json::Value>>>> = Arc::new(Mutex::new(Vec::new()));
}

#[test]
fn use_socket_event_unsubscribes_on_unmount() {
    let socket = Arc::new(LoopbackSocket::new());
    install(&socket, None);

    let mut dom = VirtualDom::new(event_hook_root);
    dom.rebuild_in_place();
    assert_eq!(socket.listener_count("response"), 1);

    socket.receive("response", Some(json!("first")));
    drop(dom);
    socket.receive("response", Some(json!("second")));

    assert_eq!(socket.listener_count("response"), 0);
    let seen = SEEN.with(|s| s.lock().unwrap().clone());
    assert_eq!(seen, vec![Some(json!("first"))]);
}

thread_local! {
    static CLIENT_URI: RefCell<String> = const { RefCell::new(String::new()) };
    static CONNECT_ERRORS: Arc<Mutex<Vec<Option<serde_json::Value>>>> = Arc::new(Mutex::new(Vec::new()));
}

fn client_root() -> Element {
    let uri = CLIENT_URI.with(|u| u.borrow().clone());
    rsx! {
        SocketProvider {
            config: SocketIoConfig::new(uri).with_options(
                ClientOptions::default()
                    .auto_connect(false)
                    .reconnection(false)
                    .transports(["websocket"]),
            ),
            Lookup {}
        }
    }
}

#[component]
fn Lookup() -> Element {
    let errors = CONNECT_ERRORS.with(|e| e.clone());
    let result = try_use_socket_context();
    use_hook(|| {
        let Ok(socket) = &result else {
            return;
        };
        assert!(!socket.socket().connected());
        let _ = socket.subscribe("connect_error", move |data| errors.lock().unwrap().push(data));

        socket.connect();
        // Still connecting, so this one is ignored
        socket.connect();
        // Queued until the connection is up
        socket.emit("ping", Some(json!({ "n": 1 })));
    });
    LOOKUP.with(|l| *l.borrow_mut() = Some(result.map(|_| ())));
    rsx! {}
}

#[tokio::test]
async fn socket_provider_connects_once_on_request() {
    // Accepts and immediately drops every connection
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    CLIENT_URI.with(|u| *u.borrow_mut() = uri);

    let mut dom = VirtualDom::new(client_root);
    dom.rebuild_in_place();

    let result = LOOKUP.with(|l| l.borrow_mut().take());
    assert_eq!(result, Some(Ok(())));

    let errors = CONNECT_ERRORS.with(|e| e.clone());
    for _ in 0..250 {
        if !errors.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    // Give a second attempt time to surface
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(errors.lock().unwrap().len(), 1);
    drop(dom);
}
