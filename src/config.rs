//! Socket configuration: the endpoint, client options, and environment loading.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::client::ReconnectConfig;
use crate::error::SocketError;

const DEFAULT_URI: &str = "http://127.0.0.1:3000";
const DEFAULT_PATH: &str = "/socket.io/";

/// Where the client connects to.
///
/// Either a URI, or an options record that carries the host itself
/// (`hostname`, `port`, `secure`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Uri(String),
    Options(ClientOptions),
}

impl From<&str> for Endpoint {
    fn from(uri: &str) -> Self {
        Endpoint::Uri(uri.to_string())
    }
}

impl From<String> for Endpoint {
    fn from(uri: String) -> Self {
        Endpoint::Uri(uri)
    }
}

impl From<ClientOptions> for Endpoint {
    fn from(options: ClientOptions) -> Self {
        Endpoint::Options(options)
    }
}

/// Client options, named after the options of the socket.io client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    /// Connect as soon as the client is created
    pub auto_connect: bool,
    /// Reconnect after the transport drops or a connection attempt fails
    pub reconnection: bool,
    /// Maximum number of reconnect attempts (0 = unlimited)
    pub reconnection_attempts: u32,
    /// Initial reconnect delay in milliseconds
    pub reconnection_delay: u32,
    /// Upper bound for the reconnect delay in milliseconds
    pub reconnection_delay_max: u32,
    /// Connect timeout in milliseconds
    pub timeout: u32,
    /// Server path of the Engine.IO endpoint (default `/socket.io/`)
    pub path: Option<String>,
    /// Extra query parameters appended to the endpoint URL
    pub query: BTreeMap<String, String>,
    /// Allowed transports, `"polling"` and/or `"websocket"`
    pub transports: Vec<String>,
    /// Payload sent with the namespace connect packet
    pub auth: Option<Value>,
    /// Host used when the endpoint is an options record
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub secure: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_connect: true,
            reconnection: true,
            reconnection_attempts: 0,
            reconnection_delay: 1000,
            reconnection_delay_max: 5000,
            timeout: 20_000,
            path: None,
            query: BTreeMap::new(),
            transports: vec!["polling".to_string(), "websocket".to_string()],
            auth: None,
            hostname: None,
            port: None,
            secure: false,
        }
    }
}

impl ClientOptions {
    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn reconnection(mut self, reconnection: bool) -> Self {
        self.reconnection = reconnection;
        self
    }

    pub fn reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn transports<I, T>(mut self, transports: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.transports = transports.into_iter().map(Into::into).collect();
        self
    }

    pub fn auth(mut self, auth: Value) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Whether the websocket transport is allowed
    pub fn allows_websocket(&self) -> bool {
        self.transports.iter().any(|t| t == "websocket")
    }

    /// Whether the long-polling transport is allowed
    pub fn allows_polling(&self) -> bool {
        self.transports.iter().any(|t| t == "polling")
    }

    /// Backoff settings derived from the reconnection options
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            enabled: self.reconnection,
            max_attempts: self.reconnection_attempts,
            initial_delay_ms: self.reconnection_delay,
            max_delay_ms: self.reconnection_delay_max,
            backoff_multiplier: 2.0,
        }
    }
}

/// Everything a `SocketProvider` needs to build its client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketIoConfig {
    pub uri: Endpoint,
    #[serde(default)]
    pub options: Option<ClientOptions>,
}

impl SocketIoConfig {
    pub fn new(uri: impl Into<Endpoint>) -> Self {
        Self {
            uri: uri.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Parse a config from JSON, e.g.
    /// `{"uri": "http://127.0.0.1:3000", "options": {"autoConnect": false}}`
    pub fn from_json(json: &str) -> Result<Self, SocketError> {
        serde_json::from_str(json).map_err(|e| SocketError::InvalidConfig {
            key: "socket config".to_string(),
            value: e.to_string(),
        })
    }

    /// Build a config from environment variables.
    ///
    /// Environment variables:
    /// - `SOCKET_URI`: endpoint URI (default: "http://127.0.0.1:3000")
    /// - `SOCKET_AUTO_CONNECT`: "true" | "false" (default: "true")
    /// - `SOCKET_RECONNECTION`: "true" | "false" (default: "true")
    /// - `SOCKET_RECONNECTION_ATTEMPTS`: maximum reconnect attempts, 0 = unlimited
    /// - `SOCKET_PATH`: overrides the endpoint path
    /// - `SOCKET_TRANSPORTS`: comma-separated, e.g. "websocket" or "polling,websocket"
    pub fn from_env() -> Result<Self, SocketError> {
        let uri = std::env::var("SOCKET_URI").unwrap_or_else(|_| DEFAULT_URI.to_string());
        let mut options = ClientOptions::default();

        if let Some(value) = env_parse::<bool>("SOCKET_AUTO_CONNECT")? {
            options.auto_connect = value;
        }
        if let Some(value) = env_parse::<bool>("SOCKET_RECONNECTION")? {
            options.reconnection = value;
        }
        if let Some(value) = env_parse::<u32>("SOCKET_RECONNECTION_ATTEMPTS")? {
            options.reconnection_attempts = value;
        }
        if let Ok(path) = std::env::var("SOCKET_PATH") {
            options.path = Some(path);
        }
        if let Ok(transports) = std::env::var("SOCKET_TRANSPORTS") {
            options.transports = transports
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }

        Ok(Self::new(uri).with_options(options))
    }

    /// The options the client actually runs with.
    ///
    /// An options-record endpoint takes precedence over `options`.
    pub fn effective_options(&self) -> ClientOptions {
        match &self.uri {
            Endpoint::Options(options) => options.clone(),
            Endpoint::Uri(_) => self.options.clone().unwrap_or_default(),
        }
    }

    /// Resolve the Engine.IO endpoint (`http://` or `https://`).
    ///
    /// The server path comes from the `path` option. The path of the URI
    /// itself names the namespace, as with the socket.io client.
    pub fn resolve_url(&self) -> Result<Url, SocketError> {
        let options = self.effective_options();
        let (mut url, raw) = self.parse_uri()?;

        let scheme = match url.scheme() {
            "http" | "ws" => "http",
            "https" | "wss" => "https",
            other => {
                return Err(SocketError::invalid_endpoint(
                    &raw,
                    format!("unsupported scheme '{other}'"),
                ))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| SocketError::invalid_endpoint(&raw, "cannot switch to an http scheme"))?;

        url.set_path(&engine_path(options.path.as_deref()));
        if !options.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &options.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// The Engine.IO websocket URL, `ws://` or `wss://` with `EIO=4&transport=websocket`
    pub fn websocket_url(&self) -> Result<Url, SocketError> {
        let mut url = self.resolve_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| {
            SocketError::invalid_endpoint(url.as_str(), "cannot switch to a websocket scheme")
        })?;
        url.query_pairs_mut()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
        Ok(url)
    }

    /// The namespace to join: the URI path, `/` when there is none
    pub fn namespace(&self) -> String {
        let Endpoint::Uri(_) = &self.uri else {
            return "/".to_string();
        };
        self.parse_uri()
            .ok()
            .map(|(url, _)| url.path().trim_end_matches('/').to_string())
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| "/".to_string())
    }

    /// Parse the endpoint, defaulting to `http://` when the scheme is missing
    fn parse_uri(&self) -> Result<(Url, String), SocketError> {
        let raw = match &self.uri {
            Endpoint::Uri(uri) => uri.trim().to_string(),
            Endpoint::Options(options) => origin_from_options(options),
        };

        let with_scheme = if raw.contains("://") {
            raw.clone()
        } else if let Some(rest) = raw.strip_prefix("//") {
            format!("http://{rest}")
        } else {
            format!("http://{raw}")
        };

        let url = Url::parse(&with_scheme).map_err(|e| SocketError::invalid_endpoint(&raw, e))?;
        Ok((url, raw))
    }
}

/// Server path with leading and trailing slashes
fn engine_path(path: Option<&str>) -> String {
    let Some(path) = path.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) else {
        return DEFAULT_PATH.to_string();
    };
    format!("/{path}/")
}

/// Build `scheme://host[:port]` for an options-record endpoint
fn origin_from_options(options: &ClientOptions) -> String {
    let scheme = if options.secure { "https" } else { "http" };
    let host = options.hostname.clone().unwrap_or_else(default_host);
    match options.port {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    }
}

#[cfg(target_arch = "wasm32")]
fn default_host() -> String {
    web_sys::window()
        .and_then(|window| window.location().hostname().ok())
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(not(target_arch = "wasm32"))]
fn default_host() -> String {
    "localhost".to_string()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, SocketError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .to_lowercase()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SocketError::InvalidConfig {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://localhost:9999", "http://localhost:9999/socket.io/")]
    #[case("https://chat.example.com", "https://chat.example.com/socket.io/")]
    #[case("ws://127.0.0.1:3000/admin", "http://127.0.0.1:3000/socket.io/")]
    #[case("wss://example.com", "https://example.com/socket.io/")]
    #[case("//example.com:8080", "http://example.com:8080/socket.io/")]
    #[case("localhost:3000", "http://localhost:3000/socket.io/")]
    fn resolves_engine_urls(#[case] uri: &str, #[case] expected: &str) {
        let url = SocketIoConfig::new(uri).resolve_url().unwrap();
        assert_eq!(url.as_str(), expected);
    }

    #[rstest]
    #[case("http://localhost:9999", "/")]
    #[case("http://localhost:9999/", "/")]
    #[case("http://localhost:9999/admin", "/admin")]
    #[case("https://example.com/chat/rooms/", "/chat/rooms")]
    fn uri_path_names_the_namespace(#[case] uri: &str, #[case] expected: &str) {
        assert_eq!(SocketIoConfig::new(uri).namespace(), expected);
    }

    #[test]
    fn applies_path_and_query() {
        let config = SocketIoConfig::new("http://localhost:3000")
            .with_options(ClientOptions::default().path("/ws").query("token", "abc"));
        let url = config.resolve_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/ws/?token=abc");
    }

    #[test]
    fn websocket_url_carries_the_engine_query() {
        let config = SocketIoConfig::new("https://chat.example.com/admin")
            .with_options(ClientOptions::default().query("token", "abc"));
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "wss://chat.example.com/socket.io/?token=abc&EIO=4&transport=websocket"
        );
    }

    #[test]
    fn transports_default_to_polling_and_websocket() {
        let options = ClientOptions::default();
        assert!(options.allows_polling());
        assert!(options.allows_websocket());

        let options = options.transports(["websocket"]);
        assert!(!options.allows_polling());
        assert!(options.allows_websocket());
    }

    #[test]
    fn rejects_unknown_schemes() {
        let err = SocketIoConfig::new("ftp://example.com").resolve_url().unwrap_err();
        assert!(matches!(err, SocketError::InvalidEndpoint { .. }));
    }

    #[test]
    fn options_endpoint_builds_its_own_origin() {
        let options = ClientOptions {
            hostname: Some("example.com".to_string()),
            port: Some(4443),
            secure: true,
            ..ClientOptions::default()
        };
        let config = SocketIoConfig::new(options.clone())
            .with_options(ClientOptions::default().auto_connect(false));

        assert_eq!(
            config.resolve_url().unwrap().as_str(),
            "https://example.com:4443/socket.io/"
        );
        assert_eq!(config.namespace(), "/");
        // The endpoint record wins over the second options argument
        assert_eq!(config.effective_options(), options);
    }

    #[test]
    fn deserializes_string_endpoint() {
        let config = SocketIoConfig::from_json(
            r#"{"uri": "http://localhost:9999", "options": {"autoConnect": false, "transports": ["websocket"], "auth": {"token": "abc"}}}"#,
        )
        .unwrap();
        assert_eq!(config.uri, Endpoint::Uri("http://localhost:9999".to_string()));
        let options = config.effective_options();
        assert!(!options.auto_connect);
        assert!(options.reconnection);
        assert_eq!(options.transports, vec!["websocket".to_string()]);
        assert_eq!(options.auth, Some(serde_json::json!({"token": "abc"})));
    }

    #[test]
    fn deserializes_object_endpoint() {
        let config =
            SocketIoConfig::from_json(r#"{"uri": {"hostname": "example.com", "port": 3000}}"#)
                .unwrap();
        let Endpoint::Options(options) = &config.uri else {
            panic!("expected an options endpoint");
        };
        assert_eq!(options.hostname.as_deref(), Some("example.com"));
        assert_eq!(options.port, Some(3000));
        assert!(options.auto_connect);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = SocketIoConfig::from_json("{").unwrap_err();
        assert!(matches!(err, SocketError::InvalidConfig { .. }));
    }
}
