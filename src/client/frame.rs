//! Socket.IO v5 packets carried over Engine.IO v4 text frames.
//!
//! A text frame starts with the Engine.IO packet type (`0` open, `1` close,
//! `2` ping, `3` pong, `4` message). Message frames carry a Socket.IO packet:
//! its type digit, an optional `/namespace,` prefix, an optional ack id and a
//! JSON body, e.g. `42["response",{"text":"hi"}]`.

use serde_json::Value;

use crate::error::SocketError;

/// An event name and its first argument
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: String,
    pub data: Option<Value>,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// The JSON argument list: the event name, then the data when present
    pub fn to_args(&self) -> Value {
        let mut items = vec![Value::String(self.event.clone())];
        if let Some(data) = &self.data {
            items.push(data.clone());
        }
        Value::Array(items)
    }

    /// Read an argument list. Arguments after the first are ignored.
    pub fn from_args(args: Value) -> Result<Self, SocketError> {
        let Value::Array(items) = args else {
            return Err(malformed("event arguments must be a JSON array"));
        };
        let mut items = items.into_iter();
        match items.next() {
            Some(Value::String(event)) => Ok(Self {
                event,
                data: items.next(),
            }),
            Some(other) => Err(malformed(format!(
                "event name must be a string, got {other}"
            ))),
            None => Err(malformed("missing event name")),
        }
    }
}

/// One decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake sent by the server (`sid`, `pingInterval`, ...)
    Open(Value),
    Close,
    Ping,
    Pong,
    /// Namespace connect request (client) or acknowledgement (server)
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        frame: Frame,
    },
    /// The server refused the namespace connect
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl Packet {
    pub fn event(namespace: &str, frame: Frame) -> Self {
        Packet::Event {
            namespace: namespace.to_string(),
            frame,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!("0{handshake}"),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Connect { namespace, data } => {
                format!("40{}{}", namespace_prefix(namespace), json_or_empty(data))
            }
            Packet::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
            Packet::Event { namespace, frame } => {
                format!("42{}{}", namespace_prefix(namespace), frame.to_args())
            }
            Packet::ConnectError { namespace, data } => {
                format!("44{}{}", namespace_prefix(namespace), json_or_empty(data))
            }
        }
    }

    pub fn decode(text: &str) -> Result<Self, SocketError> {
        let (kind, rest) = split_type(text).ok_or_else(|| malformed("empty frame"))?;
        match kind {
            '0' => Ok(Packet::Open(parse_json(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_message(rest),
            other => Err(malformed(format!("unknown engine packet type '{other}'"))),
        }
    }
}

fn decode_message(text: &str) -> Result<Packet, SocketError> {
    let (kind, mut rest) = split_type(text).ok_or_else(|| malformed("empty message"))?;

    let namespace = if rest.starts_with('/') {
        let end = rest.find(',').unwrap_or(rest.len());
        let namespace = rest[..end].to_string();
        rest = rest.get(end + 1..).unwrap_or("");
        namespace
    } else {
        "/".to_string()
    };

    // Ack ids are not used, skip them
    let body = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    let data = if body.is_empty() {
        None
    } else {
        Some(parse_json(body)?)
    };

    match kind {
        '0' => Ok(Packet::Connect { namespace, data }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let args = data.ok_or_else(|| malformed("event without arguments"))?;
            Ok(Packet::Event {
                namespace,
                frame: Frame::from_args(args)?,
            })
        }
        '4' => Ok(Packet::ConnectError { namespace, data }),
        other => Err(malformed(format!(
            "unsupported socket packet type '{other}'"
        ))),
    }
}

fn split_type(text: &str) -> Option<(char, &str)> {
    let kind = text.chars().next()?;
    Some((kind, &text[kind.len_utf8()..]))
}

fn parse_json(text: &str) -> Result<Value, SocketError> {
    serde_json::from_str(text).map_err(|e| malformed(e.to_string()))
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == "/" {
        String::new()
    } else {
        format!("{namespace},")
    }
}

fn json_or_empty(data: &Option<Value>) -> String {
    data.as_ref().map(Value::to_string).unwrap_or_default()
}

fn malformed(reason: impl Into<String>) -> SocketError {
    SocketError::MalformedPacket(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn encodes_events_for_the_default_namespace() {
        let packet = Packet::event("/", Frame::new("ping", Some(json!({"n": 1}))));
        assert_eq!(packet.encode(), r#"42["ping",{"n":1}]"#);
        assert_eq!(
            Packet::event("/", Frame::new("ping", None)).encode(),
            r#"42["ping"]"#
        );
    }

    #[test]
    fn encodes_namespaced_packets() {
        let connect = Packet::Connect {
            namespace: "/admin".to_string(),
            data: Some(json!({"token": "abc"})),
        };
        assert_eq!(connect.encode(), r#"40/admin,{"token":"abc"}"#);

        let event = Packet::event("/admin", Frame::new("message", Some(json!("hi"))));
        assert_eq!(event.encode(), r#"42/admin,["message","hi"]"#);
    }

    #[rstest]
    #[case("2", Packet::Ping)]
    #[case("3", Packet::Pong)]
    #[case("1", Packet::Close)]
    #[case("40", Packet::Connect { namespace: "/".to_string(), data: None })]
    #[case("41/admin,", Packet::Disconnect { namespace: "/admin".to_string() })]
    #[case(
        r#"40{"sid":"abc"}"#,
        Packet::Connect { namespace: "/".to_string(), data: Some(json!({"sid": "abc"})) }
    )]
    #[case(
        r#"44{"message":"Not authorized"}"#,
        Packet::ConnectError { namespace: "/".to_string(), data: Some(json!({"message": "Not authorized"})) }
    )]
    fn decodes_control_packets(#[case] text: &str, #[case] expected: Packet) {
        assert_eq!(Packet::decode(text).unwrap(), expected);
    }

    #[test]
    fn decodes_the_handshake() {
        let packet = Packet::decode(r#"0{"sid":"s1","pingInterval":25000}"#).unwrap();
        let Packet::Open(handshake) = packet else {
            panic!("expected an open packet");
        };
        assert_eq!(handshake["pingInterval"], json!(25000));
    }

    #[test]
    fn decodes_events_with_namespace_and_ack_id() {
        let packet = Packet::decode(r#"42/chat,17["response",{"text":"hi","rnd":4},"extra"]"#)
            .unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                namespace: "/chat".to_string(),
                frame: Frame::new("response", Some(json!({"text": "hi", "rnd": 4}))),
            }
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        for text in ["", "9", "42", "42{}", "42[]", "42[7]", "4not json", "43[1]"] {
            assert!(
                matches!(Packet::decode(text), Err(SocketError::MalformedPacket(_))),
                "{text:?} should be rejected"
            );
        }
    }
}
