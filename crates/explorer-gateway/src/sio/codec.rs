//! Engine.IO / Socket.IO text framing over a WebSocket.
//!
//! Only the pieces the gateway speaks are modelled: the open handshake,
//! ping and pong, and Socket.IO connect, disconnect, event and ack
//! packets on the default namespace. Binary attachments are not supported.

use serde_json::Value;
use thiserror::Error;

/// Engine.IO protocol revision negotiated through the `EIO` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineVersion {
    /// The client pings, the server connects the namespace right away.
    V3,
    /// The server pings, the client asks to connect the namespace.
    V4,
}

impl EngineVersion {
    pub fn from_param(eio: Option<&str>) -> Option<Self> {
        match eio {
            None | Some("3") => Some(Self::V3),
            Some("4") => Some(Self::V4),
            _ => None,
        }
    }
}

/// Decoded inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Engine.IO `1`
    Close,
    /// Engine.IO `2`, with an optional probe payload
    Ping(String),
    /// Engine.IO `3`
    Pong,
    /// Engine.IO `6`
    Noop,
    /// Socket.IO `0`
    Connect,
    /// Socket.IO `1`
    Disconnect,
    /// Socket.IO `2`: `name` is the first array element.
    Event {
        ack: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("unsupported engine packet '{0}'")]
    UnsupportedEngine(char),
    #[error("unsupported socket packet '{0}'")]
    UnsupportedSocket(char),
    #[error("malformed event payload: {0}")]
    Payload(String),
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<Inbound, CodecError> {
    let mut chars = text.chars();
    let engine = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();
    match engine {
        '1' => Ok(Inbound::Close),
        '2' => Ok(Inbound::Ping(rest.to_string())),
        '3' => Ok(Inbound::Pong),
        '6' => Ok(Inbound::Noop),
        '4' => decode_socket(rest),
        other => Err(CodecError::UnsupportedEngine(other)),
    }
}

fn decode_socket(text: &str) -> Result<Inbound, CodecError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = strip_default_namespace(chars.as_str());
    match kind {
        '0' => Ok(Inbound::Connect),
        '1' => Ok(Inbound::Disconnect),
        '2' => {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            let (id, payload) = rest.split_at(digits);
            let ack = if id.is_empty() {
                None
            } else {
                Some(id.parse::<u64>().map_err(|e| CodecError::Payload(e.to_string()))?)
            };
            let mut args: Vec<Value> =
                serde_json::from_str(payload).map_err(|e| CodecError::Payload(e.to_string()))?;
            if args.is_empty() {
                return Err(CodecError::Payload("missing event name".into()));
            }
            let name = match args.remove(0) {
                Value::String(s) => s,
                other => return Err(CodecError::Payload(format!("event name {}", other))),
            };
            Ok(Inbound::Event { ack, name, args })
        }
        other => Err(CodecError::UnsupportedSocket(other)),
    }
}

fn strip_default_namespace(s: &str) -> &str {
    s.strip_prefix("/,").unwrap_or(s)
}

/// Engine.IO open packet
pub fn open_packet(sid: &str, ping_interval_ms: u64, ping_timeout_ms: u64) -> String {
    let handshake = serde_json::json!({
        "sid": sid,
        "upgrades": [],
        "pingInterval": ping_interval_ms,
        "pingTimeout": ping_timeout_ms,
    });
    format!("0{}", handshake)
}

/// Namespace connect confirmation
pub fn connect_packet(version: EngineVersion, sid: &str) -> String {
    match version {
        EngineVersion::V3 => "40".to_string(),
        EngineVersion::V4 => format!("40{}", serde_json::json!({ "sid": sid })),
    }
}

pub const PING: &str = "2";

pub fn pong_packet(probe: &str) -> String {
    format!("3{}", probe)
}

/// `42["name",data]`
pub fn event_packet(name: &str, data: &Value) -> String {
    format!("42{}", Value::Array(vec![Value::String(name.to_string()), data.clone()]))
}

/// `43<id>[data]`
pub fn ack_packet(id: u64, data: &Value) -> String {
    format!("43{}{}", id, Value::Array(vec![data.clone()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_event_with_ack() {
        let frame = r#"4212["message",{"method":"getInfo","params":[]}]"#;
        assert_eq!(
            decode(frame).unwrap(),
            Inbound::Event {
                ack: Some(12),
                name: "message".into(),
                args: vec![json!({"method": "getInfo", "params": []})],
            }
        );
    }

    #[test]
    fn test_decode_subscribe_forms() {
        assert_eq!(
            decode(r#"42["subscribe","bitcoind/hashblock"]"#).unwrap(),
            Inbound::Event {
                ack: None,
                name: "subscribe".into(),
                args: vec![json!("bitcoind/hashblock")],
            }
        );
        let Inbound::Event { args, .. } =
            decode(r#"42["subscribe","bitcoind/addresstxid",["a","b"]]"#).unwrap()
        else {
            panic!("not an event");
        };
        assert_eq!(args, vec![json!("bitcoind/addresstxid"), json!(["a", "b"])]);
    }

    #[test]
    fn test_decode_control_packets() {
        assert_eq!(decode("2").unwrap(), Inbound::Ping(String::new()));
        assert_eq!(decode("2probe").unwrap(), Inbound::Ping("probe".into()));
        assert_eq!(decode("3").unwrap(), Inbound::Pong);
        assert_eq!(decode("40").unwrap(), Inbound::Connect);
        assert_eq!(decode("41").unwrap(), Inbound::Disconnect);
        assert_eq!(decode("1").unwrap(), Inbound::Close);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(""), Err(CodecError::Empty));
        assert_eq!(decode("5"), Err(CodecError::UnsupportedEngine('5')));
        assert!(matches!(decode("42[]"), Err(CodecError::Payload(_))));
        assert!(matches!(decode("42[1]"), Err(CodecError::Payload(_))));
        assert!(matches!(decode("42{"), Err(CodecError::Payload(_))));
    }

    #[test]
    fn test_encode() {
        assert_eq!(
            event_packet("bitcoind/hashblock", &json!("00ab")),
            r#"42["bitcoind/hashblock","00ab"]"#
        );
        assert_eq!(ack_packet(7, &json!({"result": 1})), r#"437[{"result":1}]"#);
        assert_eq!(connect_packet(EngineVersion::V3, "x"), "40");
        assert_eq!(connect_packet(EngineVersion::V4, "x"), r#"40{"sid":"x"}"#);
        let open = open_packet("abc", 25_000, 60_000);
        assert!(open.starts_with("0{"));
        let v: Value = serde_json::from_str(&open[1..]).unwrap();
        assert_eq!(v["sid"], "abc");
        assert_eq!(v["pingInterval"], 25_000);
        assert_eq!(v["upgrades"], json!([]));
    }
}
