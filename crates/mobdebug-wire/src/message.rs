//! Shapes of the JSON messages exchanged with the debuggee.
//!
//! Messages stay `serde_json::Value`s end to end: the adapter only looks at
//! `type`, `seq`, `request_seq` and `command` and relays everything else
//! untouched.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    Event,
}

impl MessageKind {
    pub fn of(message: &Value) -> Option<Self> {
        match message.get("type").and_then(Value::as_str)? {
            "request" => Some(Self::Request),
            "response" => Some(Self::Response),
            "event" => Some(Self::Event),
            _ => None,
        }
    }
}

pub fn seq(message: &Value) -> Option<i64> {
    message.get("seq").and_then(Value::as_i64)
}

pub fn request_seq(message: &Value) -> Option<i64> {
    message.get("request_seq").and_then(Value::as_i64)
}

pub fn command(message: &Value) -> Option<&str> {
    message.get("command").and_then(Value::as_str)
}

/// Build `{seq, type: "request", command, arguments?}`.
pub fn request(seq: i64, command: &str, arguments: Option<Value>) -> Value {
    let mut message = Map::new();
    message.insert("seq".to_owned(), json!(seq));
    message.insert("type".to_owned(), json!("request"));
    message.insert("command".to_owned(), json!(command));
    if let Some(arguments) = arguments {
        message.insert("arguments".to_owned(), arguments);
    }
    Value::Object(message)
}
