use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One framed protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Command sent by either side
    Request(Request),
    /// Reply to an earlier request
    Response(Response),
    /// Unsolicited notification
    Event(Event),
}

/// `{type:"request", seq, command, arguments}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sender's sequence number
    pub seq: i64,
    /// Command name
    pub command: String,
    /// Command arguments
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

/// `{type:"response", seq, requestSeq, success, command, message, body}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Sender's sequence number
    pub seq: i64,
    /// `seq` of the request this answers
    pub request_seq: i64,
    /// Whether the request succeeded
    pub success: bool,
    /// Command of the request this answers
    pub command: String,
    /// Failure detail; empty on success
    #[serde(default)]
    pub message: String,
    /// Result payload
    #[serde(default = "empty_object")]
    pub body: Value,
}

/// `{type:"event", seq, event, body}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sender's sequence number
    pub seq: i64,
    /// Event name
    pub event: String,
    /// Event payload
    #[serde(default = "empty_object")]
    pub body: Value,
}

/// Empty JSON object, the default `arguments`/`body`.
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Request {
    /// String argument, treating empty strings as absent.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    }

    /// Integer argument.
    pub fn int_arg(&self, key: &str) -> Option<i64> {
        self.arguments.get(key).and_then(Value::as_i64)
    }

    /// Boolean argument; absent means `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.arguments
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Classification of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Well-formed message
    Message(Message),
    /// Frame whose `type` is not one of the three message kinds
    Unknown {
        /// `seq` of the frame, `0` when absent
        seq: i64,
        /// `command` of the frame, empty when absent
        command: String,
    },
    /// Frame of a known kind whose fields could not be decoded
    Undecodable {
        /// Decoder error
        reason: String,
    },
}

impl Incoming {
    /// Classify a decoded JSON frame.
    pub fn classify(raw: Value) -> Incoming {
        let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();
        if !matches!(kind, "request" | "response" | "event") {
            return Incoming::Unknown {
                seq: raw.get("seq").and_then(Value::as_i64).unwrap_or(0),
                command: raw
                    .get("command")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            };
        }
        match serde_json::from_value::<Message>(raw) {
            Ok(message) => Incoming::Message(message),
            Err(err) => Incoming::Undecodable {
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults_arguments() {
        let incoming = Incoming::classify(json!({"type": "request", "seq": 3, "command": "threads"}));
        let Incoming::Message(Message::Request(request)) = incoming else {
            panic!("expected request, got {:?}", incoming);
        };
        assert_eq!(request.seq, 3);
        assert_eq!(request.arguments, json!({}));
    }

    #[test]
    fn response_serializes_camel_case_with_type_tag() {
        let message = Message::Response(Response {
            seq: 1,
            request_seq: 0,
            success: true,
            command: "evaluate".into(),
            message: String::new(),
            body: json!({}),
        });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "response");
        assert_eq!(value["requestSeq"], 0);
        assert_eq!(value["message"], "");
    }

    #[test]
    fn unknown_type_is_classified_with_seq() {
        let incoming = Incoming::classify(json!({"type": "bogus", "seq": 9, "command": "x"}));
        assert_eq!(
            incoming,
            Incoming::Unknown {
                seq: 9,
                command: "x".into()
            }
        );
    }

    #[test]
    fn request_missing_command_is_undecodable() {
        let incoming = Incoming::classify(json!({"type": "request", "seq": 1}));
        assert!(matches!(incoming, Incoming::Undecodable { .. }));
    }

    #[test]
    fn empty_string_arguments_count_as_absent() {
        let request = Request {
            seq: 0,
            command: "launch".into(),
            arguments: json!({"code": "", "scriptPath": "a.rws"}),
        };
        assert_eq!(request.str_arg("code"), None);
        assert_eq!(request.str_arg("scriptPath"), Some("a.rws"));
    }
}
