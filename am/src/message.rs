//! Message type keys and the recognized payload fields
//!
//! Both the event hub and the pending table are partitioned by a
//! [`MessageType`]. The default strategies read it (and the correlation
//! fields) out of a JSON payload shaped like:
//!
//! ```text
//! { "requestId"?: string, "scope"?: string, "type"?: key, "method"?: key, "data"?: any }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Field carrying the correlation id
pub const REQUEST_ID_FIELD: &str = "requestId";

/// Field carrying the channel discriminator
pub const SCOPE_FIELD: &str = "scope";

/// Primary field carrying the message type
pub const TYPE_FIELD: &str = "type";

/// Fallback field carrying the message type
pub const METHOD_FIELD: &str = "method";

/// Field carrying the message body
pub const DATA_FIELD: &str = "data";

/// Partition key for listeners and pending requests
///
/// Two messages match only if their keys are equal by value. A `Symbol` is a
/// process-unique token that never equals any name or code.
///
/// Codes are `i64`. A wire number outside that range (a large `u64`) or with
/// a fractional part is not a key, so such a payload has no message type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageType {
    Name(String),
    Code(i64),
    Symbol(Uuid),
}

impl MessageType {
    /// Create a fresh token that no payload field can ever produce
    pub fn symbol() -> Self {
        MessageType::Symbol(Uuid::now_v7())
    }

    /// Read a key from a JSON value
    ///
    /// Non-empty strings become names and numbers representable as `i64`
    /// become codes. Everything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(MessageType::Name(s.clone())),
            Value::Number(n) => n.as_i64().map(MessageType::Code),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Name(name) => write!(f, "{}", name),
            MessageType::Code(code) => write!(f, "{}", code),
            MessageType::Symbol(id) => write!(f, "Symbol({})", id),
        }
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        MessageType::Name(name.to_string())
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        MessageType::Name(name)
    }
}

impl From<&String> for MessageType {
    fn from(name: &String) -> Self {
        MessageType::Name(name.clone())
    }
}

impl From<i64> for MessageType {
    fn from(code: i64) -> Self {
        MessageType::Code(code)
    }
}

impl From<&MessageType> for MessageType {
    fn from(message_type: &MessageType) -> Self {
        message_type.clone()
    }
}

/// One or more message types, as accepted by `on` / `off`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTypes(Vec<MessageType>);

impl MessageTypes {
    pub fn iter(&self) -> std::slice::Iter<'_, MessageType> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<MessageType> for MessageTypes {
    fn from(message_type: MessageType) -> Self {
        MessageTypes(vec![message_type])
    }
}

impl From<&MessageType> for MessageTypes {
    fn from(message_type: &MessageType) -> Self {
        MessageTypes(vec![message_type.clone()])
    }
}

impl From<&str> for MessageTypes {
    fn from(name: &str) -> Self {
        MessageTypes(vec![name.into()])
    }
}

impl From<String> for MessageTypes {
    fn from(name: String) -> Self {
        MessageTypes(vec![name.into()])
    }
}

impl From<i64> for MessageTypes {
    fn from(code: i64) -> Self {
        MessageTypes(vec![code.into()])
    }
}

impl<T: Into<MessageType>> From<Vec<T>> for MessageTypes {
    fn from(types: Vec<T>) -> Self {
        MessageTypes(types.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<MessageType>, const N: usize> From<[T; N]> for MessageTypes {
    fn from(types: [T; N]) -> Self {
        MessageTypes(types.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a MessageTypes {
    type Item = &'a MessageType;
    type IntoIter = std::slice::Iter<'a, MessageType>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Read the message type: `type` first, then `method`
pub fn message_type_of(payload: &Value) -> Option<MessageType> {
    payload
        .get(TYPE_FIELD)
        .and_then(MessageType::from_value)
        .or_else(|| payload.get(METHOD_FIELD).and_then(MessageType::from_value))
}

/// Read the `requestId` field if it is a string
pub fn request_id_of(payload: &Value) -> Option<String> {
    string_field(payload, REQUEST_ID_FIELD)
}

/// Read the `scope` field if it is a string
pub fn scope_of(payload: &Value) -> Option<String> {
    string_field(payload, SCOPE_FIELD)
}

/// Generate a fresh correlation id
pub fn new_request_id() -> String {
    Uuid::now_v7().to_string()
}

fn string_field(payload: &Value, field: &str) -> Option<String> {
    payload.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_preferred_over_method() {
        let payload = json!({"type": "ping", "method": "other"});
        assert_eq!(message_type_of(&payload), Some(MessageType::from("ping")));
    }

    #[test]
    fn test_method_fallback() {
        let payload = json!({"method": "getUser"});
        assert_eq!(message_type_of(&payload), Some(MessageType::from("getUser")));

        let payload = json!({"type": "", "method": 7});
        assert_eq!(message_type_of(&payload), Some(MessageType::Code(7)));
    }

    #[test]
    fn test_missing_or_unusable_type() {
        assert_eq!(message_type_of(&json!({})), None);
        assert_eq!(message_type_of(&json!({"type": null})), None);
        assert_eq!(message_type_of(&json!({"type": {"nested": true}})), None);
        assert_eq!(message_type_of(&json!({"type": 1.5})), None);
        assert_eq!(message_type_of(&json!({"type": u64::MAX})), None);
        assert_eq!(message_type_of(&json!({"type": 2.0})), None);
        assert_eq!(
            message_type_of(&json!({"type": i64::MIN})),
            Some(MessageType::Code(i64::MIN))
        );
        assert_eq!(message_type_of(&json!("not an object")), None);
    }

    #[test]
    fn test_request_id_and_scope_must_be_strings() {
        let payload = json!({"requestId": "abc", "scope": "frame-1"});
        assert_eq!(request_id_of(&payload).as_deref(), Some("abc"));
        assert_eq!(scope_of(&payload).as_deref(), Some("frame-1"));

        let payload = json!({"requestId": 42, "scope": null});
        assert_eq!(request_id_of(&payload), None);
        assert_eq!(scope_of(&payload), None);
    }

    #[test]
    fn test_symbols_are_unique() {
        let a = MessageType::symbol();
        let b = MessageType::symbol();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(a.to_string().starts_with("Symbol("));
    }

    #[test]
    fn test_name_and_code_never_collide() {
        assert_ne!(MessageType::from("1"), MessageType::from(1));
    }

    #[test]
    fn test_message_types_conversions() {
        let one: MessageTypes = "ping".into();
        assert_eq!(one.len(), 1);

        let many: MessageTypes = ["a", "b", "c"].into();
        assert_eq!(many.len(), 3);

        let empty: MessageTypes = Vec::<MessageType>::new().into();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(new_request_id(), new_request_id());
    }
}
