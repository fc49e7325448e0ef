use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Known message types. The set is open: unrecognized values are carried
/// through untouched for forward compatibility.
pub mod types {
    pub const HEARTBEAT: &str = "HEARTBEAT";
    pub const PAIRING_REQUEST: &str = "PAIRING_REQUEST";
    pub const PAIRING_RESPONSE: &str = "PAIRING_RESPONSE";
    pub const NOTIFICATION: &str = "NOTIFICATION";
    pub const NOTIFICATION_ACTION: &str = "NOTIFICATION_ACTION";
    pub const SMS_LIST: &str = "SMS_LIST";
    pub const SMS_MESSAGES: &str = "SMS_MESSAGES";
    pub const SMS_SEND: &str = "SMS_SEND";
    pub const SMS_RECEIVED: &str = "SMS_RECEIVED";
    pub const CALL_STATE: &str = "CALL_STATE";
    pub const CALL_ACTION: &str = "CALL_ACTION";
    pub const CALL_DIAL: &str = "CALL_DIAL";
    pub const SIM_LIST: &str = "SIM_LIST";
    pub const SIM_LIST_REQUEST: &str = "SIM_LIST_REQUEST";
    pub const CLIPBOARD: &str = "CLIPBOARD";
    pub const FILE_OFFER: &str = "FILE_OFFER";
    pub const FILE_ACCEPT: &str = "FILE_ACCEPT";
    pub const FILE_CHUNK: &str = "FILE_CHUNK";
    pub const FILE_COMPLETE: &str = "FILE_COMPLETE";
    pub const ERROR: &str = "ERROR";
}

/// The wire-level message unit exchanged over a session.
///
/// `id` uniquely identifies a message instance; `data` is a string-keyed map
/// of loosely typed values whose schema belongs to the feature that owns the
/// message type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

fn default_version() -> u32 {
    1
}

impl Envelope {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            message_type: message_type.into(),
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            data: Map::new(),
        }
    }

    pub fn with_data(message_type: impl Into<String>, data: Map<String, Value>) -> Self {
        let mut envelope = Self::new(message_type);
        envelope.data = data;
        envelope
    }

    /// Builder-style insertion for reply construction.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn data_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Envelope(type: {}, id: {})", self.message_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_with_mixed_data() {
        let mut data = Map::new();
        data.insert("text".to_string(), json!("hello"));
        data.insert("count".to_string(), json!(42));
        data.insert("ratio".to_string(), json!(0.5));
        data.insert("flag".to_string(), json!(true));
        data.insert("nested".to_string(), json!({"inner": "value"}));
        let envelope = Envelope::with_data(types::NOTIFICATION, data);

        let json = envelope.to_json().unwrap();
        let back = Envelope::from_json(&json).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn test_empty_data_is_omitted_and_restored() {
        let envelope = Envelope::new(types::HEARTBEAT);
        let json = envelope.to_json().unwrap();
        assert!(!json.contains("\"data\""));
        let back = Envelope::from_json(&json).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn test_type_field_wire_name() {
        let envelope = Envelope::new(types::CLIPBOARD);
        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"type\":\"CLIPBOARD\""));
    }

    #[test]
    fn test_missing_type_fails_decode() {
        let result = Envelope::from_json(r#"{"version":1,"id":"x","timestamp":0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_version_defaults_to_one() {
        let envelope =
            Envelope::from_json(r#"{"type":"HEARTBEAT","id":"x","timestamp":5}"#).unwrap();
        assert_eq!(envelope.version, 1);
        assert_eq!(envelope.timestamp, 5);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Envelope::new(types::HEARTBEAT);
        let b = Envelope::new(types::HEARTBEAT);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_data_accessors() {
        let envelope = Envelope::new(types::PAIRING_REQUEST)
            .set("code", "482913")
            .set("retries", 3)
            .set("trusted", true);
        assert_eq!(envelope.data_str("code"), Some("482913"));
        assert_eq!(envelope.data_i64("retries"), Some(3));
        assert_eq!(envelope.data_bool("trusted"), Some(true));
        assert_eq!(envelope.data_str("missing"), None);
    }
}
