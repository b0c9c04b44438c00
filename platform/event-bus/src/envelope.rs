//! # Event Envelope
//!
//! The one message shape carried over the broker by every service.
//!
//! ## Envelope Fields
//!
//! - `eventType`: dot-namespaced event name; the first segment is the owning domain
//! - `data`: full current state of the affected entity (not a diff)
//! - `timestamp`: ISO 8601 emission time, set by the publisher
//! - `service`: name of the emitting service, for diagnostics
//!
//! The same string is used as the routing key, so consumers can bind to an
//! exact event (`order.ready`) or a whole domain (`delivery.#`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::BusError;

/// Standard event envelope
///
/// # Examples
///
/// ```rust
/// use event_bus::EventEnvelope;
/// use serde_json::json;
///
/// let envelope = EventEnvelope::new(
///     "order.ready",
///     json!({ "id": "o1", "delivery_address": "123 Main St" }),
///     "order-service",
/// );
///
/// assert_eq!(envelope.domain(), "order");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<T = Value> {
    /// Event name, also the routing key
    pub event_type: String,

    /// Entity snapshot
    pub data: T,

    /// When the publisher built the envelope
    #[serde(with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,

    /// Emitting service (e.g., "order-service")
    pub service: String,
}

impl<T> EventEnvelope<T> {
    /// Create a new envelope stamped with the current time
    pub fn new(event_type: impl Into<String>, data: T, service: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
            service: service.into(),
        }
    }

    /// Override the timestamp (useful for testing)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Owning domain, i.e. the first segment of the event type
    pub fn domain(&self) -> &str {
        self.event_type
            .split('.')
            .next()
            .unwrap_or(self.event_type.as_str())
    }

    /// Whether this event belongs to `domain`'s namespace
    pub fn is_owned_by(&self, domain: &str) -> bool {
        self.domain() == domain && self.event_type.len() > domain.len()
    }
}

impl<T: Serialize> EventEnvelope<T> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, BusError> {
        serde_json::to_vec(self).map_err(|e| BusError::SerializationError(e.to_string()))
    }
}

impl EventEnvelope<Value> {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BusError> {
        serde_json::from_slice(bytes).map_err(|e| BusError::SerializationError(e.to_string()))
    }

    /// Decode `data` into a typed snapshot
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Read an entity id sent as either a JSON number or a string
///
/// Orders and restaurants have serial ids; the other services keep ids as
/// text. For use with `#[serde(deserialize_with = "...")]`.
pub fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(d)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    })
}

/// Validate the four envelope fields on a raw JSON value
///
/// # Validation Rules
///
/// - `eventType`: non-empty string with at least two dot-separated segments
/// - `data`: must be present (any JSON value)
/// - `timestamp`: RFC 3339 string
/// - `service`: non-empty string
pub fn validate_envelope_fields(envelope: &Value) -> Result<(), String> {
    let event_type = envelope
        .get("eventType")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid eventType")?;

    if event_type.split('.').count() < 2 || event_type.split('.').any(str::is_empty) {
        return Err(format!("eventType '{event_type}' must be <domain>.<action>"));
    }

    if envelope.get("data").is_none() {
        return Err("Missing data".to_string());
    }

    let timestamp = envelope
        .get("timestamp")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid timestamp")?;

    DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| format!("timestamp is not ISO 8601: {e}"))?;

    let service = envelope
        .get("service")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid service")?;

    if service.is_empty() {
        return Err("service cannot be empty".to_string());
    }

    Ok(())
}

/// `2024-01-01T00:00:00.000Z`, the shape JavaScript's `toISOString` produces
mod rfc3339_millis {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Snapshot {
        #[serde(deserialize_with = "string_or_number")]
        id: String,
    }

    #[test]
    fn test_ids_accept_strings_and_numbers() {
        let text: Snapshot = serde_json::from_value(json!({"id": "o1"})).unwrap();
        assert_eq!(text.id, "o1");

        let number: Snapshot = serde_json::from_value(json!({"id": 12})).unwrap();
        assert_eq!(number.id, "12");

        assert!(serde_json::from_value::<Snapshot>(json!({"id": true})).is_err());
    }

    #[test]
    fn test_envelope_creation() {
        let envelope = EventEnvelope::new("order.created", json!({"id": 1}), "order-service");

        assert_eq!(envelope.event_type, "order.created");
        assert_eq!(envelope.service, "order-service");
        assert_eq!(envelope.domain(), "order");
        assert!(envelope.is_owned_by("order"));
        assert!(!envelope.is_owned_by("delivery"));
    }

    #[test]
    fn test_wire_format_uses_camel_case() {
        let timestamp = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let envelope = EventEnvelope::new("delivery.created", json!({"orderId": "o1"}), "delivery-service")
            .with_timestamp(timestamp);

        let wire: Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

        assert_eq!(
            wire,
            json!({
                "eventType": "delivery.created",
                "data": {"orderId": "o1"},
                "timestamp": "2024-01-01T00:00:00.000Z",
                "service": "delivery-service"
            })
        );
    }

    #[test]
    fn test_decodes_envelope_from_other_publishers() {
        // Shape emitted by the JavaScript services
        let raw = br#"{
            "eventType": "order.ready",
            "data": {"id": 42, "delivery_address": "123 Main St"},
            "timestamp": "2025-03-01T12:30:45.123Z",
            "service": "order-service"
        }"#;

        let envelope = EventEnvelope::from_bytes(raw).unwrap();
        assert_eq!(envelope.event_type, "order.ready");
        assert_eq!(envelope.data["id"], 42);
        assert_eq!(envelope.timestamp.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_prefix_alone_is_not_owned() {
        let envelope = EventEnvelope::new("order", json!({}), "order-service");
        assert!(!envelope.is_owned_by("order"));
    }

    #[test]
    fn test_validate_envelope_fields_valid() {
        let envelope = json!({
            "eventType": "rating.created",
            "data": {},
            "timestamp": "2024-01-01T00:00:00Z",
            "service": "rating-service"
        });

        assert!(validate_envelope_fields(&envelope).is_ok());
    }

    #[test]
    fn test_validate_envelope_fields_missing_data() {
        let envelope = json!({
            "eventType": "rating.created",
            "timestamp": "2024-01-01T00:00:00Z",
            "service": "rating-service"
        });

        assert!(validate_envelope_fields(&envelope).is_err());
    }

    #[test]
    fn test_validate_envelope_fields_bad_event_type() {
        for event_type in ["rating", "rating.", ".created", ""] {
            let envelope = json!({
                "eventType": event_type,
                "data": {},
                "timestamp": "2024-01-01T00:00:00Z",
                "service": "rating-service"
            });
            assert!(validate_envelope_fields(&envelope).is_err(), "{event_type}");
        }
    }

    #[test]
    fn test_validate_envelope_fields_empty_service() {
        let envelope = json!({
            "eventType": "rating.created",
            "data": {},
            "timestamp": "2024-01-01T00:00:00Z",
            "service": ""
        });

        assert!(validate_envelope_fields(&envelope).is_err());
    }
}
