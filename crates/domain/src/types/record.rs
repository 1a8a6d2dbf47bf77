//! Record and payload types
//!
//! The record store hands out records as `{ id, createdTime, fields }`. The
//! cache stores a flattened *payload*: the record's fields plus its `id`,
//! with null fields dropped. Callers deserialize payloads into their own
//! result schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flattened, string-keyed record state as held in the cache.
pub type Payload = serde_json::Map<String, Value>;

/// Payload key holding the record id.
pub const ID_FIELD: &str = "id";

const FIELDS_KEY: &str = "fields";
const CREATED_TIME_KEY: &str = "createdTime";

/// A record as returned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: Payload,
}

impl Record {
    /// Create a record with no creation timestamp.
    pub fn new(id: impl Into<String>, fields: Payload) -> Self {
        Self { id: id.into(), created_time: None, fields }
    }

    /// Rebuild a record from a flattened payload.
    ///
    /// Accepts either the store shape (`{ "id", "createdTime", "fields": { .. } }`)
    /// or an already flattened payload; `fallback_id` is used when the
    /// payload carries no `id` of its own. A payload is only read as the
    /// store shape when `fields` is an object and nothing but `id` and
    /// `createdTime` sits beside it; otherwise `fields` is an ordinary field.
    pub fn from_payload(mut payload: Payload, fallback_id: &str) -> Self {
        let id = match payload.remove(ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => fallback_id.to_string(),
        };

        let store_shape = matches!(payload.get(FIELDS_KEY), Some(Value::Object(_)))
            && payload.keys().all(|key| key == FIELDS_KEY || key == CREATED_TIME_KEY);
        if !store_shape {
            return Self::new(id, payload);
        }

        let created_time = payload
            .get(CREATED_TIME_KEY)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|time| time.with_timezone(&Utc));
        let fields = match payload.remove(FIELDS_KEY) {
            Some(Value::Object(fields)) => fields,
            _ => Payload::new(),
        };

        Self { id, created_time, fields }
    }

    /// Normalize into the payload shape stored in the cache.
    pub fn into_payload(self) -> Payload {
        let mut payload: Payload =
            self.fields.into_iter().filter(|(_, value)| !value.is_null()).collect();
        payload.insert(ID_FIELD.to_string(), Value::String(self.id));
        payload
    }
}

/// The `id` carried by a payload, if any.
pub fn payload_id(payload: &Payload) -> Option<&str> {
    payload.get(ID_FIELD).and_then(Value::as_str)
}

/// Ids referenced through `field`.
///
/// A relationship value is either a single id string or a list of id
/// strings; anything else (numbers, nested objects, empty strings) is
/// ignored.
pub fn relationship_ids<'a>(payload: &'a Payload, field: &str) -> Vec<&'a str> {
    match payload.get(field) {
        Some(Value::String(id)) if !id.is_empty() => vec![id.as_str()],
        Some(Value::Array(items)) => {
            items.iter().filter_map(Value::as_str).filter(|id| !id.is_empty()).collect()
        }
        _ => Vec::new(),
    }
}

/// Whether `field` holds exactly the string `value`.
pub fn field_equals(payload: &Payload, field: &str, value: &str) -> bool {
    payload.get(field).and_then(Value::as_str) == Some(value)
}
