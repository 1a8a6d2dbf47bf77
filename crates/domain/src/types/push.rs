//! Push notifications sent by the record store when a record changes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityKind;
use super::record::{Payload, Record};

/// Change notification delivered by the source system.
///
/// A notification with a `record` carries the record's new state; one
/// without a record only says that `record_id` changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Payload>,
    pub record_id: String,
    pub timestamp: DateTime<Utc>,
}

impl PushNotification {
    /// The record state carried by this notification, if any.
    pub fn into_record(self) -> Option<Record> {
        let record_id = self.record_id;
        self.record.map(|payload| Record::from_payload(payload, &record_id))
    }
}
