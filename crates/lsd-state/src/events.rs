//! # Transaction Events
//!
//! Append-only history of accepted transitions. Events are created once,
//! never mutated, and only removed wholesale by an administrative purge.
//! Timestamps have second resolution, so ties are broken by the
//! store-assigned sequence number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use lsd_core::{DeviceId, DeviceName};

/// Kind of state-changing action an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// A device registered.
    Register,
    /// A device renewed the rights window.
    Renew,
    /// A device returned the license.
    Return,
    /// An operator revoked the license.
    Revoke,
    /// An operator cancelled the license.
    Cancel,
}

impl EventType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Renew => "renew",
            Self::Return => "return",
            Self::Revoke => "revoke",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event type string outside the five known values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown event type {0:?}")]
pub struct UnknownEventType(pub String);

impl std::str::FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Register,
            Self::Renew,
            Self::Return,
            Self::Revoke,
            Self::Cancel,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
        .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// An event computed by the state machine, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// What happened.
    pub event_type: EventType,
    /// Acting device; `None` for operator actions.
    pub device_id: Option<DeviceId>,
    /// Acting device name; `None` for operator actions.
    pub device_name: Option<DeviceName>,
    /// When it happened, second precision.
    pub timestamp: DateTime<Utc>,
}

impl NewEvent {
    /// Event raised by a device action.
    pub fn device(
        event_type: EventType,
        device_id: DeviceId,
        device_name: DeviceName,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            device_id: Some(device_id),
            device_name: Some(device_name),
            timestamp: lsd_core::truncate_to_second(at),
        }
    }

    /// Event raised by an operator action.
    pub fn operator(event_type: EventType, at: DateTime<Utc>) -> Self {
        Self {
            event_type,
            device_id: None,
            device_name: None,
            timestamp: lsd_core::truncate_to_second(at),
        }
    }

    /// Attach the store-assigned sequence number and owning status.
    pub fn persisted(self, id: i64, license_status_id: Uuid) -> TransactionEvent {
        TransactionEvent {
            id,
            license_status_id,
            event_type: self.event_type,
            device_id: self.device_id,
            device_name: self.device_name,
            timestamp: self.timestamp,
        }
    }
}

/// A persisted, immutable transaction event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    /// Store-assigned insertion sequence.
    pub id: i64,
    /// Owning [`LicenseStatus`](crate::LicenseStatus) id.
    pub license_status_id: Uuid,
    /// What happened.
    pub event_type: EventType,
    /// Acting device, if any.
    pub device_id: Option<DeviceId>,
    /// Acting device name, if any.
    pub device_name: Option<DeviceName>,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Ordered read view over the events of one license status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<TransactionEvent>,
}

impl EventLog {
    /// An empty log. A status that was only ever queried has one of these.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a log from events in any order, sorted by timestamp then insertion.
    pub fn from_events(mut events: Vec<TransactionEvent>) -> Self {
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Self { events }
    }

    /// Events in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &TransactionEvent> {
        self.events.iter()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log has no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Count events of one type.
    pub fn count_of(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Consume the log.
    pub fn into_inner(self) -> Vec<TransactionEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn log_orders_by_timestamp_then_sequence() {
        let owner = Uuid::new_v4();
        let ev = |id, secs, t| NewEvent::operator(t, at(secs)).persisted(id, owner);
        let log = EventLog::from_events(vec![
            ev(3, 10, EventType::Revoke),
            ev(2, 5, EventType::Renew),
            ev(1, 5, EventType::Register),
        ]);
        let ids: Vec<i64> = log.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(log.count_of(EventType::Renew), 1);
    }

    #[test]
    fn new_events_truncate_to_seconds() {
        let fractional = at(0) + chrono::Duration::milliseconds(999);
        let e = NewEvent::operator(EventType::Cancel, fractional);
        assert_eq!(e.timestamp, at(0));
        assert!(e.device_id.is_none());
    }

    #[test]
    fn event_type_wire_names() {
        assert_eq!(serde_json::to_string(&EventType::Return).unwrap(), "\"return\"");
        assert_eq!("renew".parse::<EventType>().unwrap(), EventType::Renew);
        assert!("expire".parse::<EventType>().is_err());
    }

    #[test]
    fn empty_log() {
        assert!(EventLog::empty().is_empty());
        assert_eq!(EventLog::from_events(Vec::new()).len(), 0);
    }
}
