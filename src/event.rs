//! Device event types.

use std::fmt;
use std::time::SystemTime;

#[cfg(feature = "persist")]
use serde::{Deserialize, Serialize};

/// The kind of device event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "persist", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "persist", serde(rename_all = "lowercase"))]
pub enum EventKind {
    /// A device appeared.
    Add,
    /// A device went away.
    Remove,
    /// A device changed state or attributes.
    Change,
}

impl EventKind {
    /// The uevent action string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Remove => "remove",
            EventKind::Change => "change",
        }
    }

    /// Parse a uevent action string.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "add" => Some(EventKind::Add),
            "remove" => Some(EventKind::Remove),
            "change" => Some(EventKind::Change),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sequenced device event. Immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persist", derive(Serialize, Deserialize))]
pub struct Event {
    /// Sequence number, starting at 1 and never reused.
    pub sequence: u64,
    /// What happened to the device.
    pub kind: EventKind,
    /// Opaque device identifier (typically a devpath).
    pub subject_id: String,
    /// When the event was appended.
    pub time: SystemTime,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(sequence: u64, kind: EventKind, subject_id: impl Into<String>) -> Self {
        Self {
            sequence,
            kind,
            subject_id: subject_id.into(),
            time: SystemTime::now(),
        }
    }

    /// Check if this event announces a new device.
    pub fn is_add(&self) -> bool {
        self.kind == EventKind::Add
    }

    /// Check if this event announces a device removal.
    pub fn is_remove(&self) -> bool {
        self.kind == EventKind::Remove
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_strings() {
        for kind in [EventKind::Add, EventKind::Remove, EventKind::Change] {
            assert_eq!(EventKind::from_action(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_action("bind"), None);
        assert_eq!(EventKind::Change.to_string(), "change");
    }

    #[test]
    fn test_event_predicates() {
        let event = Event::new(1, EventKind::Add, "/devices/pci0000:00/usb1");
        assert!(event.is_add());
        assert!(!event.is_remove());
        assert_eq!(event.subject_id, "/devices/pci0000:00/usb1");
    }
}
