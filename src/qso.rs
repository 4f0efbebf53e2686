//! Queue, current-QSO, status and frequency records.

use serde::{Deserialize, Serialize};

use crate::types::{Callsign, EntrySeq, LookupInfo, OperatorId, SYSTEM_OPERATOR, Timestamp};

/// Insert payload used to create a [`QueueRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDraft {
    /// Normalized callsign.
    pub callsign: Callsign,
    /// Registration time.
    pub enqueued_at: Timestamp,
    /// Lookup payload captured at registration.
    pub lookup: LookupInfo,
}

impl QueueDraft {
    /// Completes the draft with the store-assigned sequence.
    pub fn into_record(self, seq: EntrySeq) -> QueueRecord {
        QueueRecord {
            callsign: self.callsign,
            enqueued_at: self.enqueued_at,
            seq,
            lookup: self.lookup,
        }
    }

    /// Pushes the enqueue time just past `latest` when the clock reads at or
    /// before it, so a wall-clock step backwards cannot jump the queue.
    pub fn not_before(mut self, latest: Option<Timestamp>) -> Self {
        if let Some(latest) = latest {
            if self.enqueued_at <= latest {
                self.enqueued_at = latest + chrono::TimeDelta::nanoseconds(1);
            }
        }
        self
    }
}

/// Queue document as persisted. Carries no position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    /// Normalized callsign, unique within the queue.
    pub callsign: Callsign,
    /// Registration time.
    pub enqueued_at: Timestamp,
    /// Insertion sequence, breaks `enqueued_at` ties.
    pub seq: EntrySeq,
    /// Lookup payload captured at registration.
    pub lookup: LookupInfo,
}

impl QueueRecord {
    /// FIFO sort key.
    pub fn order_key(&self) -> (Timestamp, EntrySeq) {
        (self.enqueued_at, self.seq)
    }

    /// Materializes the public view at `position`.
    pub fn at_position(self, position: usize) -> QueueEntry {
        QueueEntry {
            callsign: self.callsign,
            enqueued_at: self.enqueued_at,
            position,
            lookup: self.lookup,
        }
    }
}

/// Queue entry as returned to callers, with a freshly derived position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Normalized callsign.
    pub callsign: Callsign,
    /// Registration time.
    #[serde(rename = "timestamp")]
    pub enqueued_at: Timestamp,
    /// 1-based FIFO position among entries present at read time.
    pub position: usize,
    /// Lookup payload captured at registration.
    #[serde(rename = "qrz")]
    pub lookup: LookupInfo,
}

/// The station currently being worked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentQso {
    /// Callsign in contact.
    pub callsign: Callsign,
    /// When the contact started.
    #[serde(rename = "timestamp")]
    pub started_at: Timestamp,
    /// Lookup payload carried from the queue (or supplied directly).
    #[serde(rename = "qrz")]
    pub lookup: LookupInfo,
    /// Operator that started the contact.
    pub started_by: OperatorId,
}

/// Active/inactive switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// True when registrations are accepted.
    pub active: bool,
    /// Last transition time.
    #[serde(rename = "last_updated")]
    pub last_changed_at: Timestamp,
    /// Operator that made the last transition.
    #[serde(rename = "updated_by")]
    pub changed_by: OperatorId,
}

impl SystemStatus {
    /// The document materialized when no status was ever written.
    pub fn initial(at: Timestamp) -> Self {
        Self {
            active: false,
            last_changed_at: at,
            changed_by: SYSTEM_OPERATOR.to_string(),
        }
    }

    /// Strips operator details for unauthenticated readers.
    pub fn public(&self) -> PublicStatus {
        PublicStatus {
            active: self.active,
        }
    }
}

/// Status as shown to the public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicStatus {
    /// True when registrations are accepted.
    pub active: bool,
}

/// Operating frequency announced to stations in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frequency {
    /// Free-form frequency text, e.g. `14.250 MHz`.
    pub frequency: String,
    /// When it was set.
    #[serde(rename = "last_updated")]
    pub last_changed_at: Timestamp,
    /// Operator that set it.
    #[serde(rename = "updated_by")]
    pub changed_by: OperatorId,
}

/// Outcome of an advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceResult {
    /// QSO that was in progress and got cleared.
    #[serde(rename = "cleared_qso")]
    pub cleared: Option<CurrentQso>,
    /// Queue entry that was popped.
    pub processed: Option<QueueEntry>,
    /// New occupant of the slot.
    #[serde(rename = "current_qso")]
    pub current: Option<CurrentQso>,
    /// Entries left in the queue.
    pub remaining: usize,
}

impl AdvanceResult {
    /// True when a QSO in progress was replaced by a queued station.
    pub fn preempted(&self) -> bool {
        self.cleared.is_some() && self.processed.is_some()
    }

    /// Human-readable summary for admin responses.
    pub fn message(&self) -> String {
        let cleared = self
            .cleared
            .as_ref()
            .map(|qso| format!("QSO with {} cleared. ", qso.callsign))
            .unwrap_or_default();
        match &self.processed {
            Some(entry) => format!("{cleared}Next callsign: {} is now in QSO", entry.callsign),
            None => format!("{cleared}Queue is empty."),
        }
    }
}

/// Outcome of a status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status after the transition.
    pub status: SystemStatus,
    /// Queue entries removed by the transition.
    pub cleared_count: usize,
    /// QSO that was in progress and got cleared.
    pub cleared_qso: Option<CurrentQso>,
}

impl StatusChange {
    /// True when the transition removed anything.
    pub fn cleared_anything(&self) -> bool {
        self.cleared_count > 0 || self.cleared_qso.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;

    fn qso(call: &str) -> CurrentQso {
        CurrentQso {
            callsign: Callsign::normalize(call),
            started_at: now(),
            lookup: LookupInfo::default(),
            started_by: "admin".into(),
        }
    }

    fn entry(call: &str) -> QueueEntry {
        QueueRecord {
            callsign: Callsign::normalize(call),
            enqueued_at: now(),
            seq: 1,
            lookup: LookupInfo::default(),
        }
        .at_position(1)
    }

    #[test]
    fn advance_messages_match_admin_wording() {
        let both = AdvanceResult {
            cleared: Some(qso("W1ABC")),
            processed: Some(entry("KC1XYZ")),
            current: Some(qso("KC1XYZ")),
            remaining: 0,
        };
        assert!(both.preempted());
        assert_eq!(
            both.message(),
            "QSO with W1ABC cleared. Next callsign: KC1XYZ is now in QSO"
        );

        let drained = AdvanceResult {
            cleared: Some(qso("W1ABC")),
            processed: None,
            current: None,
            remaining: 0,
        };
        assert!(!drained.preempted());
        assert_eq!(drained.message(), "QSO with W1ABC cleared. Queue is empty.");
    }

    #[test]
    fn draft_never_lands_before_the_latest_entry() {
        let latest = now();
        let stepped_back = QueueDraft {
            callsign: Callsign::normalize("W2DEF"),
            enqueued_at: latest - chrono::TimeDelta::seconds(1),
            lookup: LookupInfo::default(),
        };
        let clamped = stepped_back.clone().not_before(Some(latest));
        assert!(clamped.enqueued_at > latest);

        let fresh = stepped_back.clone().not_before(None);
        assert_eq!(fresh, stepped_back);
    }

    #[test]
    fn public_status_hides_operator() {
        let status = SystemStatus::initial(now());
        let json = serde_json::to_value(status.public()).expect("json");
        assert_eq!(json, serde_json::json!({ "active": false }));
        assert_eq!(status.changed_by, "system");
    }
}
