//! Change notifications pushed to listeners.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    qso::{CurrentQso, Frequency, QueueEntry},
    types::{Callsign, OperatorId, Timestamp, now},
};

/// Event kind, also the SSE `event:` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Queue membership changed.
    QueueUpdate,
    /// Current-QSO slot changed.
    CurrentQso,
    /// System switched on or off.
    SystemStatus,
    /// Operating frequency changed.
    FrequencyUpdate,
}

impl EventKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueueUpdate => "queue_update",
            Self::CurrentQso => "current_qso",
            Self::SystemStatus => "system_status",
            Self::FrequencyUpdate => "frequency_update",
        }
    }
}

/// What caused a queue update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    /// A callsign registered.
    Register,
    /// An admin removed a callsign.
    Remove,
    /// An admin cleared the queue.
    Clear,
    /// The head was promoted to the current QSO.
    Advance,
    /// A status transition wiped the queue.
    StatusChange,
}

/// Full queue state carried by [`EventKind::QueueUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Trigger.
    pub action: QueueAction,
    /// Callsign the trigger was about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<Callsign>,
    /// Queue in FIFO order with fresh positions.
    pub queue: Vec<QueueEntry>,
    /// Number of entries.
    pub total: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Whether registration is open.
    pub system_active: bool,
}

/// Status transition summary carried by [`EventKind::SystemStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    /// New state.
    pub active: bool,
    /// Operator that flipped it.
    pub updated_by: OperatorId,
    /// Queue entries removed by the transition.
    pub cleared_count: usize,
    /// Whether a QSO in progress was cleared.
    pub cleared_qso: bool,
}

/// Event body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// Queue membership changed.
    Queue(QueueSnapshot),
    /// Slot now holds this QSO, or nothing.
    CurrentQso(Option<CurrentQso>),
    /// System switched.
    Status(StatusSummary),
    /// Frequency set or cleared.
    Frequency(Option<Frequency>),
}

/// Ephemeral notification; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// When the event was produced.
    pub emitted_at: Timestamp,
    /// Body.
    pub payload: EventPayload,
}

impl Event {
    /// Stamps `payload` with the current time.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            emitted_at: now(),
            payload,
        }
    }

    /// Kind derived from the payload.
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::Queue(_) => EventKind::QueueUpdate,
            EventPayload::CurrentQso(_) => EventKind::CurrentQso,
            EventPayload::Status(_) => EventKind::SystemStatus,
            EventPayload::Frequency(_) => EventKind::FrequencyUpdate,
        }
    }

    /// JSON envelope `{"type", "timestamp", "data"}`.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        let data = match &self.payload {
            EventPayload::Queue(snapshot) => serde_json::to_value(snapshot)?,
            EventPayload::CurrentQso(qso) => serde_json::to_value(qso)?,
            EventPayload::Status(summary) => serde_json::to_value(summary)?,
            EventPayload::Frequency(freq) => serde_json::to_value(freq)?,
        };
        Ok(json!({
            "type": self.kind().as_str(),
            "timestamp": self.emitted_at,
            "data": data,
        }))
    }

    /// Server-sent-events frame for this event.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        let body = serde_json::to_string(&self.to_json()?)?;
        Ok(format!("event: {}\ndata: {body}\n\n", self.kind().as_str()))
    }
}

/// Frame sent once when a stream opens.
pub fn sse_connected() -> &'static str {
    "event: connected\ndata: {\"message\": \"SSE connection established\"}\n\n"
}

/// Frame sent when a stream has been idle for the keepalive interval.
pub fn sse_keepalive() -> &'static str {
    "event: keepalive\ndata: {}\n\n"
}
