//! Shared primitive identifiers, callsign parsing and the lookup blob.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PileupError;

/// Monotonic insertion sequence used to break enqueue-time ties.
pub type EntrySeq = u64;
/// Identifier of the operator (admin) performing a mutation.
pub type OperatorId = String;
/// Wall-clock timestamp used across all records.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Operator id recorded when the system itself writes a document.
pub const SYSTEM_OPERATOR: &str = "system";

// Traditional ITU (1-2 letters, 1-2 digits, 1-4 letters) or UK numeric prefix (2E0JFS).
static ITU_CALLSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{1,2}[0-9]{1,2}[A-Z]{1,4}|[0-9][A-Z][0-9][A-Z]{1,3})$")
        .expect("valid callsign regex")
});

/// Normalized (trimmed, uppercase) station callsign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Callsign(String);

impl Callsign {
    /// Normalizes `raw` and checks it against the ITU callsign shape.
    ///
    /// Used on the registration path, where garbage must never reach the queue.
    pub fn parse(raw: &str) -> Result<Self, PileupError> {
        let call = Self::normalize(raw);
        if call.0.is_empty() {
            return Err(PileupError::InvalidCallsign {
                callsign: raw.to_string(),
                reason: "callsign is required",
            });
        }
        if !ITU_CALLSIGN.is_match(&call.0) {
            return Err(PileupError::InvalidCallsign {
                callsign: call.0,
                reason: "not a valid ITU amateur radio callsign",
            });
        }
        Ok(call)
    }

    /// Normalizes `raw` without validating its shape.
    ///
    /// Lookups and removals accept anything; a malformed key simply matches nothing.
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    /// Returns the normalized text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Callsign {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque station lookup payload captured at registration time.
///
/// The queue never interprets it; it is stored, carried into the current QSO
/// on promotion and handed to listeners as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct LookupInfo(pub Map<String, Value>);

impl LookupInfo {
    /// Placeholder used when no lookup result was stored for a callsign.
    pub fn unavailable(callsign: &Callsign) -> Self {
        let mut fields = Map::new();
        fields.insert("callsign".into(), Value::String(callsign.to_string()));
        fields.insert("name".into(), Value::Null);
        fields.insert("address".into(), Value::Null);
        fields.insert("dxcc_name".into(), Value::Null);
        fields.insert("image".into(), Value::Null);
        fields.insert("error".into(), Value::String("lookup unavailable".into()));
        Self(fields)
    }

    /// Returns true when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the lookup field `key`, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl From<Map<String, Value>> for LookupInfo {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Current UTC time.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
