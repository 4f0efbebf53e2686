//! SQLite-backed pileup store.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    qso::{CurrentQso, Frequency, QueueDraft, QueueRecord, SystemStatus},
    types::{Callsign, EntrySeq, LookupInfo, Timestamp},
};

use super::{PileupStore, StoreError, StoreResult};

const STATUS_DOC: &str = "system_status";
const CURRENT_QSO_DOC: &str = "current_qso";
const FREQUENCY_DOC: &str = "frequency";

const ENTRY_COLUMNS: &str = "callsign, enqueued_at, seq, lookup";

/// SQLite implementation of [`crate::persist::PileupStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates a SQLite-backed store at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Message("sqlite connection lock poisoned".to_string()))
    }

    fn get_doc<T: DeserializeOwned>(&self, name: &str) -> StoreResult<Option<T>> {
        let payload: Option<String> = self
            .lock()?
            .query_row(
                "SELECT payload FROM singletons WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    fn put_doc<T: Serialize>(&self, name: &str, doc: &T) -> StoreResult<()> {
        let payload = serde_json::to_string(doc)?;
        self.lock()?.execute(
            "INSERT INTO singletons(name, updated_at, payload) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET updated_at = excluded.updated_at, payload = excluded.payload",
            params![name, encode_ts(&Utc::now()), payload],
        )?;
        Ok(())
    }

    fn take_doc<T: DeserializeOwned>(&self, name: &str) -> StoreResult<Option<T>> {
        let payload: Option<String> = self
            .lock()?
            .query_row(
                "DELETE FROM singletons WHERE name = ?1 RETURNING payload",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }
}

impl PileupStore for SqliteStore {
    fn insert_entry(&self, draft: QueueDraft) -> StoreResult<QueueRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let next: i64 = tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM queue", [], |row| {
            row.get(0)
        })?;
        let latest: Option<String> =
            tx.query_row("SELECT MAX(enqueued_at) FROM queue", [], |row| row.get(0))?;
        let latest = latest.as_deref().map(decode_ts).transpose()?;
        let record = draft.not_before(latest).into_record(next as EntrySeq);
        let lookup = serde_json::to_string(&record.lookup)?;
        let inserted = tx.execute(
            "INSERT INTO queue(callsign, enqueued_at, seq, lookup) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.callsign.as_str(),
                encode_ts(&record.enqueued_at),
                record.seq as i64,
                lookup,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::Duplicate(record.callsign.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        tx.commit()?;
        Ok(record)
    }

    fn find_entry(&self, callsign: &Callsign) -> StoreResult<Option<QueueRecord>> {
        let raw = self
            .lock()?
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM queue WHERE callsign = ?1"),
                params![callsign.as_str()],
                raw_entry,
            )
            .optional()?;
        raw.map(RawEntry::decode).transpose()
    }

    fn count_entries_before(&self, record: &QueueRecord) -> StoreResult<usize> {
        let at = encode_ts(&record.enqueued_at);
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM queue WHERE enqueued_at < ?1 OR (enqueued_at = ?1 AND seq < ?2)",
            params![at, record.seq as i64],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn list_entries(&self) -> StoreResult<Vec<QueueRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM queue ORDER BY enqueued_at ASC, seq ASC"
        ))?;
        let rows = stmt.query_map([], raw_entry)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?.decode()?);
        }
        Ok(out)
    }

    fn delete_entry(&self, callsign: &Callsign) -> StoreResult<Option<QueueRecord>> {
        let raw = self
            .lock()?
            .query_row(
                &format!("DELETE FROM queue WHERE callsign = ?1 RETURNING {ENTRY_COLUMNS}"),
                params![callsign.as_str()],
                raw_entry,
            )
            .optional()?;
        raw.map(RawEntry::decode).transpose()
    }

    fn delete_all_entries(&self) -> StoreResult<usize> {
        Ok(self.lock()?.execute("DELETE FROM queue", [])?)
    }

    fn pop_oldest_entry(&self) -> StoreResult<Option<QueueRecord>> {
        let raw = self
            .lock()?
            .query_row(
                &format!(
                    "DELETE FROM queue WHERE callsign = (
                         SELECT callsign FROM queue ORDER BY enqueued_at ASC, seq ASC LIMIT 1
                     ) RETURNING {ENTRY_COLUMNS}"
                ),
                [],
                raw_entry,
            )
            .optional()?;
        raw.map(RawEntry::decode).transpose()
    }

    fn count_entries(&self) -> StoreResult<usize> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_status(&self) -> StoreResult<Option<SystemStatus>> {
        self.get_doc(STATUS_DOC)
    }

    fn get_or_init_status(&self, default: &SystemStatus) -> StoreResult<SystemStatus> {
        let payload = serde_json::to_string(default)?;
        let stored: String = {
            let conn = self.lock()?;
            conn.execute(
                "INSERT OR IGNORE INTO singletons(name, updated_at, payload) VALUES (?1, ?2, ?3)",
                params![STATUS_DOC, encode_ts(&Utc::now()), payload],
            )?;
            conn.query_row(
                "SELECT payload FROM singletons WHERE name = ?1",
                params![STATUS_DOC],
                |row| row.get(0),
            )?
        };
        Ok(serde_json::from_str(&stored)?)
    }

    fn put_status(&self, status: &SystemStatus) -> StoreResult<()> {
        self.put_doc(STATUS_DOC, status)
    }

    fn get_current(&self) -> StoreResult<Option<CurrentQso>> {
        self.get_doc(CURRENT_QSO_DOC)
    }

    fn put_current(&self, qso: &CurrentQso) -> StoreResult<()> {
        self.put_doc(CURRENT_QSO_DOC, qso)
    }

    fn take_current(&self) -> StoreResult<Option<CurrentQso>> {
        self.take_doc(CURRENT_QSO_DOC)
    }

    fn get_frequency(&self) -> StoreResult<Option<Frequency>> {
        self.get_doc(FREQUENCY_DOC)
    }

    fn put_frequency(&self, frequency: &Frequency) -> StoreResult<()> {
        self.put_doc(FREQUENCY_DOC, frequency)
    }

    fn take_frequency(&self) -> StoreResult<Option<Frequency>> {
        self.take_doc(FREQUENCY_DOC)
    }
}

struct RawEntry {
    callsign: String,
    enqueued_at: String,
    seq: i64,
    lookup: String,
}

impl RawEntry {
    fn decode(self) -> StoreResult<QueueRecord> {
        Ok(QueueRecord {
            callsign: Callsign::normalize(&self.callsign),
            enqueued_at: decode_ts(&self.enqueued_at)?,
            seq: self.seq as EntrySeq,
            lookup: serde_json::from_str::<LookupInfo>(&self.lookup)?,
        })
    }
}

fn raw_entry(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        callsign: row.get(0)?,
        enqueued_at: row.get(1)?,
        seq: row.get(2)?,
        lookup: row.get(3)?,
    })
}

// Fixed-width nanosecond RFC 3339 in UTC sorts lexicographically in time order.
fn encode_ts(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_ts(text: &str) -> StoreResult<Timestamp> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| StoreError::Message(format!("bad timestamp {text:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;

    fn draft(call: &str) -> QueueDraft {
        QueueDraft {
            callsign: Callsign::normalize(call),
            enqueued_at: now(),
            lookup: LookupInfo::default(),
        }
    }

    #[test]
    fn timestamps_round_trip_exactly() {
        let store = SqliteStore::open_in_memory().expect("open");
        let inserted = store.insert_entry(draft("K1ABC")).expect("insert");
        let found = store
            .find_entry(&Callsign::normalize("K1ABC"))
            .expect("find")
            .expect("present");
        assert_eq!(found, inserted);
    }

    #[test]
    fn clock_stepping_back_keeps_fifo_order() {
        let store = SqliteStore::open_in_memory().expect("open");
        let first = store.insert_entry(draft("K1ABC")).expect("insert");
        let mut behind = draft("W2DEF");
        behind.enqueued_at = first.enqueued_at - chrono::TimeDelta::seconds(1);
        let second = store.insert_entry(behind).expect("insert");
        assert!(second.enqueued_at > first.enqueued_at);

        let order: Vec<String> = store
            .list_entries()
            .expect("list")
            .into_iter()
            .map(|r| r.callsign.to_string())
            .collect();
        assert_eq!(order, vec!["K1ABC", "W2DEF"]);
    }

    #[test]
    fn constraint_violation_surfaces_as_duplicate() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.insert_entry(draft("K1ABC")).expect("insert");
        let err = store.insert_entry(draft("K1ABC")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn singleton_take_removes_document() {
        let store = SqliteStore::open_in_memory().expect("open");
        let qso = CurrentQso {
            callsign: Callsign::normalize("W1AW"),
            started_at: now(),
            lookup: LookupInfo::default(),
            started_by: "admin".into(),
        };
        store.put_current(&qso).expect("put");
        assert_eq!(store.take_current().expect("take"), Some(qso));
        assert_eq!(store.take_current().expect("take again"), None);
    }
}
