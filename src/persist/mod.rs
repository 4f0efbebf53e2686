//! Durable store abstraction and its backends.
//!
//! Every method on [`PileupStore`] is a single atomic step against one
//! collection or singleton document. Compound transitions (advance, status
//! change) are sequenced above this layer.

/// In-memory backend.
pub mod memory;
/// SQLite backend.
pub mod sqlite;

use std::{sync::Arc, time::Duration};

use tokio::task::{JoinError, JoinHandle};
use tracing::{error, warn};

use crate::{
    config::StorageTarget,
    error::{PileupError, PileupResult},
    qso::{CurrentQso, Frequency, QueueDraft, QueueRecord, SystemStatus},
    types::Callsign,
};

use self::{memory::MemoryStore, sqlite::SqliteStore};

/// Backend failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored document failed to encode or decode.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Unique key already present.
    #[error("duplicate key {0}")]
    Duplicate(String),
    /// Anything else.
    #[error("{0}")]
    Message(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Primitive operations the pileup needs from a durable store.
pub trait PileupStore: Send + Sync {
    /// Inserts a queue record, assigning its sequence.
    ///
    /// Fails with [`StoreError::Duplicate`] if the callsign is already queued.
    fn insert_entry(&self, draft: QueueDraft) -> StoreResult<QueueRecord>;
    /// Finds a queue record by callsign.
    fn find_entry(&self, callsign: &Callsign) -> StoreResult<Option<QueueRecord>>;
    /// Counts records ordered strictly before `record` in FIFO order.
    fn count_entries_before(&self, record: &QueueRecord) -> StoreResult<usize>;
    /// All records in FIFO order.
    fn list_entries(&self) -> StoreResult<Vec<QueueRecord>>;
    /// Atomically finds and deletes by callsign.
    fn delete_entry(&self, callsign: &Callsign) -> StoreResult<Option<QueueRecord>>;
    /// Atomically deletes every record, returning how many went.
    fn delete_all_entries(&self) -> StoreResult<usize>;
    /// Atomically finds and deletes the FIFO head.
    fn pop_oldest_entry(&self) -> StoreResult<Option<QueueRecord>>;
    /// Number of queued records.
    fn count_entries(&self) -> StoreResult<usize>;

    /// Reads the status document.
    fn get_status(&self) -> StoreResult<Option<SystemStatus>>;
    /// Inserts `default` unless a status exists; returns whichever is stored.
    fn get_or_init_status(&self, default: &SystemStatus) -> StoreResult<SystemStatus>;
    /// Upsert-replaces the status document.
    fn put_status(&self, status: &SystemStatus) -> StoreResult<()>;

    /// Reads the current-QSO document.
    fn get_current(&self) -> StoreResult<Option<CurrentQso>>;
    /// Upsert-replaces the current-QSO document.
    fn put_current(&self, qso: &CurrentQso) -> StoreResult<()>;
    /// Atomically finds and deletes the current-QSO document.
    fn take_current(&self) -> StoreResult<Option<CurrentQso>>;

    /// Reads the frequency document.
    fn get_frequency(&self) -> StoreResult<Option<Frequency>>;
    /// Upsert-replaces the frequency document.
    fn put_frequency(&self, frequency: &Frequency) -> StoreResult<()>;
    /// Atomically finds and deletes the frequency document.
    fn take_frequency(&self) -> StoreResult<Option<Frequency>>;
}

/// Shared, timeout-bounded handle to a store.
///
/// Store calls run on the blocking pool. A read that outlives `timeout`
/// fails with [`PileupError::StoreUnavailable`]. A write cannot be cancelled
/// once it started, so [`StoreHandle::mutate`] waits one more `timeout` for
/// the real outcome and otherwise reports [`PileupError::OutcomeUnknown`].
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn PileupStore>,
    timeout: Duration,
}

impl StoreHandle {
    /// Wraps `store` with the given per-call timeout.
    pub fn new(store: Arc<dyn PileupStore>, timeout: Duration) -> Self {
        Self {
            inner: store,
            timeout,
        }
    }

    /// Runs the read-only `f` against the store under the timeout.
    pub async fn call<T, F>(&self, operation: &'static str, f: F) -> PileupResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PileupStore) -> StoreResult<T> + Send + 'static,
    {
        let mut task = self.spawn(f);
        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => settle(operation, joined),
            Err(_) => Err(PileupError::StoreUnavailable {
                operation,
                reason: format!("timed out after {} ms", self.timeout.as_millis()),
            }),
        }
    }

    /// Runs the writing `f` against the store.
    ///
    /// Past the timeout the write may still land, so the handle keeps waiting
    /// for a grace period of one more timeout. Only when the outcome is still
    /// unknown after that does it give up with [`PileupError::OutcomeUnknown`].
    pub async fn mutate<T, F>(&self, operation: &'static str, f: F) -> PileupResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PileupStore) -> StoreResult<T> + Send + 'static,
    {
        let mut task = self.spawn(f);
        if let Ok(joined) = tokio::time::timeout(self.timeout, &mut task).await {
            return settle(operation, joined);
        }

        let timeout_ms = self.timeout.as_millis() as u64;
        warn!(operation, timeout_ms, "store write overran its timeout, awaiting outcome");
        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => settle(operation, joined),
            Err(_) => {
                error!(operation, waited_ms = timeout_ms * 2, "store write outcome unknown");
                Err(PileupError::OutcomeUnknown {
                    operation,
                    waited_ms: timeout_ms * 2,
                })
            }
        }
    }

    fn spawn<T, F>(&self, f: F) -> JoinHandle<StoreResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PileupStore) -> StoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
    }
}

fn settle<T>(
    operation: &'static str,
    joined: Result<StoreResult<T>, JoinError>,
) -> PileupResult<T> {
    match joined {
        Ok(res) => res.map_err(|err| PileupError::from_store(operation, err)),
        Err(join) => Err(PileupError::StoreUnavailable {
            operation,
            reason: format!("join error: {join}"),
        }),
    }
}

/// Opens the backend named by `target`.
pub fn open_store(target: &StorageTarget) -> PileupResult<Arc<dyn PileupStore>> {
    let store: Arc<dyn PileupStore> = match target {
        StorageTarget::Memory => Arc::new(MemoryStore::new()),
        StorageTarget::SqliteMemory => Arc::new(
            SqliteStore::open_in_memory().map_err(|err| PileupError::from_store("open", err))?,
        ),
        StorageTarget::Sqlite(path) => Arc::new(
            SqliteStore::open(path).map_err(|err| PileupError::from_store("open", err))?,
        ),
    };
    Ok(store)
}
