//! Process-local store backed by hash maps.

use std::sync::{Mutex, MutexGuard};

use hashbrown::HashMap;

use crate::{
    qso::{CurrentQso, Frequency, QueueDraft, QueueRecord, SystemStatus},
    types::{Callsign, EntrySeq},
};

use super::{PileupStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Callsign, QueueRecord>,
    next_seq: EntrySeq,
    status: Option<SystemStatus>,
    current: Option<CurrentQso>,
    frequency: Option<Frequency>,
}

/// In-memory implementation of [`PileupStore`].
///
/// Each trait call holds the lock for its whole body, which makes every
/// find-and-delete and upsert atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_seq: 1,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Message("memory store lock poisoned".to_string()))
    }
}

impl Inner {
    fn oldest(&self) -> Option<&QueueRecord> {
        self.entries.values().min_by_key(|rec| rec.order_key())
    }
}

impl PileupStore for MemoryStore {
    fn insert_entry(&self, draft: QueueDraft) -> StoreResult<QueueRecord> {
        let mut inner = self.lock()?;
        if inner.entries.contains_key(&draft.callsign) {
            return Err(StoreError::Duplicate(draft.callsign.to_string()));
        }
        let latest = inner.entries.values().map(|rec| rec.enqueued_at).max();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let record = draft.not_before(latest).into_record(seq);
        inner.entries.insert(record.callsign.clone(), record.clone());
        Ok(record)
    }

    fn find_entry(&self, callsign: &Callsign) -> StoreResult<Option<QueueRecord>> {
        Ok(self.lock()?.entries.get(callsign).cloned())
    }

    fn count_entries_before(&self, record: &QueueRecord) -> StoreResult<usize> {
        let key = record.order_key();
        Ok(self
            .lock()?
            .entries
            .values()
            .filter(|rec| rec.order_key() < key)
            .count())
    }

    fn list_entries(&self) -> StoreResult<Vec<QueueRecord>> {
        let mut out: Vec<QueueRecord> = self.lock()?.entries.values().cloned().collect();
        out.sort_by_key(|rec| rec.order_key());
        Ok(out)
    }

    fn delete_entry(&self, callsign: &Callsign) -> StoreResult<Option<QueueRecord>> {
        Ok(self.lock()?.entries.remove(callsign))
    }

    fn delete_all_entries(&self) -> StoreResult<usize> {
        let mut inner = self.lock()?;
        let count = inner.entries.len();
        inner.entries.clear();
        Ok(count)
    }

    fn pop_oldest_entry(&self) -> StoreResult<Option<QueueRecord>> {
        let mut inner = self.lock()?;
        let Some(call) = inner.oldest().map(|rec| rec.callsign.clone()) else {
            return Ok(None);
        };
        Ok(inner.entries.remove(&call))
    }

    fn count_entries(&self) -> StoreResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    fn get_status(&self) -> StoreResult<Option<SystemStatus>> {
        Ok(self.lock()?.status.clone())
    }

    fn get_or_init_status(&self, default: &SystemStatus) -> StoreResult<SystemStatus> {
        let mut inner = self.lock()?;
        Ok(inner.status.get_or_insert_with(|| default.clone()).clone())
    }

    fn put_status(&self, status: &SystemStatus) -> StoreResult<()> {
        self.lock()?.status = Some(status.clone());
        Ok(())
    }

    fn get_current(&self) -> StoreResult<Option<CurrentQso>> {
        Ok(self.lock()?.current.clone())
    }

    fn put_current(&self, qso: &CurrentQso) -> StoreResult<()> {
        self.lock()?.current = Some(qso.clone());
        Ok(())
    }

    fn take_current(&self) -> StoreResult<Option<CurrentQso>> {
        Ok(self.lock()?.current.take())
    }

    fn get_frequency(&self) -> StoreResult<Option<Frequency>> {
        Ok(self.lock()?.frequency.clone())
    }

    fn put_frequency(&self, frequency: &Frequency) -> StoreResult<()> {
        self.lock()?.frequency = Some(frequency.clone());
        Ok(())
    }

    fn take_frequency(&self) -> StoreResult<Option<Frequency>> {
        Ok(self.lock()?.frequency.take())
    }
}
