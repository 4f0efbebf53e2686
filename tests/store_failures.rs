use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use pileup::{
    config::PileupConfig,
    core::Pileup,
    error::PileupError,
    persist::{PileupStore, StoreError, StoreResult, memory::MemoryStore},
    qso::{CurrentQso, Frequency, QueueDraft, QueueRecord, SystemStatus},
    runtime::events::{EventKind, EventPayload, QueueAction},
    types::{Callsign, LookupInfo, now},
};

#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<Vec<&'static str>>,
    stall: Option<Duration>,
    stall_only: Option<&'static str>,
}

impl FlakyStore {
    fn fail(&self, op: &'static str) {
        self.failing.lock().expect("lock").push(op);
    }

    fn heal(&self) {
        self.failing.lock().expect("lock").clear();
    }

    fn check(&self, op: &'static str) -> StoreResult<()> {
        if let Some(delay) = self.stall {
            if self.stall_only.is_none_or(|only| only == op) {
                std::thread::sleep(delay);
            }
        }
        if self.failing.lock().expect("lock").contains(&op) {
            return Err(StoreError::Message(format!("{op} refused")));
        }
        Ok(())
    }
}

impl PileupStore for FlakyStore {
    fn insert_entry(&self, draft: QueueDraft) -> StoreResult<QueueRecord> {
        self.check("insert_entry")?;
        self.inner.insert_entry(draft)
    }
    fn find_entry(&self, callsign: &Callsign) -> StoreResult<Option<QueueRecord>> {
        self.check("find_entry")?;
        self.inner.find_entry(callsign)
    }
    fn count_entries_before(&self, record: &QueueRecord) -> StoreResult<usize> {
        self.check("count_entries_before")?;
        self.inner.count_entries_before(record)
    }
    fn list_entries(&self) -> StoreResult<Vec<QueueRecord>> {
        self.check("list_entries")?;
        self.inner.list_entries()
    }
    fn delete_entry(&self, callsign: &Callsign) -> StoreResult<Option<QueueRecord>> {
        self.check("delete_entry")?;
        self.inner.delete_entry(callsign)
    }
    fn delete_all_entries(&self) -> StoreResult<usize> {
        self.check("delete_all_entries")?;
        self.inner.delete_all_entries()
    }
    fn pop_oldest_entry(&self) -> StoreResult<Option<QueueRecord>> {
        self.check("pop_oldest_entry")?;
        self.inner.pop_oldest_entry()
    }
    fn count_entries(&self) -> StoreResult<usize> {
        self.check("count_entries")?;
        self.inner.count_entries()
    }
    fn get_status(&self) -> StoreResult<Option<SystemStatus>> {
        self.check("get_status")?;
        self.inner.get_status()
    }
    fn get_or_init_status(&self, default: &SystemStatus) -> StoreResult<SystemStatus> {
        self.check("get_status")?;
        self.inner.get_or_init_status(default)
    }
    fn put_status(&self, status: &SystemStatus) -> StoreResult<()> {
        self.check("put_status")?;
        self.inner.put_status(status)
    }
    fn get_current(&self) -> StoreResult<Option<CurrentQso>> {
        self.check("get_current")?;
        self.inner.get_current()
    }
    fn put_current(&self, qso: &CurrentQso) -> StoreResult<()> {
        self.check("put_current")?;
        self.inner.put_current(qso)
    }
    fn take_current(&self) -> StoreResult<Option<CurrentQso>> {
        self.check("take_current")?;
        self.inner.take_current()
    }
    fn get_frequency(&self) -> StoreResult<Option<Frequency>> {
        self.check("get_frequency")?;
        self.inner.get_frequency()
    }
    fn put_frequency(&self, frequency: &Frequency) -> StoreResult<()> {
        self.check("put_frequency")?;
        self.inner.put_frequency(frequency)
    }
    fn take_frequency(&self) -> StoreResult<Option<Frequency>> {
        self.check("take_frequency")?;
        self.inner.take_frequency()
    }
}

fn flaky() -> (Arc<FlakyStore>, Pileup) {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        ..FlakyStore::default()
    });
    let pileup = Pileup::new(store.clone(), &PileupConfig::default());
    (store, pileup)
}

fn call(raw: &str) -> Callsign {
    Callsign::parse(raw).expect("valid callsign")
}

#[tokio::test]
async fn read_checks_degrade_instead_of_failing() {
    let (store, pileup) = flaky();
    pileup.status.set(true, "admin".into()).await.expect("activate");
    pileup
        .queue
        .register(call("K1ABC"), LookupInfo::default())
        .await
        .expect("register");

    store.fail("count_entries");
    assert_eq!(pileup.queue.count().await, 0);

    store.fail("get_status");
    assert!(!pileup.status.is_active().await);
    let err = pileup
        .queue
        .register(call("W2DEF"), LookupInfo::default())
        .await
        .expect_err("unreadable status reads as inactive");
    assert_eq!(err, PileupError::SystemInactive);

    store.heal();
    assert_eq!(pileup.queue.count().await, 1);
    assert!(pileup.status.is_active().await);
}

#[tokio::test]
async fn mutations_surface_store_unavailable() {
    let (store, pileup) = flaky();
    store.fail("delete_all_entries");

    let err = pileup.queue.clear().await.expect_err("clear");
    assert!(matches!(
        err,
        PileupError::StoreUnavailable {
            operation: "delete_all_entries",
            ..
        }
    ));
    assert!(!err.is_domain());

    // First step failing leaves nothing applied, so no partial report.
    let err = pileup
        .status
        .set(true, "admin".into())
        .await
        .expect_err("status");
    assert!(matches!(
        err,
        PileupError::StoreUnavailable {
            operation: "clear_queue",
            ..
        }
    ));
}

#[tokio::test]
async fn status_change_reports_partial_application() {
    let (store, pileup) = flaky();
    pileup.status.set(true, "admin".into()).await.expect("activate");
    pileup
        .queue
        .register(call("K1ABC"), LookupInfo::default())
        .await
        .expect("register");

    store.fail("take_current");
    let err = pileup
        .status
        .set(false, "admin".into())
        .await
        .expect_err("partial");
    match err {
        PileupError::PartialStatusChange {
            active,
            completed,
            failed,
            ..
        } => {
            assert!(!active);
            assert_eq!(completed, vec!["clear_queue"]);
            assert_eq!(failed, "clear_current_qso");
        }
        other => panic!("unexpected error {other:?}"),
    }

    store.heal();
    assert_eq!(pileup.queue.count().await, 0);
    assert!(pileup.status.is_active().await, "status write never happened");
}

#[tokio::test]
async fn failed_pop_still_reports_cleared_slot() {
    let (store, pileup) = flaky();
    pileup.status.set(true, "admin".into()).await.expect("activate");
    pileup
        .qso
        .set_current(call("K1ABC"), LookupInfo::default(), "admin".into())
        .await
        .expect("set current");
    let mut listener = pileup.events.subscribe();

    store.fail("pop_oldest_entry");
    let err = pileup.qso.advance("admin".into()).await.expect_err("pop");
    assert!(matches!(err, PileupError::StoreUnavailable { .. }));

    let event = listener.try_recv().expect("slot cleared event");
    assert_eq!(event.payload, EventPayload::CurrentQso(None));
    store.heal();
    assert!(pileup.qso.get_current().await.expect("current").is_none());
}

#[tokio::test]
async fn stalled_store_times_out() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        stall: Some(Duration::from_millis(300)),
        ..FlakyStore::default()
    });
    let config = PileupConfig {
        store_timeout: Duration::from_millis(20),
        ..PileupConfig::default()
    };
    let pileup = Pileup::new(store, &config);

    let err = pileup.frequency.get().await.expect_err("timeout");
    match err {
        PileupError::StoreUnavailable { operation, reason } => {
            assert_eq!(operation, "get_frequency");
            assert!(reason.contains("timed out"), "{reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

fn slow_clear(stall_ms: u64, timeout_ms: u64) -> (Arc<FlakyStore>, Pileup) {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        stall: Some(Duration::from_millis(stall_ms)),
        stall_only: Some("delete_all_entries"),
        ..FlakyStore::default()
    });
    let config = PileupConfig {
        store_timeout: Duration::from_millis(timeout_ms),
        ..PileupConfig::default()
    };
    let pileup = Pileup::new(store.clone(), &config);
    (store, pileup)
}

async fn queue_two(store: &FlakyStore, pileup: &Pileup) {
    let mut status = SystemStatus::initial(now());
    status.active = true;
    store.inner.put_status(&status).expect("activate");
    for raw in ["K1ABC", "W2DEF"] {
        pileup
            .queue
            .register(call(raw), LookupInfo::default())
            .await
            .expect("register");
    }
}

#[tokio::test]
async fn slow_clear_within_grace_still_completes_the_transition() {
    let (store, pileup) = slow_clear(150, 100);
    queue_two(&store, &pileup).await;
    let mut listener = pileup.events.subscribe();

    let change = pileup
        .status
        .set(false, "admin".into())
        .await
        .expect("write landed inside the grace period");
    assert_eq!(change.cleared_count, 2);
    assert!(!change.status.active);
    assert_eq!(pileup.queue.count().await, 0);

    assert_eq!(listener.try_recv().expect("status").kind(), EventKind::SystemStatus);
    match listener.try_recv().expect("queue").payload {
        EventPayload::Queue(snapshot) => assert_eq!(snapshot.action, QueueAction::StatusChange),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn stalled_clear_is_reported_as_partial_not_untouched() {
    let (store, pileup) = slow_clear(400, 50);
    queue_two(&store, &pileup).await;

    let err = pileup
        .status
        .set(false, "admin".into())
        .await
        .expect_err("outcome unknown");
    match err {
        PileupError::PartialStatusChange {
            active,
            completed,
            failed,
            reason,
        } => {
            assert!(!active);
            assert!(completed.is_empty());
            assert_eq!(failed, "clear_queue");
            assert!(reason.contains("unknown"), "{reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }

    // The abandoned write lands later; the error never claimed otherwise.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(pileup.queue.count().await, 0);
    assert!(pileup.status.is_active().await);
}

#[tokio::test]
async fn failed_status_write_still_announces_what_was_cleared() {
    let (store, pileup) = flaky();
    queue_two(&store, &pileup).await;
    let mut listener = pileup.events.subscribe();

    store.fail("put_status");
    let err = pileup
        .status
        .set(false, "admin".into())
        .await
        .expect_err("partial");
    assert!(matches!(
        err,
        PileupError::PartialStatusChange { failed: "put_status", .. }
    ));

    match listener.try_recv().expect("queue cleared").payload {
        EventPayload::Queue(snapshot) => {
            assert_eq!(snapshot.action, QueueAction::StatusChange);
            assert_eq!(snapshot.total, 0);
            assert!(snapshot.system_active, "status write never happened");
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert!(listener.try_recv().is_none(), "no qso was cleared, no status event");
}
