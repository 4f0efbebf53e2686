use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{
    config::PileupConfig,
    core::Pileup,
    error::{PileupError, PileupResult},
    persist::{PileupStore, open_store},
    qso::{AdvanceResult, CurrentQso, Frequency, PublicStatus, QueueEntry, StatusChange, SystemStatus},
    types::{Callsign, LookupInfo, OperatorId},
};

use super::broadcaster::{Broadcaster, Listener};

/// Cloneable front door to the single-writer pileup runtime.
///
/// Every operation is a message to one actor task, so register, advance and
/// status changes never interleave with each other.
#[derive(Clone)]
pub struct PileupHandle {
    cmd_tx: mpsc::Sender<Command>,
    events: Arc<Broadcaster>,
    capacity: usize,
}

enum Command {
    Register {
        callsign: String,
        lookup: LookupInfo,
        resp: oneshot::Sender<PileupResult<QueueEntry>>,
    },
    Position {
        callsign: String,
        resp: oneshot::Sender<PileupResult<QueueEntry>>,
    },
    List {
        resp: oneshot::Sender<PileupResult<Vec<QueueEntry>>>,
    },
    Count {
        resp: oneshot::Sender<usize>,
    },
    Remove {
        callsign: String,
        resp: oneshot::Sender<PileupResult<QueueEntry>>,
    },
    Clear {
        resp: oneshot::Sender<PileupResult<usize>>,
    },
    Advance {
        operator: OperatorId,
        resp: oneshot::Sender<PileupResult<AdvanceResult>>,
    },
    Complete {
        operator: OperatorId,
        resp: oneshot::Sender<PileupResult<Option<CurrentQso>>>,
    },
    GetCurrent {
        resp: oneshot::Sender<PileupResult<Option<CurrentQso>>>,
    },
    SetCurrent {
        callsign: String,
        lookup: LookupInfo,
        operator: OperatorId,
        resp: oneshot::Sender<PileupResult<CurrentQso>>,
    },
    GetStatus {
        resp: oneshot::Sender<PileupResult<SystemStatus>>,
    },
    SetStatus {
        active: bool,
        operator: OperatorId,
        resp: oneshot::Sender<PileupResult<StatusChange>>,
    },
    IsActive {
        resp: oneshot::Sender<bool>,
    },
    GetFrequency {
        resp: oneshot::Sender<PileupResult<Option<Frequency>>>,
    },
    SetFrequency {
        frequency: String,
        operator: OperatorId,
        resp: oneshot::Sender<PileupResult<Frequency>>,
    },
    ClearFrequency {
        operator: OperatorId,
        resp: oneshot::Sender<PileupResult<Option<Frequency>>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Opens the configured store and starts the runtime.
pub fn open_pileup(config: PileupConfig) -> PileupResult<PileupHandle> {
    let store = open_store(&config.storage)?;
    Ok(spawn_pileup(store, config))
}

/// Starts the runtime over `store`. Must be called inside a tokio runtime.
pub fn spawn_pileup(store: Arc<dyn PileupStore>, config: PileupConfig) -> PileupHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let pileup = Pileup::new(store, &config);
    let events = Arc::clone(&pileup.events);
    let capacity = config.max_queue_size;

    info!(
        max_queue_size = capacity,
        storage = ?config.storage,
        store_timeout_ms = config.store_timeout.as_millis() as u64,
        "pileup runtime starting"
    );

    tokio::spawn(async move {
        let mut prune = time::interval(config.keepalive_interval.max(Duration::from_secs(1)));
        prune.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    if handle_command(cmd, &pileup).await {
                        break;
                    }
                }
                _ = prune.tick() => {
                    let pruned = pileup.events.prune_closed();
                    if pruned > 0 {
                        debug!(pruned, "pruned disconnected listeners");
                    }
                }
            }
        }
        info!("pileup runtime stopped");
    });

    PileupHandle {
        cmd_tx,
        events,
        capacity,
    }
}

impl PileupHandle {
    /// Subscribes to change events. Does not go through the actor.
    pub fn subscribe(&self) -> Listener {
        self.events.subscribe()
    }

    /// Drops a subscription by id. Idempotent.
    pub fn unsubscribe(&self, listener: &Listener) {
        listener.unsubscribe();
    }

    /// Configured maximum queue size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Registers a callsign. The text is normalized and validated.
    pub async fn register(&self, callsign: &str, lookup: LookupInfo) -> PileupResult<QueueEntry> {
        let callsign = callsign.to_string();
        self.request(|resp| Command::Register {
            callsign,
            lookup,
            resp,
        })
        .await?
    }

    /// Queue position of `callsign`; [`PileupError::NotFound`] if absent.
    pub async fn position(&self, callsign: &str) -> PileupResult<QueueEntry> {
        let callsign = callsign.to_string();
        self.request(|resp| Command::Position { callsign, resp })
            .await?
    }

    /// Whole queue in FIFO order.
    pub async fn list(&self) -> PileupResult<Vec<QueueEntry>> {
        self.request(|resp| Command::List { resp }).await?
    }

    /// Queue length; 0 when the store is unreachable.
    pub async fn count(&self) -> PileupResult<usize> {
        self.request(|resp| Command::Count { resp }).await
    }

    /// Removes `callsign`; [`PileupError::NotFound`] if absent.
    pub async fn remove(&self, callsign: &str) -> PileupResult<QueueEntry> {
        let callsign = callsign.to_string();
        self.request(|resp| Command::Remove { callsign, resp })
            .await?
    }

    /// Empties the queue.
    pub async fn clear(&self) -> PileupResult<usize> {
        self.request(|resp| Command::Clear { resp }).await?
    }

    /// Promotes the next callsign into the current-QSO slot.
    pub async fn advance(&self, operator: impl Into<OperatorId>) -> PileupResult<AdvanceResult> {
        let operator = operator.into();
        self.request(|resp| Command::Advance { operator, resp })
            .await?
    }

    /// Ends the current QSO without promoting anyone.
    pub async fn complete(&self, operator: impl Into<OperatorId>) -> PileupResult<Option<CurrentQso>> {
        let operator = operator.into();
        self.request(|resp| Command::Complete { operator, resp })
            .await?
    }

    /// Current QSO, if any.
    pub async fn current(&self) -> PileupResult<Option<CurrentQso>> {
        self.request(|resp| Command::GetCurrent { resp }).await?
    }

    /// Puts `callsign` straight into the slot.
    pub async fn set_current(
        &self,
        callsign: &str,
        lookup: LookupInfo,
        operator: impl Into<OperatorId>,
    ) -> PileupResult<CurrentQso> {
        let callsign = callsign.to_string();
        let operator = operator.into();
        self.request(|resp| Command::SetCurrent {
            callsign,
            lookup,
            operator,
            resp,
        })
        .await?
    }

    /// Full status document.
    pub async fn status(&self) -> PileupResult<SystemStatus> {
        self.request(|resp| Command::GetStatus { resp }).await?
    }

    /// Status without operator details.
    pub async fn public_status(&self) -> PileupResult<PublicStatus> {
        Ok(self.status().await?.public())
    }

    /// Switches the system; always wipes queue and current QSO.
    pub async fn set_status(
        &self,
        active: bool,
        operator: impl Into<OperatorId>,
    ) -> PileupResult<StatusChange> {
        let operator = operator.into();
        self.request(|resp| Command::SetStatus {
            active,
            operator,
            resp,
        })
        .await?
    }

    /// True only when the status reads active.
    pub async fn is_active(&self) -> PileupResult<bool> {
        self.request(|resp| Command::IsActive { resp }).await
    }

    /// Announced frequency.
    pub async fn frequency(&self) -> PileupResult<Option<Frequency>> {
        self.request(|resp| Command::GetFrequency { resp }).await?
    }

    /// Announces a frequency.
    pub async fn set_frequency(
        &self,
        frequency: &str,
        operator: impl Into<OperatorId>,
    ) -> PileupResult<Frequency> {
        let frequency = frequency.to_string();
        let operator = operator.into();
        self.request(|resp| Command::SetFrequency {
            frequency,
            operator,
            resp,
        })
        .await?
    }

    /// Withdraws the announced frequency.
    pub async fn clear_frequency(
        &self,
        operator: impl Into<OperatorId>,
    ) -> PileupResult<Option<Frequency>> {
        let operator = operator.into();
        self.request(|resp| Command::ClearFrequency { operator, resp })
            .await?
    }

    /// Stops the actor after queued commands drain.
    pub async fn shutdown(&self) -> PileupResult<()> {
        self.request(|resp| Command::Shutdown { resp }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> PileupResult<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| PileupError::ChannelClosed)?;
        rx.await.map_err(|_| PileupError::ChannelClosed)
    }
}

async fn handle_command(cmd: Command, pileup: &Pileup) -> bool {
    match cmd {
        Command::Register {
            callsign,
            lookup,
            resp,
        } => {
            let res = match Callsign::parse(&callsign) {
                Ok(call) => pileup.queue.register(call, lookup).await,
                Err(err) => Err(err),
            };
            let _ = resp.send(res);
        }
        Command::Position { callsign, resp } => {
            let call = Callsign::normalize(&callsign);
            let res = pileup
                .queue
                .find(&call)
                .await
                .and_then(|found| found.ok_or(PileupError::NotFound(call)));
            let _ = resp.send(res);
        }
        Command::List { resp } => {
            let _ = resp.send(pileup.queue.list().await);
        }
        Command::Count { resp } => {
            let _ = resp.send(pileup.queue.count().await);
        }
        Command::Remove { callsign, resp } => {
            let call = Callsign::normalize(&callsign);
            let res = pileup
                .queue
                .remove(&call)
                .await
                .and_then(|removed| removed.ok_or(PileupError::NotFound(call)));
            let _ = resp.send(res);
        }
        Command::Clear { resp } => {
            let _ = resp.send(pileup.queue.clear().await);
        }
        Command::Advance { operator, resp } => {
            let _ = resp.send(pileup.qso.advance(operator).await);
        }
        Command::Complete { operator, resp } => {
            let _ = resp.send(pileup.qso.complete(operator).await);
        }
        Command::GetCurrent { resp } => {
            let _ = resp.send(pileup.qso.get_current().await);
        }
        Command::SetCurrent {
            callsign,
            lookup,
            operator,
            resp,
        } => {
            let res = match Callsign::parse(&callsign) {
                Ok(call) => pileup.qso.set_current(call, lookup, operator).await,
                Err(err) => Err(err),
            };
            let _ = resp.send(res);
        }
        Command::GetStatus { resp } => {
            let _ = resp.send(pileup.status.get().await);
        }
        Command::SetStatus {
            active,
            operator,
            resp,
        } => {
            let _ = resp.send(pileup.status.set(active, operator).await);
        }
        Command::IsActive { resp } => {
            let _ = resp.send(pileup.status.is_active().await);
        }
        Command::GetFrequency { resp } => {
            let _ = resp.send(pileup.frequency.get().await);
        }
        Command::SetFrequency {
            frequency,
            operator,
            resp,
        } => {
            let _ = resp.send(pileup.frequency.set(&frequency, operator).await);
        }
        Command::ClearFrequency { operator, resp } => {
            let _ = resp.send(pileup.frequency.clear(operator).await);
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}
