use std::sync::Arc;

use tracing::info;

use crate::{
    error::{PileupError, PileupResult},
    persist::StoreHandle,
    qso::Frequency,
    runtime::{
        broadcaster::Broadcaster,
        events::{Event, EventPayload},
    },
    types::{OperatorId, now},
};

/// Operating frequency announced to waiting stations.
///
/// Independent of the status switch; a new session keeps the last frequency.
#[derive(Clone)]
pub struct FrequencyBoard {
    store: StoreHandle,
    events: Arc<Broadcaster>,
}

impl FrequencyBoard {
    /// Creates a board over `store`.
    pub fn new(store: StoreHandle, events: Arc<Broadcaster>) -> Self {
        Self { store, events }
    }

    /// Announced frequency, if any.
    pub async fn get(&self) -> PileupResult<Option<Frequency>> {
        self.store.call("get_frequency", |s| s.get_frequency()).await
    }

    /// Announces `frequency` (trimmed, must not be empty).
    pub async fn set(&self, frequency: &str, operator: OperatorId) -> PileupResult<Frequency> {
        let text = frequency.trim();
        if text.is_empty() {
            return Err(PileupError::InvalidFrequency);
        }
        let doc = Frequency {
            frequency: text.to_string(),
            last_changed_at: now(),
            changed_by: operator,
        };
        let stored = doc.clone();
        self.store
            .mutate("put_frequency", move |s| s.put_frequency(&stored))
            .await?;

        info!(frequency = %doc.frequency, operator = %doc.changed_by, "frequency set");
        self.events
            .publish(Event::new(EventPayload::Frequency(Some(doc.clone()))));
        Ok(doc)
    }

    /// Withdraws the announced frequency.
    pub async fn clear(&self, operator: OperatorId) -> PileupResult<Option<Frequency>> {
        let cleared = self
            .store
            .mutate("take_frequency", |s| s.take_frequency())
            .await?;
        if cleared.is_some() {
            info!(%operator, "frequency cleared");
            self.events.publish(Event::new(EventPayload::Frequency(None)));
        }
        Ok(cleared)
    }
}
