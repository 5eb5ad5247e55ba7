use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for one thread.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub models: BTreeMap<String, ModelCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Statements
    pub selects: u64,
    pub counts: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub rows_loaded: u64,

    // Dependency engine
    pub recomputes: u64,
    pub invalidations: u64,

    // Cache
    pub cache_hits: u64,
    pub cache_misses: u64,
}

///
/// ModelCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ModelCounters {
    pub selects: u64,
    pub counts: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub rows_loaded: u64,
    pub recomputes: u64,
    pub invalidations: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: EventOps,
    pub models: Vec<ModelSummary>,
}

impl EventReport {
    /// Counters of one model, zeroed when the model saw no activity.
    #[must_use]
    pub fn model(&self, name: &str) -> ModelCounters {
        self.models
            .iter()
            .find(|s| s.model == name)
            .map(|s| s.counters.clone())
            .unwrap_or_default()
    }
}

///
/// ModelSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ModelSummary {
    pub model: String,
    pub counters: ModelCounters,
    pub cache_hit_ratio: f64,
}

/// Build a report from the in-memory counters.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub(crate) fn report() -> EventReport {
    let snap = with_state(Clone::clone);

    let models = snap
        .models
        .into_iter()
        .map(|(model, counters)| {
            let lookups = counters.cache_hits + counters.cache_misses;
            let cache_hit_ratio = if lookups > 0 {
                counters.cache_hits as f64 / lookups as f64
            } else {
                0.0
            };

            ModelSummary {
                model,
                counters,
                cache_hit_ratio,
            }
        })
        .collect();

    EventReport {
        counters: snap.ops,
        models,
    }
}
