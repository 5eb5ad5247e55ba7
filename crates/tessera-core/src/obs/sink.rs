//! Metrics sink boundary.
//!
//! Engine code never touches `obs::metrics` directly; every counter update
//! flows through `MetricsEvent` and `record`.

use crate::obs::metrics::{self, EventState};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// StatementKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum StatementKind {
    Count,
    Delete,
    Insert,
    Select,
    Update,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    Statement {
        kind: StatementKind,
        model: &'a str,
        rows: u64,
    },
    Recompute {
        model: &'a str,
        records: u64,
    },
    Invalidate {
        model: &'a str,
        records: u64,
    },
    CacheLookup {
        model: &'a str,
        hit: bool,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink writing into the thread-local event state.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        metrics::with_state_mut(|m| apply(m, event));
    }
}

fn apply(m: &mut EventState, event: MetricsEvent<'_>) {
    match event {
        MetricsEvent::Statement { kind, model, rows } => {
            let entry = m.models.entry(model.to_string()).or_default();
            match kind {
                StatementKind::Count => {
                    m.ops.counts = m.ops.counts.saturating_add(1);
                    entry.counts = entry.counts.saturating_add(1);
                }
                StatementKind::Delete => {
                    m.ops.deletes = m.ops.deletes.saturating_add(1);
                    entry.deletes = entry.deletes.saturating_add(1);
                }
                StatementKind::Insert => {
                    m.ops.inserts = m.ops.inserts.saturating_add(1);
                    entry.inserts = entry.inserts.saturating_add(1);
                }
                StatementKind::Select => {
                    m.ops.selects = m.ops.selects.saturating_add(1);
                    m.ops.rows_loaded = m.ops.rows_loaded.saturating_add(rows);
                    entry.selects = entry.selects.saturating_add(1);
                    entry.rows_loaded = entry.rows_loaded.saturating_add(rows);
                }
                StatementKind::Update => {
                    m.ops.updates = m.ops.updates.saturating_add(1);
                    entry.updates = entry.updates.saturating_add(1);
                }
            }
        }

        MetricsEvent::Recompute { model, records } => {
            m.ops.recomputes = m.ops.recomputes.saturating_add(records);
            let entry = m.models.entry(model.to_string()).or_default();
            entry.recomputes = entry.recomputes.saturating_add(records);
        }

        MetricsEvent::Invalidate { model, records } => {
            m.ops.invalidations = m.ops.invalidations.saturating_add(records);
            let entry = m.models.entry(model.to_string()).or_default();
            entry.invalidations = entry.invalidations.saturating_add(records);
        }

        MetricsEvent::CacheLookup { model, hit } => {
            let entry = m.models.entry(model.to_string()).or_default();
            if hit {
                m.ops.cache_hits = m.ops.cache_hits.saturating_add(1);
                entry.cache_hits = entry.cache_hits.saturating_add(1);
            } else {
                m.ops.cache_misses = m.ops.cache_misses.saturating_add(1);
                entry.cache_misses = entry.cache_misses.saturating_add(1);
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current thread's metrics.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = self.0.take();
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingSink(Cell<u64>);

    impl MetricsSink for CountingSink {
        fn record(&self, _event: MetricsEvent<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn statements_accumulate_per_model() {
        metrics_reset_all();
        record(MetricsEvent::Statement {
            kind: StatementKind::Update,
            model: "Invoice",
            rows: 1,
        });
        record(MetricsEvent::Statement {
            kind: StatementKind::Select,
            model: "Invoice",
            rows: 3,
        });

        let report = metrics_report();
        let invoice = report.model("Invoice");
        assert_eq!(invoice.updates, 1);
        assert_eq!(invoice.selects, 1);
        assert_eq!(invoice.rows_loaded, 3);
        assert_eq!(report.model("Unknown").updates, 0);
    }

    #[test]
    fn report_serializes_per_model_counters() {
        metrics_reset_all();
        record(MetricsEvent::Statement {
            kind: StatementKind::Insert,
            model: "Tag",
            rows: 1,
        });

        let json = serde_json::to_string(&metrics_report()).expect("serialize");
        let back: metrics::EventReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.model("Tag").inserts, 1);
        assert_eq!(back.counters.inserts, 1);
    }

    #[test]
    fn override_sink_is_scoped() {
        metrics_reset_all();
        let sink = Rc::new(CountingSink(Cell::new(0)));

        with_metrics_sink(sink.clone(), || {
            record(MetricsEvent::CacheLookup {
                model: "Post",
                hit: true,
            });
        });
        record(MetricsEvent::CacheLookup {
            model: "Post",
            hit: false,
        });

        assert_eq!(sink.0.get(), 1);
        let post = metrics_report().model("Post");
        assert_eq!(post.cache_hits, 0);
        assert_eq!(post.cache_misses, 1);
    }
}
