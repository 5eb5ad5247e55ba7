//! Observability: per-thread runtime counters behind a sink boundary.

pub(crate) mod metrics;
pub(crate) mod sink;

pub use metrics::{EventOps, EventReport, ModelCounters, ModelSummary};
pub use sink::{
    MetricsEvent, MetricsSink, StatementKind, metrics_report, metrics_reset_all, with_metrics_sink,
};
