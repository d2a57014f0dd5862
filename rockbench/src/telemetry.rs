//! Run telemetry.
//!
//! Thin wrappers over the `metrics` macros so that every call site agrees on
//! metric names. Whatever recorder is installed receives the values, in
//! production that is the Prometheus exporter installed by [`install`].

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Documents acknowledged by the destination
pub const WRITES_COMPLETED: &str = "writes_completed";
/// Documents in failed requests
pub const WRITES_ERRORED: &str = "writes_errored";
/// Patches acknowledged by the destination
pub const PATCHES_COMPLETED: &str = "patches_completed";
/// Patches in failed requests
pub const PATCHES_ERRORED: &str = "patches_errored";
/// Request body bytes put on the wire
pub const BYTES_SENT: &str = "bytes_sent";
/// Most recent end-to-end latency, microseconds
pub const E2E_LATENCY: &str = "e2e_latencies";
/// Distribution of end-to-end latency, microseconds
pub const E2E_LATENCY_HISTOGRAM: &str = "e2e_latencies_metric";
/// Units issued by the scheduler, confirmed or not
pub const DOCUMENTS_ISSUED: &str = "documents_issued";
/// Documents handed to a destination client, counted before the request
pub const EVENTS_INGESTED: &str = "num_events_ingested";
/// Destination requests not yet answered
pub const REQUESTS_IN_FLIGHT: &str = "requests_in_flight";

/// Default listen address for the exporter.
pub const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9161);

/// Install the Prometheus exporter on `addr`.
///
/// Every metric carries a `generator_identifier` label so replicas sharing a
/// scrape target stay distinguishable.
///
/// # Errors
///
/// Function will error if the listener cannot be bound or a recorder is
/// already installed.
pub fn install(addr: SocketAddr, generator_identifier: &str) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("generator_identifier", generator_identifier)
        .install()
}

/// Record `n` documents written.
pub fn record_writes_completed(n: u64) {
    counter!(WRITES_COMPLETED).increment(n);
}

/// Record `n` documents that failed to write.
pub fn record_writes_errored(n: u64) {
    counter!(WRITES_ERRORED).increment(n);
}

/// Record `n` patches applied.
pub fn record_patches_completed(n: u64) {
    counter!(PATCHES_COMPLETED).increment(n);
}

/// Record `n` patches that failed to apply.
pub fn record_patches_errored(n: u64) {
    counter!(PATCHES_ERRORED).increment(n);
}

/// Record `n` documents about to be sent, whatever the outcome.
pub fn record_events_ingested(n: u64) {
    counter!(EVENTS_INGESTED).increment(n);
}

/// Record `n` request body bytes sent.
pub fn record_bytes_sent(n: u64) {
    counter!(BYTES_SENT).increment(n);
}

/// Record one end-to-end latency observation in microseconds.
pub fn record_e2e_latency(micros: f64) {
    gauge!(E2E_LATENCY).set(micros);
    histogram!(E2E_LATENCY_HISTOGRAM).record(micros);
}

/// Record `n` units issued by the scheduler in `phase`.
pub fn record_issued(phase: &'static str, n: u64) {
    counter!(DOCUMENTS_ISSUED, "phase" => phase).increment(n);
}

/// Tracks one outstanding destination request for as long as it lives.
#[derive(Debug)]
#[must_use]
pub struct InFlight(());

impl InFlight {
    /// Mark a request as in flight.
    pub fn start() -> Self {
        gauge!(REQUESTS_IN_FLIGHT).increment(1.0);
        Self(())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(REQUESTS_IN_FLIGHT).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use metrics::Key;
    use metrics_util::{
        CompositeKey, MetricKind,
        debugging::{DebugValue, DebuggingRecorder},
    };

    use super::*;

    fn value(
        snapshot: &[(CompositeKey, DebugValue)],
        kind: MetricKind,
        name: &'static str,
    ) -> Option<DebugValue> {
        snapshot
            .iter()
            .find(|(key, _)| *key == CompositeKey::new(kind, Key::from_name(name)))
            .map(|(_, value)| match value {
                // `DebugValue` does not implement `Clone` in metrics-util 0.17.
                DebugValue::Counter(v) => DebugValue::Counter(*v),
                DebugValue::Gauge(v) => DebugValue::Gauge(*v),
                DebugValue::Histogram(v) => DebugValue::Histogram(v.clone()),
            })
    }

    fn capture(f: impl FnOnce()) -> Vec<(CompositeKey, DebugValue)> {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, f);
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| (key, value))
            .collect()
    }

    #[test]
    fn counters_accumulate() {
        let snapshot = capture(|| {
            record_writes_completed(3);
            record_writes_completed(4);
            record_writes_errored(2);
            record_patches_completed(5);
            record_patches_errored(1);
            record_bytes_sent(1024);
            record_events_ingested(6);
        });

        for (name, expected) in [
            (WRITES_COMPLETED, 7),
            (WRITES_ERRORED, 2),
            (PATCHES_COMPLETED, 5),
            (PATCHES_ERRORED, 1),
            (BYTES_SENT, 1024),
            (EVENTS_INGESTED, 6),
        ] {
            match value(&snapshot, MetricKind::Counter, name) {
                Some(DebugValue::Counter(v)) => assert_eq!(v, expected, "{name}"),
                other => panic!("unexpected value for {name}: {other:?}"),
            }
        }
    }

    #[test]
    fn latency_sets_gauge_and_histogram() {
        let snapshot = capture(|| {
            record_e2e_latency(1_500.0);
            record_e2e_latency(2_500.0);
        });

        match value(&snapshot, MetricKind::Gauge, E2E_LATENCY) {
            Some(DebugValue::Gauge(v)) => assert_eq!(v, 2_500.0),
            other => panic!("unexpected gauge: {other:?}"),
        }
        match value(&snapshot, MetricKind::Histogram, E2E_LATENCY_HISTOGRAM) {
            Some(DebugValue::Histogram(v)) => assert_eq!(v.len(), 2),
            other => panic!("unexpected histogram: {other:?}"),
        }
    }

    #[test]
    fn in_flight_guard_balances() {
        let snapshot = capture(|| {
            let a = InFlight::start();
            let b = InFlight::start();
            drop(a);
            let c = InFlight::start();
            drop(b);
            drop(c);
        });

        match value(&snapshot, MetricKind::Gauge, REQUESTS_IN_FLIGHT) {
            Some(DebugValue::Gauge(v)) => assert_eq!(v, 0.0),
            other => panic!("unexpected gauge: {other:?}"),
        }
    }
}
