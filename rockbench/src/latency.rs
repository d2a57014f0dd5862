//! End-to-end latency probe.
//!
//! Periodically asks the destination for the newest timestamp written by this
//! generator and records how far behind the wall clock it is. Replicas of the
//! generator share a destination, so the polling period scales with the
//! replica count to keep the total query rate near one every 30 seconds, and
//! each replica starts after a random delay to spread queries out.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use rockbench_payload::now_micros;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{info, warn};

use crate::{destination::Destination, signals::Shutdown, telemetry};

/// Polling period contributed by each replica.
pub const PERIOD_PER_REPLICA: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Configuration for [`Probe`]
pub struct Config {
    /// Number of generator replicas sharing the destination
    pub replicas: u32,
}

impl Config {
    /// Time between two queries from this replica.
    #[must_use]
    pub fn period(&self) -> Duration {
        PERIOD_PER_REPLICA * self.replicas.max(1)
    }
}

/// The latency probe task.
#[derive(Debug)]
pub struct Probe {
    destination: Arc<dyn Destination>,
    initial_delay: Duration,
    period: Duration,
    shutdown: Shutdown,
}

impl Probe {
    /// Create a new [`Probe`] with a random initial delay in `[0, period)`.
    #[must_use]
    pub fn new(config: Config, destination: Arc<dyn Destination>, shutdown: Shutdown) -> Self {
        let period = config.period();
        let initial_delay = rand::rng().random_range(Duration::ZERO..period);
        Self {
            destination,
            initial_delay,
            period,
            shutdown,
        }
    }

    /// Poll until shutdown.
    pub async fn run(mut self) {
        info!(
            initial_delay_s = self.initial_delay.as_secs(),
            period_s = self.period.as_secs(),
            "latency probe waiting for its first poll"
        );

        let shutdown_wait = self.shutdown.recv();
        tokio::pin!(shutdown_wait);

        tokio::select! {
            () = sleep(self.initial_delay) => {}
            () = &mut shutdown_wait => {
                info!("shutdown signal received");
                return;
            }
        }

        let mut poll = interval_at(Instant::now() + self.period, self.period);
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Some(latency) = sample(self.destination.as_ref()).await {
                        info!(latency_us = latency, "end-to-end latency");
                    }
                }
                () = &mut shutdown_wait => {
                    info!("shutdown signal received");
                    return;
                }
            }
        }
    }
}

/// Query the destination once and record the latency in microseconds.
///
/// A destination whose newest timestamp is ahead of the local clock has
/// caught up, in that case the query round trip is recorded instead.
#[allow(clippy::cast_precision_loss)]
pub async fn sample(destination: &dyn Destination) -> Option<i64> {
    let issued = now_micros();
    match destination.latest_timestamp().await {
        Ok(latest) => {
            let now = now_micros();
            let latency = if now >= latest {
                now.saturating_sub(latest)
            } else {
                now - issued
            };
            telemetry::record_e2e_latency(latency as f64);
            Some(latency)
        }
        Err(err) => {
            warn!(
                destination = destination.name(),
                "failed to get latest timestamp: {err}"
            );
            None
        }
    }
}
