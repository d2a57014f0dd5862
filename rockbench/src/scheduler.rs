//! The dispatch scheduler.
//!
//! A run is a sequence of phases derived from its [`RunMode`]. Each phase is
//! driven by a one second tick. On every tick the scheduler generates and
//! dispatches the phase's per-second number of batches, each batch handed to
//! its own task. Dispatch does not wait for the destination to answer, the
//! measured quantity is the offered rate. A phase ends when its budget is
//! spent, if it has one, or when shutdown is signaled.
//!
//! Generation happens on the scheduling task and is fatal on failure. A
//! destination failure is only counted and logged.
//!
//! Dispatched batches are tracked so that callers may wait a bounded time for
//! their answers once the run is over, see [`Scheduler::drain`].

use std::{sync::Arc, time::Duration};

use rand::{SeedableRng, rngs::SmallRng};
use rockbench_payload::{
    Document, Generator, IdMode, Patch, PatchStyle, PatchTemplates, RunMode, Spec,
    generate_patches,
};
use tokio::{
    sync::{AcquireError, OwnedSemaphorePermit, Semaphore},
    task::JoinSet,
    time::{Instant, MissedTickBehavior, interval, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{destination::Destination, signals::Shutdown, telemetry};

/// Length of one scheduling tick.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Scheduler`]
pub enum Error {
    /// Document or patch generation failed
    #[error("Generation failed: {0}")]
    Payload(#[from] rockbench_payload::Error),
    /// The in-flight limit semaphore was closed
    #[error("In-flight limit closed: {0}")]
    Semaphore(#[from] AcquireError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Configuration of the workload a [`Scheduler`] drives
pub struct Config {
    /// Shape of the run
    pub run_mode: RunMode,
    /// How ids are assigned outside of mixed mode
    pub id_mode: IdMode,
    /// Flavor of patch mutations
    pub patch_style: PatchStyle,
    /// Document batches issued per tick in add and mixed phases
    pub documents_per_second: u32,
    /// Patch batches issued per tick in patch phases
    pub patches_per_second: u32,
    /// Documents or patches per batch
    pub batch_size: usize,
    /// Documents to issue before the add or mixed phase ends. For patch-only
    /// runs this is the number of existing documents to patch.
    pub num_docs: Option<u64>,
    /// Patches to issue before the patch phase ends
    pub num_patches: Option<u64>,
    /// Documents already present when a mixed run starts
    pub existing_docs: u64,
    /// Percentage of mixed-mode documents that update an existing id
    pub update_percentage: u8,
    /// Number of distinct cluster keys, zero disables clustering
    pub num_clusters: u32,
    /// Percentage of documents routed to the hot cluster
    pub hot_cluster_percentage: Option<u8>,
    /// Upper limit on unanswered destination requests, unlimited if unset
    pub max_in_flight: Option<usize>,
    /// Seed for generation, random if unset
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_mode: RunMode::default(),
            id_mode: IdMode::default(),
            patch_style: PatchStyle::default(),
            documents_per_second: 1,
            patches_per_second: 1,
            batch_size: 1,
            num_docs: None,
            num_patches: None,
            existing_docs: 0,
            update_percentage: 0,
            num_clusters: 0,
            hot_cluster_percentage: None,
            max_in_flight: None,
            seed: None,
        }
    }
}

impl Config {
    /// The generation spec for this workload.
    #[must_use]
    pub fn spec(&self, generator_identifier: &str, assign_ids: bool) -> Spec {
        let mut spec = Spec::new(generator_identifier, self.batch_size);
        spec.run_mode = self.run_mode;
        spec.id_mode = self.id_mode;
        spec.update_percentage = self.update_percentage;
        spec.num_clusters = self.num_clusters;
        spec.hot_cluster_percentage = self.hot_cluster_percentage;
        spec.assign_ids = assign_ids;
        spec
    }
}

/// One stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Insert new documents
    Add,
    /// Patch existing documents
    Patch,
    /// Insert or update documents
    Mixed,
}

impl Phase {
    /// The phases of a run, in order.
    #[must_use]
    pub fn sequence(run_mode: RunMode) -> &'static [Phase] {
        match run_mode {
            RunMode::Add => &[Phase::Add],
            RunMode::Patch => &[Phase::Patch],
            RunMode::AddThenPatch => &[Phase::Add, Phase::Patch],
            RunMode::Mixed => &[Phase::Mixed],
        }
    }

    /// Metric label for this phase.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Phase::Add => "add",
            Phase::Patch => "patch",
            Phase::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// What a run issued. Issued is not the same as written: dispatch is not
/// awaited.
pub struct Summary {
    /// Documents issued by add and mixed phases
    pub documents: u64,
    /// Patches issued by patch phases
    pub patches: u64,
    /// `true` if shutdown interrupted the run before its budget was spent
    pub interrupted: bool,
}

enum Batch {
    Documents(Vec<Document>),
    Patches(Vec<Patch>),
}

impl Batch {
    fn len(&self) -> usize {
        match self {
            Batch::Documents(docs) => docs.len(),
            Batch::Patches(patches) => patches.len(),
        }
    }
}

/// Drives one run from its first tick to budget exhaustion or shutdown.
#[derive(Debug)]
pub struct Scheduler {
    config: Config,
    generator: Generator,
    destination: Arc<dyn Destination>,
    in_flight: Option<Arc<Semaphore>>,
    rng: SmallRng,
    templates: PatchTemplates<SmallRng>,
    dispatched: JoinSet<()>,
    shutdown: Shutdown,
}

impl Scheduler {
    /// Create a new [`Scheduler`]
    #[must_use]
    pub fn new(
        config: Config,
        generator: Generator,
        destination: Arc<dyn Destination>,
        shutdown: Shutdown,
    ) -> Self {
        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(&mut rand::rng()),
        };
        let templates = PatchTemplates::new(config.patch_style, SmallRng::from_rng(&mut rng));
        let in_flight = config.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        Self {
            config,
            generator,
            destination,
            in_flight,
            rng,
            templates,
            dispatched: JoinSet::new(),
            shutdown,
        }
    }

    /// Run to completion.
    ///
    /// Returns once every phase has spent its budget or shutdown has been
    /// signaled. Batches already dispatched may still be in flight, see
    /// [`Scheduler::drain`].
    ///
    /// # Errors
    ///
    /// Function will error if generation fails. The run stops at that point.
    pub async fn run(&mut self) -> Result<Summary, Error> {
        let mut summary = Summary::default();
        for phase in Phase::sequence(self.config.run_mode) {
            match phase {
                Phase::Add => {}
                Phase::Patch => {
                    // Patch-only runs target documents loaded beforehand,
                    // otherwise the preceding add phase defines the range.
                    let bound = if self.config.run_mode == RunMode::Patch {
                        self.config.num_docs.unwrap_or(0)
                    } else {
                        summary.documents
                    };
                    self.generator.id_space().set_bound(bound);
                }
                Phase::Mixed => {
                    self.generator
                        .id_space()
                        .set_bound(self.config.existing_docs);
                }
            }

            info!(
                phase = phase.name(),
                bound = self.generator.id_space().bound(),
                "starting phase"
            );
            let (issued, interrupted) = self.run_phase(*phase).await?;
            match phase {
                Phase::Add | Phase::Mixed => summary.documents += issued,
                Phase::Patch => summary.patches += issued,
            }
            info!(phase = phase.name(), issued, "phase finished");
            if interrupted {
                summary.interrupted = true;
                break;
            }
        }
        Ok(summary)
    }

    /// Wait up to `limit` for dispatched batches to be answered, then abort
    /// the rest. Returns the number of batches abandoned.
    pub async fn drain(&mut self, limit: Duration) -> usize {
        let outstanding = self.dispatched.len();
        if outstanding == 0 {
            return 0;
        }
        info!(outstanding, "waiting for dispatched batches");

        let dispatched = &mut self.dispatched;
        let joined = timeout(limit, async {
            while dispatched.join_next().await.is_some() {}
        })
        .await;
        if joined.is_ok() {
            return 0;
        }

        let abandoned = self.dispatched.len();
        warn!(abandoned, "batches still in flight at shutdown, abandoning");
        self.dispatched.abort_all();
        while self.dispatched.join_next().await.is_some() {}
        abandoned
    }

    fn rate_and_budget(&self, phase: Phase) -> (u32, Option<u64>) {
        match phase {
            Phase::Add | Phase::Mixed => (self.config.documents_per_second, self.config.num_docs),
            Phase::Patch => (self.config.patches_per_second, self.config.num_patches),
        }
    }

    /// Returns units issued and whether shutdown interrupted the phase.
    async fn run_phase(&mut self, phase: Phase) -> Result<(u64, bool), Error> {
        let (rate, budget) = self.rate_and_budget(phase);
        let batch_size = self.config.batch_size as u64;
        let mut issued: u64 = 0;

        let mut ticker = interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown_wait = self.shutdown.recv();
        tokio::pin!(shutdown_wait);

        loop {
            if budget.is_some_and(|budget| issued >= budget) {
                return Ok((issued, false));
            }

            tokio::select! {
                biased;

                () = &mut shutdown_wait => {
                    info!("shutdown signal received");
                    return Ok((issued, true));
                }
                _ = ticker.tick() => {}
            }

            let tick_start = Instant::now();
            while self.dispatched.try_join_next().is_some() {}
            for _ in 0..rate {
                let size = match budget {
                    Some(budget) if issued >= budget => break,
                    Some(budget) => batch_size.min(budget - issued),
                    None => batch_size,
                };

                let permit = match &self.in_flight {
                    Some(semaphore) => tokio::select! {
                        biased;

                        () = &mut shutdown_wait => {
                            info!("shutdown signal received while waiting for in-flight requests");
                            return Ok((issued, true));
                        }
                        permit = Arc::clone(semaphore).acquire_owned() => Some(permit?),
                    },
                    None => None,
                };

                #[allow(clippy::cast_possible_truncation)]
                let size = size as usize;
                let batch = match phase {
                    Phase::Add | Phase::Mixed => {
                        Batch::Documents(self.generator.generate_batch(&mut self.rng, size)?)
                    }
                    Phase::Patch => Batch::Patches(generate_patches(
                        self.generator.id_space(),
                        &mut self.templates,
                        &mut self.rng,
                        size,
                    )?),
                };
                let count = batch.len() as u64;
                dispatch(&mut self.dispatched, &self.destination, batch, permit);
                telemetry::record_issued(phase.name(), count);
                issued += count;
            }

            let elapsed = tick_start.elapsed();
            if elapsed > TICK_PERIOD {
                warn!(
                    phase = phase.name(),
                    elapsed_ms = elapsed.as_millis(),
                    "tick overran its period, offered rate is below target"
                );
            } else {
                debug!(phase = phase.name(), issued, "tick complete");
            }
        }
    }
}

/// Hand `batch` to the destination on its own task. The permit, if any, is
/// held until the destination answers.
fn dispatch(
    dispatched: &mut JoinSet<()>,
    destination: &Arc<dyn Destination>,
    batch: Batch,
    permit: Option<OwnedSemaphorePermit>,
) {
    let destination = Arc::clone(destination);
    dispatched.spawn(async move {
        let _permit = permit;
        let _in_flight = telemetry::InFlight::start();
        let count = batch.len() as u64;
        match batch {
            Batch::Documents(docs) => match destination.send_documents(&docs).await {
                Ok(()) => telemetry::record_writes_completed(count),
                Err(err) => {
                    telemetry::record_writes_errored(count);
                    error!(
                        destination = destination.name(),
                        "failed to send document batch: {err}"
                    );
                }
            },
            Batch::Patches(patches) => match destination.send_patches(&patches).await {
                Ok(()) => telemetry::record_patches_completed(count),
                Err(err) => {
                    telemetry::record_patches_errored(count);
                    error!(
                        destination = destination.name(),
                        "failed to send patch batch: {err}"
                    );
                }
            },
        }
    });
}
