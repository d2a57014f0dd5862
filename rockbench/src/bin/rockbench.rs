use std::{fmt, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use clap::{ArgAction, Parser, builder::BoolishValueParser};
use jemallocator::Jemalloc;
use metrics_exporter_prometheus::BuildError;
use rockbench::{
    config::{self, Config, Telemetry},
    destination::{self, elastic, rockset},
    latency::{self, Probe},
    scheduler::{self, Scheduler, Summary},
    signals::{self, Shutdown},
    telemetry,
};
use rockbench_payload::{Generator, IdMode, IdSpace, PatchStyle, RunMode, random_identifier};
use tokio::{
    runtime::Builder,
    signal::{
        self,
        unix::{SignalKind, signal as unix_signal},
    },
    sync::mpsc,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::Error),
    #[error("Destination failed: {0}")]
    Destination(#[from] destination::Error),
    #[error("Scheduler failed: {0}")]
    Scheduler(#[from] scheduler::Error),
    #[error("Failed to install Prometheus exporter: {0}")]
    Prometheus(#[from] BuildError),
    #[error(transparent)]
    Shutdown(#[from] signals::Error),
    #[error("{setting} must be set for the {destination} destination")]
    MissingSetting {
        setting: &'static str,
        destination: DestinationKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestinationKind {
    Null,
    Rockset,
    Elastic,
}

impl FromStr for DestinationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "rockset" => Ok(Self::Rockset),
            "elastic" => Ok(Self::Elastic),
            _ => Err(format!(
                "unsupported destination '{s}', expected one of: rockset, elastic, null"
            )),
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "null",
            Self::Rockset => "rockset",
            Self::Elastic => "elastic",
        })
    }
}

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// document batches issued per second
    #[clap(long, env = "WPS")]
    wps: u32,
    /// documents or patches per batch
    #[clap(long, env = "BATCH_SIZE")]
    batch_size: usize,
    /// where documents are sent: rockset, elastic or null
    #[clap(long, env = "DESTINATION")]
    destination: DestinationKind,
    /// documents to issue before stopping, negative for no limit. In patch
    /// mode, the number of existing documents to patch.
    #[clap(long, env = "NUM_DOCS", default_value_t = -1, allow_negative_numbers = true)]
    num_docs: i64,
    /// add, patch, add_then_patch or mixed
    #[clap(long, env = "MODE", default_value_t = RunMode::Add)]
    mode: RunMode,
    /// uuid or sequential
    #[clap(long, env = "ID_MODE", default_value_t = IdMode::Uuid)]
    id_mode: IdMode,
    /// replace or add
    #[clap(long, env = "PATCH_MODE", default_value_t = PatchStyle::Replace)]
    patch_mode: PatchStyle,
    /// patch batches issued per second, defaults to wps
    #[clap(long, env = "PPS")]
    pps: Option<u32>,
    /// patches to issue before stopping, unlimited if unset
    #[clap(long, env = "NUM_PATCHES")]
    num_patches: Option<u64>,
    /// documents already present at the start of a mixed run
    #[clap(long, env = "EXISTING_DOCS", default_value_t = 0)]
    existing_docs: u64,
    /// percentage of mixed-mode documents that update an existing id
    #[clap(long, env = "UPDATE_PERCENTAGE", default_value_t = 0)]
    update_percentage: u8,
    /// number of distinct cluster keys, zero disables clustering
    #[clap(long, env = "NUM_CLUSTERS", default_value_t = 0)]
    num_clusters: u32,
    /// percentage of documents routed to the hot cluster
    #[clap(long, env = "HOT_CLUSTER_PERCENTAGE")]
    hot_cluster_percentage: Option<u8>,
    /// upper limit on unanswered requests, unlimited if unset
    #[clap(long, env = "MAX_IN_FLIGHT")]
    max_in_flight: Option<usize>,
    /// seed for document generation, random if unset
    #[clap(long, env = "SEED")]
    seed: Option<u64>,
    /// serve metrics for Prometheus
    #[clap(long, env = "EXPORT_METRICS", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    export_metrics: bool,
    /// listen address of the metrics exporter
    #[clap(long, env = "METRICS_ADDR", default_value_t = SocketAddr::from(telemetry::DEFAULT_ADDR))]
    metrics_addr: SocketAddr,
    /// periodically measure end-to-end latency
    #[clap(long, env = "TRACK_LATENCY", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    track_latency: bool,
    /// replicas sharing the destination, scales the latency polling period
    #[clap(long, env = "REPLICAS", default_value_t = 2)]
    replicas: u32,
    /// Rockset API key
    #[clap(long, env = "ROCKSET_API_KEY", hide_env_values = true)]
    rockset_api_key: Option<String>,
    /// Rockset API server URL
    #[clap(long, env = "ROCKSET_API_SERVER")]
    rockset_api_server: Option<String>,
    /// Rockset collection as <workspace>.<collection>
    #[clap(long, env = "ROCKSET_COLLECTION")]
    rockset_collection: Option<String>,
    /// Elasticsearch Authorization header value
    #[clap(long, env = "ELASTIC_AUTH", hide_env_values = true)]
    elastic_auth: Option<String>,
    /// Elasticsearch URL
    #[clap(long, env = "ELASTIC_URL")]
    elastic_url: Option<String>,
    /// Elasticsearch index
    #[clap(long, env = "ELASTIC_INDEX")]
    elastic_index: Option<String>,
    /// maximum seconds to wait for dispatched batches to be answered once
    /// dispatch stops, batches still unanswered are abandoned
    #[clap(long, env = "MAX_SHUTDOWN_DELAY", default_value_t = 30)]
    max_shutdown_delay: u16,
}

fn required(
    value: Option<&String>,
    setting: &'static str,
    destination: DestinationKind,
) -> Result<String, Error> {
    value.cloned().ok_or(Error::MissingSetting {
        setting,
        destination,
    })
}

impl Args {
    fn destination(&self) -> Result<destination::Config, Error> {
        let kind = self.destination;
        Ok(match kind {
            DestinationKind::Null => destination::Config::Null,
            DestinationKind::Rockset => destination::Config::Rockset(rockset::Config {
                api_key: required(self.rockset_api_key.as_ref(), "ROCKSET_API_KEY", kind)?,
                api_server: required(self.rockset_api_server.as_ref(), "ROCKSET_API_SERVER", kind)?,
                collection_path: required(self.rockset_collection.as_ref(), "ROCKSET_COLLECTION", kind)?,
            }),
            DestinationKind::Elastic => destination::Config::Elastic(elastic::Config {
                auth: required(self.elastic_auth.as_ref(), "ELASTIC_AUTH", kind)?,
                url: required(self.elastic_url.as_ref(), "ELASTIC_URL", kind)?,
                index: required(self.elastic_index.as_ref(), "ELASTIC_INDEX", kind)?,
            }),
        })
    }

    fn config(&self) -> Result<Config, Error> {
        let workload = scheduler::Config {
            run_mode: self.mode,
            id_mode: self.id_mode,
            patch_style: self.patch_mode,
            documents_per_second: self.wps,
            patches_per_second: self.pps.unwrap_or(self.wps),
            batch_size: self.batch_size,
            num_docs: u64::try_from(self.num_docs).ok(),
            num_patches: self.num_patches,
            existing_docs: self.existing_docs,
            update_percentage: self.update_percentage,
            num_clusters: self.num_clusters,
            hot_cluster_percentage: self.hot_cluster_percentage,
            max_in_flight: self.max_in_flight,
            seed: self.seed,
        };
        let telemetry = if self.export_metrics {
            Telemetry::Prometheus {
                addr: self.metrics_addr,
            }
        } else {
            Telemetry::Disabled
        };
        let latency = self.track_latency.then_some(latency::Config {
            replicas: self.replicas,
        });
        Ok(Config {
            workload,
            destination: self.destination()?,
            telemetry,
            latency,
        })
    }
}

/// How watching for operator interrupts ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupts {
    /// A second interrupt arrived, the process must exit now
    ForceExit,
    /// The interrupt source went away
    Closed,
}

/// First interrupt stops dispatch, the second forces an exit.
async fn watch_interrupts(
    mut interrupts: mpsc::Receiver<()>,
    shutdown: Shutdown,
) -> Result<Interrupts, Error> {
    if interrupts.recv().await.is_none() {
        return Ok(Interrupts::Closed);
    }
    info!("signal received, stopping dispatch. Signal again to exit immediately.");
    shutdown.signal()?;

    if interrupts.recv().await.is_none() {
        return Ok(Interrupts::Closed);
    }
    error!("second signal received, exiting immediately");
    Ok(Interrupts::ForceExit)
}

/// Forward SIGINT and SIGTERM until the receiver is dropped.
async fn forward_signals(interrupts: mpsc::Sender<()>) -> Result<(), Error> {
    let mut terminate = unix_signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            res = signal::ctrl_c() => res?,
            _ = terminate.recv() => {},
        }
        if interrupts.send(()).await.is_err() {
            return Ok(());
        }
    }
}

async fn inner_main(config: Config, max_shutdown_delay: Duration) -> Result<Summary, Error> {
    let generator_identifier = random_identifier(&mut rand::rng(), 10);
    info!("Generator identifier: {generator_identifier}");

    if let Telemetry::Prometheus { addr } = config.telemetry {
        telemetry::install(addr, &generator_identifier)?;
        info!("serving metrics on {addr}");
    }

    let destination = config.destination.build(&generator_identifier)?;
    destination.configure().await?;

    let shutdown = Shutdown::new();
    let (interrupt_tx, interrupt_rx) = mpsc::channel(2);
    tokio::spawn(async move {
        if let Err(err) = forward_signals(interrupt_tx).await {
            error!("signal handling failed: {err}");
        }
    });
    let watcher = shutdown.clone();
    tokio::spawn(async move {
        match watch_interrupts(interrupt_rx, watcher).await {
            Ok(Interrupts::ForceExit) => std::process::exit(1),
            Ok(Interrupts::Closed) => {}
            Err(err) => error!("signal handling failed: {err}"),
        }
    });

    if let Some(latency) = config.latency {
        let probe = Probe::new(latency, Arc::clone(&destination), shutdown.clone());
        tokio::spawn(probe.run());
    }

    let generator = Generator::new(config.spec(&generator_identifier), Arc::new(IdSpace::new()));
    info!(
        mode = %config.workload.run_mode,
        destination = destination.name(),
        "starting dispatch"
    );
    let mut scheduler = Scheduler::new(config.workload, generator, destination, shutdown.clone());
    let summary = scheduler.run().await?;
    info!(
        documents = summary.documents,
        patches = summary.patches,
        interrupted = summary.interrupted,
        "dispatch finished"
    );

    // Stop the latency probe.
    shutdown.signal()?;
    let abandoned = scheduler.drain(max_shutdown_delay).await;
    info!(abandoned, "dispatched batches settled");
    Ok(summary)
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting rockbench {version} run.");

    let args = Args::parse();
    let config = args.config()?;
    config.validate()?;
    let max_shutdown_delay = Duration::from_secs(args.max_shutdown_delay.into());

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(config, max_shutdown_delay));
    info!(
        "Shutting down runtime with a {} second delay. May leave orphaned tasks.",
        max_shutdown_delay.as_secs(),
    );
    runtime.shutdown_timeout(max_shutdown_delay);
    info!("Bye. :)");
    res.map(|_| ())
}
