use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use netpulse::{
    actors::{PollerHandle, PollerSettings, run_single_pass},
    config::{Config, ProberConfig, PublisherConfig, StorageConfig, read_config_file},
    events::{AlertLedger, BroadcastPublisher, EventPublisher, FanoutPublisher, WebhookPublisher},
    monitors::{DeviceMonitor, IspMonitor, PingProber, ThresholdEvaluator},
    prober::{HttpProber, Prober, SimulatedProber, SimulationState},
    storage::{Stores, memory::MemoryStore},
    util::{get_log_level, get_poll_interval, resolve_interval},
};
use tracing::{debug, info, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Device health poller
#[derive(Debug, Clone, Parser)]
#[command(name = "netpulse-poller")]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Seconds between sweep starts (overrides POLL_INTERVAL and the config file)
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,

    /// Devices processed in parallel
    #[arg(long)]
    concurrency: Option<usize>,
}

fn init() {
    let level = get_log_level();
    let filter = filter::Targets::new().with_targets(vec![
        ("netpulse", level),
        ("netpulse_poller", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    let stores = open_stores(&config.storage).await?;
    config.seed(&stores).await?;

    let bus = Arc::new(BroadcastPublisher::default());
    let publisher = build_publisher(&config, bus.clone());
    let prober = build_prober(&config)?;

    let ledger = AlertLedger::new(stores.alerts.clone(), publisher.clone());
    let thresholds = ThresholdEvaluator::new(config.thresholds.clone(), ledger.clone());
    let monitor = DeviceMonitor::new(
        prober,
        stores.devices.clone(),
        stores.metrics.clone(),
        thresholds,
        ledger,
        publisher,
    )
    .with_probe_timeout(config.poller.probe_timeout());

    let isps = config
        .poller
        .probe_isps
        .then(|| IspMonitor::new(Arc::new(PingProber::default()), stores.isps.clone()));

    let concurrency = args.concurrency.unwrap_or(config.poller.concurrency).max(1);

    if args.once {
        info!("starting single poll run");
        let report = run_single_pass(&monitor, isps.as_ref(), concurrency).await;
        info!("single poll run complete: {report:?}");
        return Ok(());
    }

    #[cfg(feature = "api")]
    if let Some(api) = config.api.clone() {
        let state = netpulse::api::ApiState::new(stores.clone(), bus.clone());
        netpulse::api::spawn_api_server(api, state)
            .await
            .context("failed to start API server")?;
    }

    let interval = resolve_interval(args.interval, get_poll_interval(), config.poller.interval);
    info!("polling every {interval}s with concurrency {concurrency}");

    let handle = PollerHandle::spawn(
        monitor,
        isps,
        PollerSettings {
            interval: Duration::from_secs(interval),
            concurrency,
        },
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("stopping poller");
            handle.shutdown().await?;
        }
        _ = handle.stopped() => {}
    }

    handle.stopped().await;
    Ok(())
}

async fn open_stores(storage: &StorageConfig) -> anyhow::Result<Stores> {
    match storage {
        StorageConfig::None => {
            debug!("using in-memory storage");
            Ok(Stores::from_backend(Arc::new(MemoryStore::new())))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let store = netpulse::storage::sqlite::SqliteStore::new(path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            Ok(Stores::from_backend(Arc::new(store)))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage requested but the storage-sqlite feature is disabled")
        }
    }
}

fn build_prober(config: &Config) -> anyhow::Result<Arc<dyn Prober>> {
    Ok(match config.prober {
        ProberConfig::Simulated => Arc::new(SimulatedProber::new(SimulationState::new())),
        ProberConfig::Http => Arc::new(HttpProber::new(config.poller.probe_timeout())?),
    })
}

fn build_publisher(config: &Config, bus: Arc<BroadcastPublisher>) -> Arc<dyn EventPublisher> {
    let mut fanout = FanoutPublisher::new(vec![bus as Arc<dyn EventPublisher>]);
    for publisher in &config.publishers {
        match publisher {
            PublisherConfig::Webhook { url } => {
                debug!("publishing events to webhook {url}");
                fanout.push(Arc::new(WebhookPublisher::new(url.clone())));
            }
        }
    }
    Arc::new(fanout)
}
