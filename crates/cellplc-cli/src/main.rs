//! Process entry point (§6 "CLI"): wires a [`Memory`] up to whichever mix
//! of transport, production cycle, runner and simulator the subcommand
//! asks for, then blocks until SIGTERM/SIGINT and stops every component it
//! started, in the reverse of start order.

mod backend;
mod config;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cellplc_cycle::ProductionCycleDriver;
use cellplc_memory::{Memory, MemoryLogger};
use cellplc_runner::ProductionRunner;
use cellplc_sim::PlannerSimulator;
use cellplc_transport::{UdpServer, ZmqServer};
use clap::{Parser, Subcommand, ValueEnum};

use crate::backend::LoggingBackend;
use crate::config::CellConfig;

#[derive(Parser)]
#[command(name = "cellplc")]
#[command(author, version, about = "Pick-and-place cell control plane", long_about = None)]
struct Cli {
    /// Path to a TOML config file; CLI flags override values it sets.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log verbosity when `RUST_LOG` is unset (error/warn/info/debug/trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TransportKind {
    Zmq,
    Udp,
    None,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cell against a real remote planner over the network.
    Serve {
        /// Number of physical locations (1..N) the cell manages.
        #[arg(long, default_value_t = 3)]
        locations: u32,

        /// Which transport to bind for the remote planner.
        #[arg(long, value_enum, default_value_t = TransportKind::Zmq)]
        transport: TransportKind,

        /// Transport bind endpoint. ZMQ takes a `tcp://host:port` endpoint;
        /// UDP takes a bare `host:port` (the notification port is port+1).
        /// Ignored when `--transport none`.
        #[arg(long, default_value = "tcp://0.0.0.0:5560")]
        endpoint: String,

        /// Log every memory change at debug level.
        #[arg(long)]
        log_signals: bool,
    },

    /// Run the cell end-to-end against the built-in planner simulator, with
    /// no network transport -- useful for smoke-testing a deployment or a
    /// customer backend without a real robot attached.
    Demo {
        #[arg(long, default_value_t = 3)]
        locations: u32,

        #[arg(long)]
        log_signals: bool,
    },
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let overrides = match &cli.config {
        Some(path) => CellConfig::load(path).with_context(|| format!("loading config from {path}"))?,
        None => CellConfig::default(),
    };

    match cli.command {
        Commands::Serve { locations, transport, endpoint, log_signals } => {
            run_serve(overrides.locations.unwrap_or(locations), transport, endpoint, log_signals)
        }
        Commands::Demo { locations, log_signals } => run_demo(overrides.locations.unwrap_or(locations), log_signals),
    }
}

/// Start a production deployment: memory, optional signal logger, the
/// requested transport, the production cycle, and a runner backed by the
/// reference [`LoggingBackend`]. Blocks until SIGTERM/SIGINT, then stops
/// every component in the reverse of start order.
fn run_serve(locations: u32, transport: TransportKind, endpoint: String, log_signals: bool) -> Result<()> {
    if locations < 1 {
        bail!("--locations must be >= 1");
    }

    let memory = Memory::new();
    if log_signals {
        memory.add_observer(Arc::new(MemoryLogger::new("serve")));
    }

    let cycle = ProductionCycleDriver::new(memory.clone());
    cycle.start();

    let transport_server = match transport {
        TransportKind::Zmq => {
            let server = ZmqServer::new(memory.clone(), endpoint.clone());
            server.start();
            Some(Transport::Zmq(server))
        }
        TransportKind::Udp => {
            let addr: std::net::SocketAddr = endpoint.parse().with_context(|| format!("invalid UDP bind address {endpoint:?}"))?;
            let server = UdpServer::new(memory.clone(), addr);
            server.start();
            Some(Transport::Udp(server))
        }
        TransportKind::None => None,
    };
    tracing::info!(?transport, %endpoint, "transport bound");

    let backend = Arc::new(LoggingBackend);
    let runner = ProductionRunner::new(memory.clone(), locations, backend);
    runner.start(Duration::from_secs(10)).context("starting production runner")?;

    tracing::info!(locations, "cell running, waiting for shutdown signal");
    wait_for_shutdown_signal()?;
    tracing::info!("shutdown signal received, stopping components");

    // Reverse of start order.
    runner.stop().context("stopping production runner")?;
    if let Some(server) = transport_server {
        server.stop();
    }
    cycle.stop();
    Ok(())
}

/// Start the cell plus the planner simulator, entirely in-process, queue
/// one sample order to prove the pipeline end to end, then block until
/// shutdown.
fn run_demo(locations: u32, log_signals: bool) -> Result<()> {
    if locations < 1 {
        bail!("--locations must be >= 1");
    }

    let memory = Memory::new();
    if log_signals {
        memory.add_observer(Arc::new(MemoryLogger::new("demo")));
    }

    let cycle = ProductionCycleDriver::new(memory.clone());
    cycle.start();

    let backend = Arc::new(LoggingBackend);
    let runner = ProductionRunner::new(memory.clone(), locations, backend);
    runner.start(Duration::from_secs(10)).context("starting production runner")?;

    let simulator = PlannerSimulator::new(memory.clone());
    simulator.start();

    let mut params = cellplc_types::Batch::new();
    params.insert("queueOrderUniqueId".to_string(), "demo-1".into());
    params.insert("queueOrderPartType".to_string(), "cola".into());
    params.insert("queueOrderNumber".to_string(), 1i64.into());
    params.insert("queueOrderPickLocation".to_string(), 1i64.into());
    params.insert("queueOrderPickContainerId".to_string(), "0001".into());
    params.insert("queueOrderPickContainerType".to_string(), "tray".into());
    params.insert("queueOrderPlaceLocation".to_string(), i64::from(locations).into());
    params.insert("queueOrderPlaceContainerId".to_string(), "pallet1".into());
    params.insert("queueOrderPlaceContainerType".to_string(), "pallet".into());
    runner.queue_order(params, Duration::from_secs(5)).context("queueing demo order")?;
    tracing::info!("demo order queued, watch it flow through the cell");

    wait_for_shutdown_signal()?;
    tracing::info!("shutdown signal received, stopping components");

    simulator.stop();
    runner.stop().context("stopping production runner")?;
    cycle.stop();
    Ok(())
}

enum Transport {
    Zmq(ZmqServer),
    Udp(UdpServer),
}

impl Transport {
    fn stop(&self) {
        match self {
            Transport::Zmq(server) => server.stop(),
            Transport::Udp(server) => server.stop(),
        }
    }
}

/// Block until SIGTERM or SIGINT arrives. Unix-only per §5's thread model;
/// the flag is polled rather than awaited so `Ctrl-C` during a blocking
/// `recv` elsewhere in the process still lets this thread notice promptly.
fn wait_for_shutdown_signal() -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())?;
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}
