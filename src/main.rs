mod bus;
mod config;
mod control;
mod coordinator;
mod error;
mod hardware;
mod session;
mod state;
mod tasks;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use bus::mqtt::{self, MqttBus};
use bus::{InboundMessage, LocalBus, MessageBus, Telemetry};
use config::{Backend, RigConfig};
use control::CalibrationTable;
use coordinator::{Coordinator, RigContext};
use hardware::{sim, ActuatorBank, AttitudeSource, LoadCellArray};

/// Capacity of the inbound command queue
const COMMAND_QUEUE: usize = 64;

/// Wait for blocking threads on exit; a device call stuck past its timeout
/// is abandoned after this
const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(1);

/// Thrust stand controller
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Rig configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker host, overrides the configuration
    #[arg(long)]
    broker_host: Option<String>,

    /// Broker port, overrides the configuration
    #[arg(long)]
    broker_port: Option<u16>,

    /// Calibration table (CSV), overrides the configuration
    #[arg(long)]
    table: Option<PathBuf>,

    /// Directory for saved sessions, overrides the configuration
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Run without a broker: commands from stdin, telemetry to the log
    #[arg(long)]
    offline: bool,
}

impl Args {
    fn apply(&self, config: &mut RigConfig) {
        if let Some(host) = &self.broker_host {
            config.broker.host = host.clone();
        }
        if let Some(port) = self.broker_port {
            config.broker.port = port;
        }
        if let Some(table) = &self.table {
            config.calibration_table = table.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
    }
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let result = runtime.block_on(run());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("thrust_stand=debug,info")),
        )
        .init();

    let args = Args::parse();
    let mut config = RigConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let table = CalibrationTable::load(&config.calibration_table)
        .context("Calibration table is required")?;

    let devices = match config.backend {
        Backend::Sim => sim::build(&config),
    };
    let attitude = AttitudeSource::new(devices.imu).context("IMU initialisation failed")?;
    let load_cells = LoadCellArray::new(devices.gauges, &config.load_cells);
    let mut actuators = ActuatorBank::new(devices.servos, &config.servos);
    actuators
        .center()
        .context("Failed to center actuators")?;
    info!("Actuators centered");

    let (tx, mut rx) = mpsc::channel(COMMAND_QUEUE);
    let bus: Arc<dyn MessageBus> = if args.offline {
        let bus = Arc::new(LocalBus::new());
        tokio::spawn(log_telemetry(bus.subscribe()));
        tokio::spawn(read_stdin_commands(tx));
        info!("Offline: reading commands from stdin as 'topic [payload]'");
        bus
    } else {
        let (bus, eventloop) = MqttBus::connect(&config.broker);
        tokio::spawn(mqtt::forward_commands(bus.clone(), eventloop, tx));
        Arc::new(bus)
    };

    let rig = RigContext::new(
        &config,
        table,
        attitude,
        load_cells,
        actuators,
        Telemetry::new(bus),
    );
    let mut coordinator = Coordinator::new(rig);

    tokio::select! {
        _ = coordinator.run(&mut rx) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Ctrl-C received");
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

/// Forward stdin lines (`topic [payload]`) as inbound messages
async fn read_stdin_commands(commands: mpsc::Sender<InboundMessage>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (topic, payload) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        if commands
            .send(InboundMessage::new(topic, payload.trim()))
            .await
            .is_err()
        {
            break;
        }
    }
    debug!("stdin closed");
}

async fn log_telemetry(mut published: broadcast::Receiver<bus::local::Published>) {
    loop {
        match published.recv().await {
            Ok(message) => debug!(
                "{} <- {}",
                message.topic,
                String::from_utf8_lossy(&message.payload)
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Telemetry log skipped {} messages", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
