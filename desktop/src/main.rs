//! Droid Mirror console front-end
//!
//! Lists attached devices, or mirrors one of them: the video stream is
//! decoded with OpenH264, stream statistics are logged once per second
//! and console lines are turned into control commands.

mod decoder;
mod input;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use droid_shared::devices::{plan_sessions, DeviceNames};
use droid_shared::logging::{init_console_logging, init_logging};
use droid_shared::{
    AdbBridge, Config, DeviceBridge, DeviceHandle, Session, SessionEvent, SessionOptions,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::decoder::H264Sink;
use crate::input::{Command, USAGE};

/// Droid Mirror
///
/// Mirrors an attached device's screen and forwards console commands to it.
#[derive(Parser, Debug)]
#[command(name = "droid_mirror")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List attached devices with their mapped names
    Devices,

    /// Mirror one device
    Mirror {
        /// Device serial; defaults to the first mapped, then first attached device
        #[arg(short, long)]
        serial: Option<String>,

        /// Local port the device dials back to
        #[arg(short, long)]
        port: Option<u16>,

        /// Video bitrate in bits per second
        #[arg(short, long)]
        bitrate: Option<u64>,

        /// Time allowed for the device to connect, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    let bridge = Arc::new(AdbBridge::new(&config.adb_path));

    match args.command {
        Commands::Devices => {
            init_console_logging(&config.log_level);
            list_devices(&bridge, &config)
        }
        Commands::Mirror {
            serial,
            port,
            bitrate,
            timeout_ms,
        } => {
            init_logging(&config.log_dir, "droid_mirror", &config.log_level)?;
            if let Some(bitrate) = bitrate {
                config.bitrate = bitrate;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.connect_timeout_ms = timeout_ms;
            }
            mirror(bridge, &config, serial.as_deref(), port)
        }
    }
}

fn list_devices(bridge: &AdbBridge, config: &Config) -> anyhow::Result<()> {
    bridge.start_server()?;
    let attached = bridge.list_devices()?;
    let names = DeviceNames::load(&config.device_names_file)?;
    let planned = plan_sessions(&attached, &names, config.base_port);

    if attached.is_empty() {
        println!("No devices attached");
        return Ok(());
    }

    for device in &attached {
        let name = names.name_for(&device.serial).unwrap_or("-");
        let port = planned
            .iter()
            .find(|(d, _)| d.serial == device.serial)
            .map(|(_, port)| port.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<14} {:<20} {:<20} {}",
            device.serial,
            device.state,
            device.model.as_deref().unwrap_or("-"),
            name,
            port
        );
    }

    Ok(())
}

/// Pick the device to mirror and its local port
///
/// An explicit serial wins. Otherwise the first mapped, attached device is
/// used, then the first online device.
fn choose_device(
    attached: &[DeviceHandle],
    names: &DeviceNames,
    base_port: u16,
    serial: Option<&str>,
) -> Option<(DeviceHandle, u16)> {
    let planned = plan_sessions(attached, names, base_port);

    match serial {
        Some(serial) => planned
            .into_iter()
            .find(|(d, _)| d.serial == serial)
            .or_else(|| {
                attached
                    .iter()
                    .find(|d| d.serial == serial)
                    .map(|d| (d.clone(), base_port))
            }),
        None => planned
            .into_iter()
            .find(|(d, _)| d.is_online())
            .or_else(|| {
                attached
                    .iter()
                    .find(|d| d.is_online())
                    .map(|d| (d.clone(), base_port))
            }),
    }
}

fn mirror(
    bridge: Arc<AdbBridge>,
    config: &Config,
    serial: Option<&str>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    bridge.start_server()?;
    let attached = bridge.list_devices()?;
    let names = DeviceNames::load(&config.device_names_file)?;

    let Some((device, planned_port)) = choose_device(&attached, &names, config.base_port, serial)
    else {
        anyhow::bail!("No suitable device attached");
    };
    if !device.is_online() {
        anyhow::bail!("Device {} is {}", device.serial, device.state);
    }
    let port = port.unwrap_or(planned_port);

    info!("Droid Mirror v{}", env!("CARGO_PKG_VERSION"));
    info!("Device: {} ({})", device.serial, device.display_name());
    info!("Local port: {}", port);

    let sink = H264Sink::spawn(&device.serial)?;
    let session = Session::connect(
        device,
        port,
        bridge,
        SessionOptions::from_config(config),
        sink,
        config.connect_timeout(),
    )?;
    info!("Mirroring {}; commands: {}", session.device_name(), USAGE);

    let console = spawn_line_reader(io::BufReader::new(io::stdin()))?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_console(&session, console));

    if let Err(e) = session.stop() {
        warn!("Stop failed: {}", e);
    }
    info!("Shutting down...");
    Ok(())
}

/// Read lines on a dedicated thread
///
/// A blocked read on that thread never holds up runtime shutdown; the
/// thread is left behind when the process exits.
fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::UnboundedReceiver<io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Drive the console until quit, Ctrl-C or a worker failure
async fn run_console(session: &Session, mut lines: mpsc::UnboundedReceiver<io::Result<String>>) {
    let mut events = session.subscribe();
    let mut stdin_open = true;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received");
                break;
            }

            _ = ticker.tick() => log_stats(session),

            line = lines.recv(), if stdin_open => match line.transpose() {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if handle_line(session, &line) {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Console closed; Ctrl-C to stop");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    stdin_open = false;
                }
            },

            event = events.recv() => match event {
                Ok(SessionEvent::WorkerFailed { worker, error }) => {
                    error!("{:?} worker failed: {}", worker, error);
                    break;
                }
                Ok(event) => info!("Session event: {:?}", event),
                Err(RecvError::Lagged(n)) => warn!("Missed {} session events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Run one console line; returns `true` on quit
fn handle_line(session: &Session, line: &str) -> bool {
    let command: Command = match line.parse() {
        Ok(command) => command,
        Err(e) => {
            warn!("{}", e);
            return false;
        }
    };

    if command == Command::Quit {
        return true;
    }

    match command.messages(session.geometry()) {
        Ok(messages) => {
            for msg in messages {
                if !session.send_command(msg) {
                    break;
                }
            }
        }
        Err(e) => warn!("{}", e),
    }
    false
}

fn log_stats(session: &Session) {
    let stats = session.stats().snapshot();
    let size = session
        .geometry()
        .map(|s| format!("{}x{}", s.width, s.height))
        .unwrap_or_else(|| "?x?".to_string());

    info!(
        "Stats: {} {:.1} packets/s, {:.1} Mbps, total {} ({} dropped)",
        size, stats.packets_per_sec, stats.bitrate_mbps, stats.total_packets, stats.dropped_packets
    );
}
