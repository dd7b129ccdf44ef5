//! WHB04B-6 Pendant Daemon
//!
//! Bridges an XHC WHB04B-6 wireless jog pendant to a GRBL controller:
//! pendant reports come in over hidraw, commands go out over a serial
//! port, and controller status flows back to the pendant's display.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration, MissedTickBehavior};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use whb04b6d::{
    command::{CommandReceiver, CommandSink},
    config::Config,
    devices::{DeviceTable, EngineEvent},
    hidraw::{self, HidrawError, PendantHandler},
    serial::{self, ControllerLink},
};

/// Device polling interval when the receiver is not found (2 seconds)
const DEVICE_POLL_INTERVAL_SECS: u64 = 2;

/// How long the serial link gets to flush after shutdown
const SHUTDOWN_FLUSH_MS: u64 = 500;

/// WHB04B-6 Pendant Daemon - wireless jog pendant bridge for GRBL
#[derive(Parser, Debug)]
#[command(name = "whb04b6d")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/whb04b6d/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Controller serial port, overrides the configuration
    #[arg(short, long)]
    serial: Option<String>,

    /// List all WHB04B-6 receivers and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("WHB04B-6 Pendant Daemon starting...");

    // Handle --list-devices flag
    if args.list_devices {
        list_pendant_devices();
        return Ok(());
    }

    let config = Arc::new(load_config(args.config.as_deref()));

    let (event_tx, event_rx) = mpsc::unbounded_channel::<EngineEvent>();
    let (commands, command_rx) = CommandSink::channel();

    // Controller link; without a port, commands are only logged
    let serial_port = args.serial.clone().or_else(|| config.serial.port.clone());
    let serial_handle = match serial_port {
        Some(port) => {
            let link_config = config.clone();
            let status_tx = event_tx.clone();
            tokio::task::spawn_blocking(move || {
                run_serial_link(&port, &link_config, command_rx, status_tx)
            })
        }
        None => {
            warn!("No controller serial port configured, commands will only be logged");
            tokio::spawn(drain_commands(command_rx))
        }
    };

    // Pendant receiver
    let hidraw_tx = event_tx.clone();
    let hidraw_handle = tokio::spawn(async move { run_hidraw_loop(hidraw_tx).await });
    drop(event_tx);

    // Engine owns every pendant session
    let table = DeviceTable::new(config.clone(), commands);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mut engine_handle = tokio::spawn(run_engine(
        table,
        event_rx,
        shutdown_rx,
        Duration::from_millis(config.jog.command_interval_ms),
        Duration::from_millis(config.display.refresh_interval_ms),
    ));

    info!("WHB04B-6 Pendant Daemon ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting...");
            let _ = shutdown_tx.send(());
            if let Err(e) = (&mut engine_handle).await {
                error!("Engine task panicked: {:?}", e);
            }
        }
        result = &mut engine_handle => {
            if let Err(e) = result {
                error!("Engine task panicked: {:?}", e);
            }
        }
    }

    hidraw_handle.abort();

    // Sessions are gone now; give the link a moment to send their last commands
    if tokio::time::timeout(Duration::from_millis(SHUTDOWN_FLUSH_MS), serial_handle)
        .await
        .is_err()
    {
        warn!("Serial link did not finish in time");
    }

    Ok(())
}

/// Load the configuration file, writing defaults on first run
fn load_config(path: Option<&std::path::Path>) -> Config {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => Config::default_config_path(),
    };

    let result = match &path {
        Some(path) => Config::create_default_if_missing(path),
        None => Ok(Config::default()),
    };

    match result {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    }
}

/// List all detected pendant receivers
fn list_pendant_devices() {
    println!("Scanning for WHB04B-6 receivers...\n");

    let devices = match hidraw::list_devices() {
        Ok(devices) => devices,
        Err(e) => {
            println!("Scan failed: {}", e);
            return;
        }
    };

    if devices.is_empty() {
        println!("No WHB04B-6 receivers found.");
        println!("\nTroubleshooting:");
        println!("  - Ensure the USB receiver is plugged in and the pendant is on");
        println!("  - Check that udev rules grant access to /dev/hidraw*");
        return;
    }

    println!("Found {} receiver(s):\n", devices.len());

    for (i, device) in devices.iter().enumerate() {
        println!("{}. {}", i + 1, device.name);
        println!("   Path:    {:?}", device.path);
        println!();
    }
}

/// Engine loop: events, jog ticks and display ticks on one task
async fn run_engine(
    mut table: DeviceTable,
    mut event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    command_interval: Duration,
    display_interval: Duration,
) {
    let mut command_tick = tokio::time::interval(command_interval);
    command_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut display_tick = tokio::time::interval(display_interval);
    display_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => table.dispatch(event),
                None => break,
            },
            _ = command_tick.tick() => table.on_command_tick(),
            _ = display_tick.tick() => table.on_display_tick(),
            _ = &mut shutdown_rx => break,
        }
    }

    // Dropping sessions stops any continuous jog
    table.clear();
    info!("Engine stopped");
}

/// Run the hidraw detection and report loop
///
/// This function handles:
/// - Initial receiver detection
/// - Polling for the receiver when not found (2-second intervals)
/// - Reconnection after the receiver disappears
async fn run_hidraw_loop(event_tx: mpsc::UnboundedSender<EngineEvent>) {
    loop {
        match hidraw::find_device() {
            Ok(info) => match PendantHandler::open(&info.path, event_tx.clone()) {
                Ok(mut handler) => {
                    let device = handler.device().clone();
                    let sink = match handler.feature_sink() {
                        Ok(sink) => sink,
                        Err(e) => {
                            error!("Failed to set up display output: {}", e);
                            sleep(Duration::from_secs(DEVICE_POLL_INTERVAL_SECS)).await;
                            continue;
                        }
                    };

                    info!(device = %device, name = %info.name, "Detected WHB04B-6 receiver");
                    let mounted = EngineEvent::Mounted {
                        device: device.clone(),
                        sink: Box::new(sink),
                    };
                    if event_tx.send(mounted).is_err() {
                        return;
                    }

                    match handler.start().await {
                        Ok(()) => {
                            info!("Engine stopped, ending hidraw loop");
                            return;
                        }
                        Err(e) => {
                            warn!("Receiver disconnected ({}), will poll for reconnection...", e);
                        }
                    }

                    if event_tx.send(EngineEvent::Unmounted { device }).is_err() {
                        return;
                    }
                }
                Err(HidrawError::PermissionDenied) => {
                    error!("Permission denied for hidraw device. Ensure udev rules are installed.");
                }
                Err(e) => {
                    error!("Failed to open receiver: {}", e);
                }
            },
            Err(HidrawError::DeviceNotFound) => {
                // Receiver not plugged in, this is expected during polling
                info!(
                    "Waiting for WHB04B-6 receiver... (polling every {}s)",
                    DEVICE_POLL_INTERVAL_SECS
                );
            }
            Err(e) => {
                error!("Error during hidraw scan: {}", e);
            }
        }

        // Wait before polling again
        sleep(Duration::from_secs(DEVICE_POLL_INTERVAL_SECS)).await;
    }
}

/// Run the blocking serial link until the engine or the port goes away
fn run_serial_link(
    port: &str,
    config: &Config,
    mut commands: CommandReceiver,
    status_tx: mpsc::UnboundedSender<EngineEvent>,
) {
    let port = match serial::open_port(port, config.serial.baud_rate) {
        Ok(port) => port,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    let mut link = ControllerLink::new(port, config.display.show_work_coordinates);
    let poll_interval = Duration::from_millis(config.serial.status_poll_ms);

    if let Err(e) = serial::run_link(&mut link, &mut commands, &status_tx, poll_interval) {
        error!("Controller link failed: {}", e);
    }
}

/// Consume commands when no controller is attached
async fn drain_commands(mut commands: CommandReceiver) {
    while let Some(command) = commands.recv().await {
        tracing::debug!(command = %command, "No controller connected, command dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whb04b6d::command::Command;

    #[test]
    fn test_device_poll_interval() {
        assert_eq!(DEVICE_POLL_INTERVAL_SECS, 2);
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["whb04b6d"]);
        assert_eq!(args.config, None);
        assert_eq!(args.serial, None);
        assert!(!args.verbose);
        assert!(!args.list_devices);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "whb04b6d",
            "--verbose",
            "--config",
            "/tmp/pendant.json",
            "--serial",
            "/dev/ttyUSB0",
        ]);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/pendant.json")));
        assert_eq!(args.serial.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_args_list_devices() {
        let args = Args::parse_from(["whb04b6d", "--list-devices"]);
        assert!(args.list_devices);
    }

    #[test]
    fn test_load_config_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = load_config(Some(path.as_path()));
        assert!(path.exists());
        assert_eq!(config.jog.command_interval_ms, 100);
    }

    fn engine_parts() -> (DeviceTable, CommandReceiver) {
        let (commands, command_rx) = CommandSink::channel();
        (DeviceTable::new(Arc::new(Config::default()), commands), command_rx)
    }

    #[tokio::test]
    async fn test_engine_stops_on_shutdown() {
        let (table, mut command_rx) = engine_parts();
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let engine = tokio::spawn(run_engine(
            table,
            event_rx,
            shutdown_rx,
            Duration::from_millis(10),
            Duration::from_millis(10),
        ));
        shutdown_tx.send(()).unwrap();
        engine.await.unwrap();

        // table dropped, so the command channel is closed
        assert_eq!(command_rx.recv().await, None::<Command>);
    }

    #[tokio::test]
    async fn test_engine_stops_when_event_sources_close() {
        let (table, _command_rx) = engine_parts();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        drop(event_tx);
        run_engine(
            table,
            event_rx,
            shutdown_rx,
            Duration::from_millis(10),
            Duration::from_millis(10),
        )
        .await;
    }
}
