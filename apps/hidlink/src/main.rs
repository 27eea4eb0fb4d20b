use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hidlink_core::{
    Connector, ConnectorConfig, ConnectorEvent, ConnectorObserver, FilterCriterion, NusbTransport,
    SendableMessage, TracingObserver, int_to_big_endian, int_to_little_endian,
};
use tracing::{error, info, warn};

/// How often `monitor` checks whether the read loop has died.
const MONITOR_TICK: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(author, version, about = "USB HID connector tool", long_about = None)]
struct Args {
    /// Vendor id to match, in hex (e.g. 16C0)
    #[arg(long, global = true, value_parser = parse_usb_id)]
    vid: Option<u16>,

    /// Product id to match, in hex; any product when omitted
    #[arg(long, global = true, value_parser = parse_usb_id)]
    pid: Option<u16>,

    /// Interface token matched against device ids (e.g. mi_00)
    #[arg(long, global = true)]
    interface: Option<String>,

    /// Path to a TOML connector configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List matching devices
    List,
    /// Connect and print every received payload as hex
    Monitor,
    /// Connect and write one payload
    ///
    /// The payload is the --hex bytes, then each --be-int, then each --le-int.
    Send {
        /// Raw bytes in hex (e.g. "01 02 ff")
        #[arg(long)]
        hex: Option<String>,

        /// 32-bit integer appended big-endian
        #[arg(long = "be-int", allow_negative_numbers = true)]
        be_int: Vec<i32>,

        /// 32-bit integer appended little-endian
        #[arg(long = "le-int", allow_negative_numbers = true)]
        le_int: Vec<i32>,
    },
}

fn parse_usb_id(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid USB id '{s}': {e}"))
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let digits: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    if !digits.is_ascii() {
        bail!("hex payload contains non-hex characters");
    }
    if digits.len() % 2 != 0 {
        bail!("hex payload has an odd number of digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prints received payloads to stdout and logs everything else.
///
/// Device arrivals are forwarded so the monitor can reconnect.
struct MonitorObserver {
    arrivals: Sender<String>,
}

impl ConnectorObserver for MonitorObserver {
    fn on_event(&self, event: &ConnectorEvent) {
        match event {
            ConnectorEvent::MessageReceived(message) => println!("{}", to_hex(message.payload())),
            ConnectorEvent::DeviceConnected { descriptor } => {
                TracingObserver.on_event(event);
                let _ = self.arrivals.send(descriptor.device_id.clone());
            }
            other => TracingObserver.on_event(other),
        }
    }
}

/// Pick up a device that arrived while nothing was selected.
fn reconnect(connector: &Connector, device_id: &str) {
    match connector.connect() {
        Ok(Some(selected)) => info!(device_id = %selected, "Reconnected"),
        Ok(None) => {}
        Err(e) => warn!(device_id = %device_id, error = %e, "Reconnect failed"),
    }
}

fn load_config(args: &Args) -> Result<ConnectorConfig> {
    let mut config = match &args.config {
        Some(path) => ConnectorConfig::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ConnectorConfig::default(),
    };

    match (args.vid, args.pid) {
        (Some(vid), pid) => config.filters.push(FilterCriterion::new(vid, pid)),
        (None, Some(_)) => bail!("--pid requires --vid"),
        (None, None) => {}
    }
    if let Some(interface) = &args.interface {
        config.interface = interface.clone();
    }
    if config.filters.is_empty() {
        bail!("no device filter: pass --vid or a config with [[filters]]");
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let transport = Arc::new(NusbTransport);

    match args.command {
        Command::List => {
            let connector: Connector = Connector::new(transport, config);
            connector.refresh_and_select()?;
            let devices = connector.connected_devices();
            if devices.is_empty() {
                info!("No matching devices");
            }
            for device in devices {
                println!("{device}");
            }
        }
        Command::Monitor => {
            let (arrivals, arrived) = mpsc::channel();
            let observer = Arc::new(MonitorObserver { arrivals });
            let connector: Connector = Connector::with_observer(transport, observer, config);
            match connector.connect()? {
                Some(device_id) => info!(device_id = %device_id, "Monitoring"),
                None => info!("No matching device yet, waiting"),
            }

            let handle = connector.start()?;
            while !handle.is_finished() {
                match arrived.recv_timeout(MONITOR_TICK) {
                    Ok(device_id) if connector.selected_device_id().is_none() => {
                        reconnect(&connector, &device_id);
                    }
                    Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            handle.join()?;
        }
        Command::Send { hex, be_int, le_int } => {
            let mut payload = match hex {
                Some(hex) => parse_hex(&hex)?,
                None => Vec::new(),
            };
            for value in be_int {
                payload.extend_from_slice(&int_to_big_endian(value));
            }
            for value in le_int {
                payload.extend_from_slice(&int_to_little_endian(value));
            }

            let connector: Connector = Connector::new(transport, config);
            let Some(device_id) = connector.connect()? else {
                bail!("no matching device");
            };
            let message = SendableMessage::new(payload)?;
            let written = connector.send_message(&message)?;
            info!(
                device_id = %device_id,
                bytes_written = written,
                "Sent {}",
                to_hex(message.payload())
            );
            connector.close();
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
