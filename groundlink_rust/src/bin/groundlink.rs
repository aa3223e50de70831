//! Ground-station command line: listen to the payload, replay captures, list ports.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use groundlink_core::pipeline::LinkEvent;
use groundlink_rust::GroundClient;
use groundlink_rust::config::{BackendConfig, ClientConfig};
use groundlink_rust::image_store::ImageStore;
use groundlink_rust::replay::{Recording, ReplayTransport};
use groundlink_rust::reporter::{ReportEndpoint, TelemetryReporter};
use groundlink_rust::transport::{Transport, available_port_names, open_serial};
use tracing::{error, info, warn};

/// Ground-station client for the payload radio link
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,

    /// Decode the live link; lines typed on stdin are sent as commands
    Listen {
        /// Serial port (default: from config, else the first port found)
        #[arg(short = 'p', long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short = 'b', long)]
        baud: Option<u32>,

        #[command(flatten)]
        sinks: SinkArgs,

        /// Record every received byte to this file for later replay
        #[arg(long)]
        capture: Option<PathBuf>,
    },

    /// Feed a recorded capture through the decoder
    Replay {
        /// Capture file
        input: PathBuf,

        /// Delay between chunks in milliseconds (200-999)
        #[arg(short = 'i', long)]
        interval_ms: Option<u64>,

        /// Bytes per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Replay as fast as possible
        #[arg(long)]
        no_pace: bool,

        /// Tag posted records with this replay id (default: the capture file name)
        #[arg(long)]
        replay_id: Option<String>,

        #[command(flatten)]
        sinks: SinkArgs,
    },
}

#[derive(clap::Args, Debug)]
struct SinkArgs {
    /// Post telemetry to this backend base URL
    #[arg(long)]
    backend: Option<String>,

    /// Save decoded images into this directory
    #[arg(long)]
    image_dir: Option<PathBuf>,
}

impl SinkArgs {
    fn apply(self, config: &mut ClientConfig) {
        if let Some(url) = self.backend {
            config.backend = Some(BackendConfig::new(url));
        }
        if let Some(dir) = self.image_dir {
            config.image_dir = Some(dir);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    groundlink_rust::logging::init(args.debug)?;

    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    match args.command {
        Command::Ports => {
            let ports = available_port_names()?;
            if ports.is_empty() {
                eprintln!("No serial ports detected");
            }
            for port in ports {
                println!("{port}");
            }
            Ok(())
        }
        Command::Listen {
            port,
            baud,
            sinks,
            capture,
        } => {
            sinks.apply(&mut config);
            if let Some(port) = port {
                config.serial.port = Some(port);
            }
            if let Some(baud) = baud {
                config.serial.baud_rate = baud;
            }
            listen(&config, capture.as_deref())
        }
        Command::Replay {
            input,
            interval_ms,
            chunk_size,
            no_pace,
            replay_id,
            sinks,
        } => {
            sinks.apply(&mut config);
            if let Some(interval_ms) = interval_ms {
                config.replay.interval_ms = interval_ms;
            }
            if let Some(chunk_size) = chunk_size {
                config.replay.chunk_size = chunk_size;
            }
            if no_pace {
                config.replay.paced = false;
            }
            replay(&config, &input, replay_id)
        }
    }
}

fn listen(config: &ClientConfig, capture: Option<&Path>) -> Result<()> {
    let port_name = match &config.serial.port {
        Some(port) => port.clone(),
        None => available_port_names()?
            .into_iter()
            .next()
            .context("No serial ports detected")?,
    };

    let port = open_serial(
        &port_name,
        config.serial.baud_rate,
        config.serial.read_timeout(),
    )?;
    let transport: Box<dyn Transport> = match capture {
        Some(path) => Box::new(Recording::to_file(port, path)?),
        None => Box::new(port),
    };

    let mut client = build_client(config, transport, ReportEndpoint::live())?;
    client.start();
    println!("Listening on {port_name}. Type a command and press enter to send it.");

    run(&mut client, config, Some(spawn_stdin_reader()))
}

fn replay(config: &ClientConfig, input: &Path, replay_id: Option<String>) -> Result<()> {
    let transport = ReplayTransport::open(
        input,
        config.replay.chunk_size,
        config.replay.interval(),
        config.replay.paced,
    )?;

    let replay_id = replay_id.unwrap_or_else(|| {
        input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "replay".to_string())
    });
    let mut client = build_client(config, Box::new(transport), ReportEndpoint::replay(replay_id))?;
    client.start();
    run(&mut client, config, None)
}

fn build_client(
    config: &ClientConfig,
    transport: Box<dyn Transport>,
    target: ReportEndpoint,
) -> Result<GroundClient> {
    let mut client =
        GroundClient::from_transport(transport).with_encoder(config.command.encoder());
    if let Some(backend) = &config.backend {
        let target = match &backend.path {
            Some(path) => target.with_path(path.clone()),
            None => target,
        };
        let reporter = TelemetryReporter::spawn_to(&backend.url, target, backend.timeout())?;
        client = client.with_reporter(reporter);
    }
    Ok(client)
}

/// Prints events until the link ends.
fn run(
    client: &mut GroundClient,
    config: &ClientConfig,
    commands: Option<Receiver<String>>,
) -> Result<()> {
    let images = config.image_dir.as_ref().map(ImageStore::new).transpose()?;

    loop {
        if let Some(commands) = &commands {
            for text in commands.try_iter() {
                match client.send_command(&text) {
                    Ok(Some(command)) => println!("> {}", command.text),
                    Ok(None) => {}
                    Err(e) => eprintln!("Command not sent: {e:#}"),
                }
            }
        }

        match client.get_events(Some(Duration::from_millis(100))) {
            Ok(events) => {
                for event in events {
                    handle_event(event, images.as_ref());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !client.is_running() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for receipt in client.report_receipts() {
            if let Some(url) = receipt.url {
                println!("Backend artifact: {url}");
            }
        }

        if let Some(message) = client.check_error() {
            error!(%message, "link failed");
        }
    }

    client.stop();
    while let Some(message) = client.check_error() {
        error!(%message, "link failed");
    }
    if let Some(stats) = client.last_session_stats() {
        info!(?stats, "session summary");
    }
    Ok(())
}

fn handle_event(event: LinkEvent, images: Option<&ImageStore>) {
    match event {
        LinkEvent::Acknowledgement(text) => println!("ACK {text}"),
        LinkEvent::DeviceError(text) => println!("ERR {text}"),
        LinkEvent::ImageAnnounced(header) => {
            println!("Image announced: {} ({} bytes)", header.filename, header.declared_size)
        }
        LinkEvent::ImageStarted => println!("Image transfer started"),
        LinkEvent::ImageReceived(image) => {
            println!("Image #{} received ({} bytes)", image.sequence, image.len());
            if let Some(store) = images
                && let Err(e) = store.save(&image)
            {
                warn!(error = %format!("{e:#}"), "image not saved");
            }
        }
        LinkEvent::Telemetry(record) => match serde_json::to_string(&record) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "telemetry not printable"),
        },
        LinkEvent::StageActivated(stage) => println!("*** Stage reached: {stage:?} ***"),
        // Already logged by the pipeline
        LinkEvent::Diagnostic(_) => {}
    }
}

/// Forwards stdin lines to the main loop. The thread ends with stdin.
fn spawn_stdin_reader() -> Receiver<String> {
    let (sender, receiver) = channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}
