use anyhow::Result;
use groundlink_core::commands::{CommandEncoder, OutboundCommand};
use groundlink_core::error::CommandError;
use groundlink_core::pipeline::{LinkEvent, LinkPipeline, PipelineStats};
use groundlink_core::telemetry::TelemetryRecord;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub mod config;
pub mod image_store;
pub mod logging;
pub mod mock_transport;
pub mod replay;
pub mod reporter;
pub mod transport;

use reporter::{ReportReceipt, TelemetryReporter};
use transport::{Transport, is_timeout};

/// What the reader thread hands back when it exits.
type ReaderExit = (Box<dyn Transport>, PipelineStats);

/// Interface to the payload over a serial link (or any other `Transport`).
///
/// # Example:
///
/// ```no_run
/// use groundlink_rust::GroundClient;
/// use std::time::Duration;
///
/// fn main() -> anyhow::Result<()> {
///     let mut client = GroundClient::new("/dev/ttyUSB0", 9600, Duration::from_millis(100))?;
///     client.start();
///
///     loop {
///         for event in client.get_events(Some(Duration::from_millis(100)))? {
///             println!("{event:?}");
///         }
///     }
/// }
/// ```
pub struct GroundClient {
    event_receiver: Receiver<LinkEvent>,
    error_receiver: Receiver<String>,
    running: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<ReaderExit>>,
    event_sender: Sender<LinkEvent>,
    error_sender: Sender<String>,
    command_sender: Sender<OutboundCommand>,
    command_receiver: Option<Receiver<OutboundCommand>>,
    transport: Option<Box<dyn Transport>>,

    encoder: CommandEncoder,
    reporter: Option<TelemetryReporter>,
    last_session: Option<PipelineStats>,
}

impl GroundClient {
    /// Creates a new client connected to the specified serial port.
    ///
    /// # Arguments
    ///
    /// - `port_name` (`&str`) - The name of the serial port to connect to (e.g., "/dev/ttyUSB0").
    /// - `baud_rate` (`u32`) - The baud rate for the serial connection. The payload radio
    ///   uses 9600.
    /// - `timeout` (`Duration`) - Read timeout for the serial port.
    pub fn new(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = transport::open_serial(port_name, baud_rate, timeout)?;
        Ok(Self::from_transport(Box::new(port)))
    }

    /// Creates a mocked client with a paired mock transport and device handle.
    pub fn new_mock(timeout: Duration) -> (Self, mock_transport::MockDeviceHandle) {
        let (transport, device) = mock_transport::MockTransport::pair(timeout);
        (Self::from_transport(Box::new(transport)), device)
    }

    /// Creates a client over any transport.
    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        let (event_sender, event_receiver) = channel();
        let (error_sender, error_receiver) = channel();
        let (command_sender, command_receiver) = channel();

        Self {
            event_receiver,
            error_receiver,
            running: Arc::new(AtomicBool::new(false)),
            join_handle: None,
            event_sender,
            error_sender,
            command_sender,
            command_receiver: Some(command_receiver),
            transport: Some(transport),

            encoder: CommandEncoder::default(),
            reporter: None,
            last_session: None,
        }
    }

    /// Uses `encoder` for every later `send_command`.
    pub fn with_encoder(mut self, encoder: CommandEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Mirrors every decoded telemetry record to `reporter`. Takes effect on the next `start`.
    pub fn with_reporter(mut self, reporter: TelemetryReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Starts a new decoding session on a background thread.
    ///
    /// Each session gets a fresh pipeline, so mission stages and image state start over.
    pub fn start(&mut self) {
        // Return early if already running
        if self.join_handle.is_some() {
            return;
        }

        let mut transport = match self.transport.take() {
            Some(t) => t,
            None => return,
        };

        let command_receiver = match self.command_receiver.take() {
            Some(r) => r,
            None => return,
        };

        self.running.store(true, Ordering::Relaxed);
        let running = self.running.clone();
        let event_sender = self.event_sender.clone();
        let error_sender = self.error_sender.clone();
        let report_sender = self.reporter.as_ref().and_then(TelemetryReporter::sender);

        let handle = thread::spawn(move || {
            let mut pipeline = LinkPipeline::new();
            let mut buffer: [u8; 1024] = [0; 1024];
            info!("link session started");

            'session: while running.load(Ordering::Relaxed) {
                // Write pending commands before blocking on the next read.
                while let Ok(command) = command_receiver.try_recv() {
                    if let Err(e) = transport.write_all(&command.to_bytes()) {
                        error!(error = %e, "command write failed");
                        let _ = error_sender.send(e.to_string());
                        break 'session;
                    }
                    info!(command = %command.text, "command sent");
                }
                let _ = transport.flush();

                match transport.read(&mut buffer) {
                    Ok(bytes_read @ 1..) => {
                        pipeline.parse_bytes(&buffer[..bytes_read]);
                        if !forward_events(&mut pipeline, &event_sender, report_sender.as_ref()) {
                            break 'session; // Receiver dropped
                        }
                    }
                    Ok(0) if transport.ends_on_empty_read() => {
                        info!("link reached end of stream");
                        break 'session;
                    }
                    Ok(0) => {}
                    // Timeouts are expected while the payload is quiet
                    Err(e) if is_timeout(&e) => {}
                    Err(e) => {
                        error!(error = %e, "link read failed");
                        let _ = error_sender.send(e.to_string());
                        break 'session;
                    }
                }
            }

            // Flush the last partial line and drop any half-received image.
            pipeline.close();
            forward_events(&mut pipeline, &event_sender, report_sender.as_ref());
            running.store(false, Ordering::Relaxed);

            let stats = pipeline.stats();
            info!(?stats, "link session ended");
            (transport, stats)
        });

        self.join_handle = Some(handle);
    }

    /// Stops the background thread, ending the session.
    ///
    /// The transport is kept so the client can be started again.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok((transport, stats)) => {
                    self.transport = Some(transport);
                    self.last_session = Some(stats);
                }
                Err(_) => {
                    let _ = self.error_sender.send("Reader thread panicked".to_string());
                }
            }
        }

        // The receiver is moved into the background thread on start()
        // This remakes it so the client can be restarted.
        if self.command_receiver.is_none() {
            let (new_sender, new_receiver) = channel();
            self.command_sender = new_sender;
            self.command_receiver = Some(new_receiver);
        }
    }

    /// Retrieves all available events, optionally blocking until at least one is available.
    ///
    /// # Arguments
    ///
    /// - `timeout` (`Option<Duration>`) - If `Some(duration)`, blocks for up to `duration`
    ///   waiting for the first event.
    ///
    /// # Returns
    ///
    /// - `Result<Vec<LinkEvent>, RecvTimeoutError>` - `Err(Timeout)` if nothing arrived in time.
    pub fn get_events(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<LinkEvent>, RecvTimeoutError> {
        let mut events = Vec::new();

        // If blocking, wait for at most one event. The next loop will drain any others.
        if let Some(duration) = timeout {
            events.push(self.event_receiver.recv_timeout(duration)?);
        }

        // Drains the rest of the available events without blocking
        while let Ok(event) = self.event_receiver.try_recv() {
            events.push(event);
        }
        Ok(events)
    }

    /// Retrieves only the telemetry records among the available events.
    ///
    /// Other events that were waiting are discarded.
    pub fn get_telemetry(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<TelemetryRecord>, RecvTimeoutError> {
        Ok(self
            .get_events(timeout)?
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::Telemetry(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    /// Encodes `user_text` and queues it for the payload.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(command))` - The command was queued.
    /// - `Ok(None)` - The text was blank, nothing was sent.
    /// - `Err(...)` - The link is not running or the text cannot be framed.
    pub fn send_command(&self, user_text: &str) -> Result<Option<OutboundCommand>> {
        let command = match self.encoder.encode(user_text) {
            Ok(command) => command,
            Err(CommandError::Empty) => {
                debug!("blank command ignored");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if !self.is_running() {
            warn!(command = %command.text, "not connected, command not sent");
            anyhow::bail!("Link is not running, command not sent");
        }

        self.command_sender
            .send(command.clone())
            .map_err(|_| io::Error::other("Command channel closed"))?;
        Ok(Some(command))
    }

    /// Receipts the backend returned for reported telemetry.
    pub fn report_receipts(&self) -> Vec<ReportReceipt> {
        self.reporter
            .as_ref()
            .map(TelemetryReporter::receipts)
            .unwrap_or_default()
    }

    /// Checks for any errors that have occurred in the background thread.
    ///
    /// # Returns
    ///
    /// - `Option<String>` - `Some(error_message)` if an error has occurred, otherwise `None`.
    pub fn check_error(&self) -> Option<String> {
        self.error_receiver.try_recv().ok()
    }

    /// Returns true if the client is currently running and reading data.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Totals of the most recent session that was stopped.
    pub fn last_session_stats(&self) -> Option<PipelineStats> {
        self.last_session
    }
}

impl Drop for GroundClient {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sends queued pipeline events to the client and telemetry to the reporter.
///
/// Returns `false` once the client side has gone away.
fn forward_events(
    pipeline: &mut LinkPipeline,
    event_sender: &Sender<LinkEvent>,
    report_sender: Option<&Sender<TelemetryRecord>>,
) -> bool {
    for event in pipeline.drain_events() {
        if let (LinkEvent::Telemetry(record), Some(reporter)) = (&event, report_sender) {
            // A stopped reporter must not stall decoding.
            let _ = reporter.send(record.clone());
        }
        if event_sender.send(event).is_err() {
            return false;
        }
    }
    true
}
