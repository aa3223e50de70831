use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serialport::SerialPort;
use tracing::info;

/// A byte link the client can read telemetry from and write commands to.
///
/// Reads are expected to time out regularly (`ErrorKind::TimedOut` or `WouldBlock`) so the
/// reader thread can service outbound commands and notice shutdown requests.
pub trait Transport: Read + Write + Send {
    /// Whether `Ok(0)` from `read` means the link has ended for good.
    ///
    /// Serial ports can return empty reads while idle, so the default is `false`.
    fn ends_on_empty_read(&self) -> bool {
        false
    }
}

impl Transport for Box<dyn SerialPort> {}

/// Opens a serial port the way the payload radio expects.
///
/// # Arguments
///
/// - `port_name` (`&str`) - The name of the serial port (e.g., "/dev/ttyUSB0" or "COM3").
/// - `baud_rate` (`u32`) - Link speed. The payload XBee runs at 9600.
/// - `timeout` (`Duration`) - Read timeout; keep it short so commands are not delayed.
pub fn open_serial(
    port_name: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(port_name, baud_rate)
        .timeout(timeout)
        .open()
        .with_context(|| format!("failed to open serial port {port_name}"))?;

    // Sets DTR to true, this is important for Linux/Windows to both act the same
    port.write_data_terminal_ready(true)
        .context("failed to set DTR")?;
    // Give the device a moment to settle after opening the port
    thread::sleep(Duration::from_millis(50));

    info!(port = port_name, baud_rate, "serial port opened");
    Ok(port)
}

/// Names of the serial ports present on this machine.
pub fn available_port_names() -> Result<Vec<String>> {
    let ports = serialport::available_ports().context("failed to enumerate serial ports")?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

pub(crate) fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
