use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::time::Duration;

use crate::transport::Transport;

/// In-memory link used in place of a serial port.
///
/// Bytes written by the device handle come out of `read`; bytes the client writes are
/// collected by the device handle. Dropping the handle ends the link.
pub struct MockTransport {
    from_device: Receiver<Vec<u8>>,
    to_device: Sender<Vec<u8>>,
    /// Bytes received from the device but not yet read.
    pending: Vec<u8>,
    timeout: Duration,
    disconnected: bool,
}

/// The payload's side of a `MockTransport`.
pub struct MockDeviceHandle {
    to_client: Sender<Vec<u8>>,
    from_client: Receiver<Vec<u8>>,
}

impl MockTransport {
    /// Creates a connected transport and device handle.
    pub fn pair(timeout: Duration) -> (Self, MockDeviceHandle) {
        let (to_client, from_device) = channel();
        let (to_device, from_client) = channel();
        let transport = Self {
            from_device,
            to_device,
            pending: Vec::new(),
            timeout,
            disconnected: false,
        };
        (transport, MockDeviceHandle { to_client, from_client })
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() && !self.disconnected {
            match self.from_device.recv_timeout(self.timeout) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timed out"));
                }
                Err(RecvTimeoutError::Disconnected) => self.disconnected = true,
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.to_device
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mock device dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn ends_on_empty_read(&self) -> bool {
        true
    }
}

impl MockDeviceHandle {
    /// Sends raw bytes to the client, exactly as given.
    pub fn inject(&self, bytes: impl Into<Vec<u8>>) {
        // The client may already be gone; that is fine for a test device.
        let _ = self.to_client.send(bytes.into());
    }

    /// Sends one `\n` terminated line to the client.
    pub fn send_line(&self, line: &str) {
        self.inject(format!("{line}\n"));
    }

    /// Returns everything the client has written so far.
    pub fn take_written(&self) -> Vec<u8> {
        let mut written = Vec::new();
        loop {
            match self.from_client.try_recv() {
                Ok(bytes) => written.extend(bytes),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return written,
            }
        }
    }

    /// Waits up to `timeout` for the client to write something.
    pub fn wait_written(&self, timeout: Duration) -> Option<Vec<u8>> {
        let mut written = self.from_client.recv_timeout(timeout).ok()?;
        written.extend(self.take_written());
        Some(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_flow_both_ways() {
        let (mut transport, device) = MockTransport::pair(Duration::from_millis(10));
        device.send_line("ACK|ready");

        let mut buf = [0u8; 4];
        assert_eq!(transport.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"ACK|");
        let mut rest = [0u8; 16];
        assert_eq!(transport.read(&mut rest).unwrap(), 6);
        assert_eq!(&rest[..6], b"ready\n");

        transport.write_all(b"CMD|STOP\r\n").unwrap();
        assert_eq!(device.take_written(), b"CMD|STOP\r\n");
    }

    #[test]
    fn test_idle_read_times_out_and_drop_ends_link() {
        let (mut transport, device) = MockTransport::pair(Duration::from_millis(5));
        let mut buf = [0u8; 8];
        let err = transport.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        drop(device);
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert!(transport.ends_on_empty_read());
    }
}
