//! Recording a live link to disk and playing a recording back through the client.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::transport::Transport;

/// Fastest replay pace.
pub const MIN_REPLAY_INTERVAL: Duration = Duration::from_millis(200);
/// Slowest replay pace.
pub const MAX_REPLAY_INTERVAL: Duration = Duration::from_millis(999);

/// Plays back a captured byte stream as if it were arriving from the payload.
///
/// Each `read` hands out at most `chunk_size` bytes. When paced, reads are spaced `interval`
/// apart. Commands written to a replay are dropped.
pub struct ReplayTransport<R> {
    source: R,
    chunk_size: usize,
    interval: Duration,
    paced: bool,
    last_read: Option<Instant>,
    bytes_replayed: u64,
}

impl ReplayTransport<BufReader<File>> {
    /// Opens a capture file for replay.
    pub fn open(path: &Path, chunk_size: usize, interval: Duration, paced: bool) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open capture {}", path.display()))?;
        info!(path = %path.display(), "replaying capture");
        Ok(Self::new(BufReader::new(file), chunk_size, interval, paced))
    }
}

impl<R: Read> ReplayTransport<R> {
    /// Wraps any reader. `interval` is clamped to 200-999 ms and `chunk_size` to at least 1.
    pub fn new(source: R, chunk_size: usize, interval: Duration, paced: bool) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            interval: clamp_interval(interval),
            paced,
            last_read: None,
            bytes_replayed: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn bytes_replayed(&self) -> u64 {
        self.bytes_replayed
    }
}

/// Clamps a replay interval into the supported range.
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_REPLAY_INTERVAL, MAX_REPLAY_INTERVAL)
}

impl<R: Read> Read for ReplayTransport<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.paced
            && let Some(last) = self.last_read
        {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.last_read = Some(Instant::now());

        let limit = self.chunk_size.min(buf.len());
        let n = self.source.read(&mut buf[..limit])?;
        self.bytes_replayed += n as u64;
        Ok(n)
    }
}

impl<R> Write for ReplayTransport<R> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        debug!(bytes = buf.len(), "replay dropped outbound bytes");
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R: Read + Send> Transport for ReplayTransport<R> {
    fn ends_on_empty_read(&self) -> bool {
        true
    }
}

/// Wraps a transport and appends every byte read from it to a capture sink.
///
/// The capture can later be played back with `ReplayTransport`.
pub struct Recording<T, W> {
    inner: T,
    capture: W,
}

impl<T: Transport> Recording<T, File> {
    /// Records `inner` into a newly created file at `path`.
    pub fn to_file(inner: T, path: &Path) -> Result<Self> {
        let capture = File::create(path)
            .with_context(|| format!("failed to create capture {}", path.display()))?;
        info!(path = %path.display(), "recording link");
        Ok(Self::new(inner, capture))
    }
}

impl<T, W> Recording<T, W> {
    pub fn new(inner: T, capture: W) -> Self {
        Self { inner, capture }
    }

    pub fn into_parts(self) -> (T, W) {
        (self.inner, self.capture)
    }
}

impl<T: Read, W: Write> Read for Recording<T, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.capture.write_all(&buf[..n])?;
        Ok(n)
    }
}

impl<T: Write, W> Write for Recording<T, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<T: Transport, W: Write + Send> Transport for Recording<T, W> {
    fn ends_on_empty_read(&self) -> bool {
        self.inner.ends_on_empty_read()
    }
}
