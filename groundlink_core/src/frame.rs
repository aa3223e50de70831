use serde::{Deserialize, Serialize};

use crate::constants::wire_constants::*;

/// Filename and size announced by an `IMG|<filename>|<size>` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    pub filename: String,
    /// Size as announced by the payload. The payload firmware announces the length of the
    /// base64 text, not of the decoded image.
    pub declared_size: usize,
}

/// The two accepted telemetry encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryFormat {
    /// Inline JSON object, `{...}`.
    Json,
    /// Legacy `S<f1>,...,<f12>` line.
    Positional,
}

/// A single classified protocol line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// `ACK|<text>`; holds the text after the prefix.
    Acknowledgement(String),
    /// `ERR|<text>`; holds the text after the prefix.
    Error(String),
    ImageHeader(ImageHeader),
    /// An `IMG|` line missing its filename or size. Holds the whole line.
    MalformedImageHeader(String),
    ImageStart,
    ImageEnd,
    /// A base64 line received while an image transfer is open.
    ImageData(String),
    /// A non-base64 line received while an image transfer is open.
    NoiseDuringImage(String),
    /// A line that looks like a telemetry record. Decoding may still fail.
    Telemetry(TelemetryFormat, String),
    Noise(String),
}

/// Classifies one complete line.
///
/// The checks run in a fixed order and the first match wins, since the patterns overlap
/// (an `ACK|` line received mid-image is still an acknowledgement, a base64 line outside a
/// transfer is noise, and so on).
///
/// # Arguments
///
/// - `line` (`&str`) - One line from the line assembler. Surrounding whitespace is ignored.
/// - `image_open` (`bool`) - Whether an image transfer is currently open.
///
/// # Returns
///
/// - `Option<Frame>` - `None` for empty or whitespace-only lines, otherwise the frame.
pub fn classify(line: &str, image_open: bool) -> Option<Frame> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(text) = line.strip_prefix(ACK_PREFIX) {
        return Some(Frame::Acknowledgement(text.to_owned()));
    }
    if let Some(text) = line.strip_prefix(ERR_PREFIX) {
        return Some(Frame::Error(text.to_owned()));
    }
    if let Some(fields) = line.strip_prefix(IMAGE_HEADER_PREFIX) {
        return Some(match parse_image_header(fields) {
            Some(header) => Frame::ImageHeader(header),
            None => Frame::MalformedImageHeader(line.to_owned()),
        });
    }
    if line == IMAGE_START_MARKER {
        return Some(Frame::ImageStart);
    }
    if line == IMAGE_END_MARKER {
        return Some(Frame::ImageEnd);
    }

    if image_open {
        return Some(if is_base64_line(line) {
            Frame::ImageData(line.to_owned())
        } else {
            Frame::NoiseDuringImage(line.to_owned())
        });
    }

    if line.starts_with('{') && line.ends_with('}') {
        return Some(Frame::Telemetry(TelemetryFormat::Json, line.to_owned()));
    }
    if is_positional_line(line) {
        return Some(Frame::Telemetry(TelemetryFormat::Positional, line.to_owned()));
    }

    Some(Frame::Noise(line.to_owned()))
}

/// Returns `true` if `line` is non-empty and made only of `[A-Za-z0-9+/=]`.
pub fn is_base64_line(line: &str) -> bool {
    !line.is_empty()
        && line
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=')
}

fn is_positional_line(line: &str) -> bool {
    line.starts_with(POSITIONAL_SENTINEL)
        && line.split(POSITIONAL_SEPARATOR).count() >= POSITIONAL_FIELD_COUNT
}

fn parse_image_header(fields: &str) -> Option<ImageHeader> {
    let mut parts = fields.split(FIELD_SEPARATOR);
    let filename = parts.next().map(str::trim).filter(|f| !f.is_empty())?;
    let declared_size = parts.next()?.trim().parse().ok()?;
    Some(ImageHeader {
        filename: filename.to_owned(),
        declared_size,
    })
}
