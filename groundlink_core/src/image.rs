use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::limit_constants::MAX_IMAGE_CHARS;
use crate::error::ImageError;
use crate::frame::{ImageHeader, is_base64_line};

/// An image reassembled from a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedImage {
    /// 1-based count of images decoded in this session.
    pub sequence: u32,
    /// Filename from the `IMG|` header that preceded the transfer, if any.
    pub filename: Option<String>,
    /// Size from the `IMG|` header that preceded the transfer, if any.
    pub declared_size: Option<usize>,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One in-progress image reception.
#[derive(Debug)]
struct ImageTransfer {
    /// Base64 text received so far.
    payload: String,
    header: Option<ImageHeader>,
}

/// Accumulates base64 fragments between `IMG_START` and `IMG_END`.
///
/// At most one transfer is open at a time. The header announced by the most recent `IMG|`
/// line is attached to the next transfer that starts. A transfer that grows past
/// `max_chars` of base64 is dropped.
#[derive(Debug)]
pub struct ImageAssembler {
    transfer: Option<ImageTransfer>,
    pending_header: Option<ImageHeader>,
    decoded_count: u32,
    max_chars: usize,
}

impl Default for ImageAssembler {
    fn default() -> Self {
        Self::with_max_chars(MAX_IMAGE_CHARS)
    }
}

impl ImageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_chars(max_chars: usize) -> Self {
        Self {
            transfer: None,
            pending_header: None,
            decoded_count: 0,
            max_chars,
        }
    }

    /// Returns `true` while a transfer is open.
    pub fn is_open(&self) -> bool {
        self.transfer.is_some()
    }

    /// Number of images decoded so far.
    pub fn decoded_count(&self) -> u32 {
        self.decoded_count
    }

    /// Records the announcement for the next transfer.
    pub fn on_header(&mut self, header: ImageHeader) {
        self.pending_header = Some(header);
    }

    /// Opens a new transfer.
    ///
    /// # Returns
    ///
    /// - `Option<usize>` - `Some(chars)` if a transfer was already open; its `chars` of
    ///   accumulated base64 are discarded rather than merged into the new one.
    pub fn on_start(&mut self) -> Option<usize> {
        let discarded = self.transfer.take().map(|t| t.payload.len());
        if let Some(chars) = discarded {
            warn!(chars, "image restarted before IMG_END, discarding previous transfer");
        }

        self.transfer = Some(ImageTransfer {
            payload: String::new(),
            header: self.pending_header.take(),
        });
        discarded
    }

    /// Appends one base64 fragment to the open transfer.
    ///
    /// Fragments outside the base64 alphabet are refused, so they never reach the payload.
    /// A fragment that would take the payload past the size limit closes the transfer.
    pub fn on_chunk(&mut self, fragment: &str) -> Result<(), ImageError> {
        let transfer = self.transfer.as_mut().ok_or(ImageError::NotOpen)?;
        if !is_base64_line(fragment) {
            return Err(ImageError::InvalidFragment);
        }
        if transfer.payload.len() + fragment.len() > self.max_chars {
            warn!(
                received = transfer.payload.len() + fragment.len(),
                limit = self.max_chars,
                "image transfer too large, discarding"
            );
            self.transfer = None;
            return Err(ImageError::TooLarge {
                limit: self.max_chars,
            });
        }
        transfer.payload.push_str(fragment);
        Ok(())
    }

    /// Closes the open transfer and decodes it.
    ///
    /// The transfer is consumed whether decoding succeeds or not; no partial image is ever
    /// returned.
    pub fn on_end(&mut self) -> Result<DecodedImage, ImageError> {
        let transfer = self.transfer.take().ok_or(ImageError::NotOpen)?;
        if transfer.payload.is_empty() {
            return Err(ImageError::EmptyPayload);
        }

        if let Some(header) = &transfer.header
            && header.declared_size != transfer.payload.len()
        {
            warn!(
                filename = %header.filename,
                declared = header.declared_size,
                received = transfer.payload.len(),
                "image size differs from announcement"
            );
        }

        let bytes = STANDARD
            .decode(transfer.payload.as_bytes())
            .map_err(|e| ImageError::Decode {
                chars: transfer.payload.len(),
                reason: e.to_string(),
            })?;

        self.decoded_count += 1;
        debug!(sequence = self.decoded_count, bytes = bytes.len(), "image decoded");

        let (filename, declared_size) = match transfer.header {
            Some(header) => (Some(header.filename), Some(header.declared_size)),
            None => (None, None),
        };
        Ok(DecodedImage {
            sequence: self.decoded_count,
            filename,
            declared_size,
            bytes,
        })
    }

    /// Drops the open transfer without decoding it, e.g. when the link closes mid-image.
    ///
    /// # Returns
    ///
    /// - `Option<usize>` - Number of base64 chars discarded, if a transfer was open.
    pub fn abort(&mut self) -> Option<usize> {
        self.pending_header = None;
        self.transfer.take().map(|t| t.payload.len())
    }
}
