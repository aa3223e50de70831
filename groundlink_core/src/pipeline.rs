use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ImageError, TelemetryError};
use crate::frame::{Frame, ImageHeader, TelemetryFormat, classify};
use crate::image::{DecodedImage, ImageAssembler};
use crate::line_assembler::{AssembledLine, LineAssembler};
use crate::stages::{MissionStage, MissionStageTracker};
use crate::telemetry::{self, TelemetryRecord};

/// Recoverable problems found while decoding. None of them stop the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    /// An `IMG|` line without a usable filename or size.
    MalformedImageHeader(String),
    /// `IMG_START` arrived while a transfer was open; the old transfer was dropped.
    ImageRestarted { discarded_chars: usize },
    /// A non-base64 line arrived during a transfer and was skipped.
    NoiseDuringImage(String),
    /// `IMG_END` arrived without a matching `IMG_START`.
    UnexpectedImageEnd,
    /// The transfer payload could not be decoded; it was dropped.
    ImageDecodeFailed(ImageError),
    /// The link closed with a transfer still open; it was dropped.
    ImageInterrupted { discarded_chars: usize },
    /// A telemetry-shaped line could not be decoded.
    MalformedTelemetry { line: String, error: TelemetryError },
    /// A line that matched nothing.
    Noise(String),
    /// A line past the length limit was dropped unread.
    LineTooLong { discarded_bytes: usize },
}

/// Everything the pipeline reports, in stream order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LinkEvent {
    Acknowledgement(String),
    DeviceError(String),
    ImageAnnounced(ImageHeader),
    ImageStarted,
    ImageReceived(DecodedImage),
    Telemetry(TelemetryRecord),
    StageActivated(MissionStage),
    Diagnostic(Diagnostic),
}

/// Running totals for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub bytes: u64,
    pub lines: u64,
    pub telemetry_records: u64,
    pub images: u64,
    pub diagnostics: u64,
}

/// Streaming decoder for one link session.
///
/// Owns the partial-line buffer, the image accumulator and the mission stage latches. Bytes go
/// in through `parse_bytes`; decoded events come out, in order, through `next_event`. A new
/// session needs a new pipeline.
#[derive(Debug, Default)]
pub struct LinkPipeline {
    lines: LineAssembler,
    images: ImageAssembler,
    stages: MissionStageTracker,
    /// Queue of events ready to be consumed.
    events: VecDeque<LinkEvent>,
    stats: PipelineStats,
}

impl LinkPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pipeline with custom buffer limits.
    ///
    /// # Arguments
    ///
    /// - `max_line_bytes` (`usize`) - Longest line kept; longer lines become `LineTooLong`.
    /// - `max_image_chars` (`usize`) - Most base64 text one image transfer may hold.
    pub fn with_limits(max_line_bytes: usize, max_image_chars: usize) -> Self {
        Self {
            lines: LineAssembler::with_max_line_bytes(max_line_bytes),
            images: ImageAssembler::with_max_chars(max_image_chars),
            ..Self::default()
        }
    }

    /// Feeds raw link bytes and queues every event they complete.
    ///
    /// A bad line only ever produces a `Diagnostic`; decoding carries on with the next line.
    pub fn parse_bytes(&mut self, bytes: &[u8]) {
        self.stats.bytes += bytes.len() as u64;
        for item in self.lines.assemble(bytes) {
            self.process_item(item);
        }
    }

    /// Ends the session's input.
    ///
    /// A trailing line without a terminator is processed as a final line. An image transfer
    /// that is still open is dropped, never completed.
    pub fn close(&mut self) {
        if let Some(item) = self.lines.finish() {
            self.process_item(item);
        }
        if let Some(discarded_chars) = self.images.abort() {
            warn!(discarded_chars, "link closed during image transfer");
            self.push_diagnostic(Diagnostic::ImageInterrupted { discarded_chars });
        }
    }

    /// Pops the next decoded event, if available.
    pub fn next_event(&mut self) -> Option<LinkEvent> {
        self.events.pop_front()
    }

    /// Drains every queued event.
    pub fn drain_events(&mut self) -> impl Iterator<Item = LinkEvent> + '_ {
        self.events.drain(..)
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn stage_tracker(&self) -> &MissionStageTracker {
        &self.stages
    }

    pub fn is_receiving_image(&self) -> bool {
        self.images.is_open()
    }

    fn process_item(&mut self, item: AssembledLine) {
        match item {
            AssembledLine::Line(line) => self.process_line(&line),
            AssembledLine::TooLong { discarded_bytes } => {
                warn!(discarded_bytes, "line too long, dropped");
                self.push_diagnostic(Diagnostic::LineTooLong { discarded_bytes });
            }
        }
    }

    /// Classifies one line and routes it.
    fn process_line(&mut self, line: &str) {
        let Some(frame) = classify(line, self.images.is_open()) else {
            return;
        };
        self.stats.lines += 1;

        match frame {
            Frame::Acknowledgement(text) => {
                info!(%text, "payload acknowledged");
                self.events.push_back(LinkEvent::Acknowledgement(text));
            }
            Frame::Error(text) => {
                warn!(%text, "payload reported an error");
                self.events.push_back(LinkEvent::DeviceError(text));
            }
            Frame::ImageHeader(header) => {
                info!(filename = %header.filename, size = header.declared_size, "image announced");
                self.images.on_header(header.clone());
                self.events.push_back(LinkEvent::ImageAnnounced(header));
            }
            Frame::MalformedImageHeader(line) => {
                warn!(%line, "malformed image header");
                self.push_diagnostic(Diagnostic::MalformedImageHeader(line));
            }
            Frame::ImageStart => {
                if let Some(discarded_chars) = self.images.on_start() {
                    self.push_diagnostic(Diagnostic::ImageRestarted { discarded_chars });
                }
                self.events.push_back(LinkEvent::ImageStarted);
            }
            Frame::ImageEnd => match self.images.on_end() {
                Ok(image) => {
                    info!(sequence = image.sequence, bytes = image.len(), "image received");
                    self.stats.images += 1;
                    self.events.push_back(LinkEvent::ImageReceived(image));
                }
                Err(ImageError::NotOpen) => {
                    warn!("IMG_END without IMG_START");
                    self.push_diagnostic(Diagnostic::UnexpectedImageEnd);
                }
                Err(error) => {
                    warn!(%error, "image discarded");
                    self.push_diagnostic(Diagnostic::ImageDecodeFailed(error));
                }
            },
            Frame::ImageData(fragment) => {
                if let Err(error) = self.images.on_chunk(&fragment) {
                    warn!(%error, "image fragment refused");
                    self.push_diagnostic(Diagnostic::ImageDecodeFailed(error));
                }
            }
            Frame::NoiseDuringImage(line) => {
                warn!(%line, "skipped non-image line during transfer");
                self.push_diagnostic(Diagnostic::NoiseDuringImage(line));
            }
            Frame::Telemetry(format, line) => self.process_telemetry(format, line),
            Frame::Noise(line) => {
                debug!(%line, "ignored line");
                self.push_diagnostic(Diagnostic::Noise(line));
            }
        }
    }

    fn process_telemetry(&mut self, format: TelemetryFormat, line: String) {
        match telemetry::decode(&line, format) {
            Ok(record) => {
                let activated = self.stages.update(&record);
                self.stats.telemetry_records += 1;
                self.events.push_back(LinkEvent::Telemetry(record));
                for stage in activated {
                    info!(?stage, "mission stage reached");
                    self.events.push_back(LinkEvent::StageActivated(stage));
                }
            }
            Err(error) => {
                warn!(%line, %error, "malformed telemetry");
                self.push_diagnostic(Diagnostic::MalformedTelemetry { line, error });
            }
        }
    }

    fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.stats.diagnostics += 1;
        self.events.push_back(LinkEvent::Diagnostic(diagnostic));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events_for(stream: &[u8]) -> Vec<LinkEvent> {
        let mut pipeline = LinkPipeline::new();
        pipeline.parse_bytes(stream);
        pipeline.drain_events().collect()
    }

    #[test]
    fn test_full_session() {
        let stream = b"ACK|ready\r\n\
            IMG|frame.jpg|4\r\n\
            IMG_START\r\n\
            QUJD\r\n\
            IMG_END\r\n\
            S1.0,2.0,3.0,4.0,5.0,6.0,7.0,8.0,1,0,0,0\r\n";
        let events = events_for(stream);

        assert_eq!(events[0], LinkEvent::Acknowledgement("ready".to_string()));
        assert_eq!(
            events[1],
            LinkEvent::ImageAnnounced(ImageHeader {
                filename: "frame.jpg".to_string(),
                declared_size: 4,
            })
        );
        assert_eq!(events[2], LinkEvent::ImageStarted);
        let LinkEvent::ImageReceived(image) = &events[3] else {
            panic!("expected image, got {:?}", events[3]);
        };
        assert_eq!(image.bytes, b"ABC");
        assert_eq!(image.filename.as_deref(), Some("frame.jpg"));
        let LinkEvent::Telemetry(record) = &events[4] else {
            panic!("expected telemetry, got {:?}", events[4]);
        };
        assert_eq!(record.altitude, 3.0);
        assert_eq!(events[5], LinkEvent::StageActivated(MissionStage::Launched));
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn test_chunking_does_not_change_events() {
        let stream: &[u8] = b"IMG_START\nQUJD\nRUZH\nIMG_END\n{\"latitude\":0,\"longitude\":0,\"altitude\":1,\"launched\":1}\nERR|x\n";
        // Compared as Debug text: absent readings are NaN, which never equals itself
        let expected = format!("{:?}", events_for(stream));

        for chunk_size in 1..stream.len() {
            let mut pipeline = LinkPipeline::new();
            for chunk in stream.chunks(chunk_size) {
                pipeline.parse_bytes(chunk);
            }
            let events: Vec<LinkEvent> = pipeline.drain_events().collect();
            assert_eq!(format!("{events:?}"), expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_bad_lines_do_not_stop_decoding() {
        let events = events_for(
            b"{\"latitude\":\"x\"}\nIMG|broken\ngarbage\nIMG_END\nACK|still here\n",
        );
        assert!(matches!(
            events[0],
            LinkEvent::Diagnostic(Diagnostic::MalformedTelemetry { .. })
        ));
        assert_eq!(
            events[1],
            LinkEvent::Diagnostic(Diagnostic::MalformedImageHeader("IMG|broken".to_string()))
        );
        assert_eq!(
            events[2],
            LinkEvent::Diagnostic(Diagnostic::Noise("garbage".to_string()))
        );
        assert_eq!(events[3], LinkEvent::Diagnostic(Diagnostic::UnexpectedImageEnd));
        assert_eq!(
            events[4],
            LinkEvent::Acknowledgement("still here".to_string())
        );
    }

    #[test]
    fn test_stray_lines_during_image_are_skipped() {
        let events = events_for(b"IMG_START\nQUJD\n{\"altitude\":3}\nERR|cam\nIMG_END\n");
        assert_eq!(
            events,
            vec![
                LinkEvent::ImageStarted,
                LinkEvent::Diagnostic(Diagnostic::NoiseDuringImage(
                    "{\"altitude\":3}".to_string()
                )),
                LinkEvent::DeviceError("cam".to_string()),
                LinkEvent::ImageReceived(DecodedImage {
                    sequence: 1,
                    filename: None,
                    declared_size: None,
                    bytes: b"ABC".to_vec(),
                }),
            ]
        );
    }

    #[test]
    fn test_restart_reports_and_discards() {
        let events = events_for(b"IMG_START\nAAAA\nIMG_START\nQUJD\nIMG_END\n");
        assert_eq!(
            events[2],
            LinkEvent::Diagnostic(Diagnostic::ImageRestarted { discarded_chars: 4 })
        );
        assert!(matches!(&events[4], LinkEvent::ImageReceived(image) if image.bytes == b"ABC"));
    }

    #[test]
    fn test_corrupt_image_is_reported_not_surfaced() {
        let events = events_for(b"IMG_START\nQUJ\nIMG_END\nACK|ok\n");
        assert!(matches!(
            events[1],
            LinkEvent::Diagnostic(Diagnostic::ImageDecodeFailed(ImageError::Decode { .. }))
        ));
        assert!(!events.iter().any(|e| matches!(e, LinkEvent::ImageReceived(_))));
        assert_eq!(events[2], LinkEvent::Acknowledgement("ok".to_string()));
    }

    #[test]
    fn test_replayed_record_activates_stage_once() {
        let line = b"S1,2,3,4,5,6,7,8,1,0,0,0\n";
        let mut pipeline = LinkPipeline::new();
        pipeline.parse_bytes(line);
        pipeline.parse_bytes(line);

        let stages: Vec<MissionStage> = pipeline
            .drain_events()
            .filter_map(|event| match event {
                LinkEvent::StageActivated(stage) => Some(stage),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec![MissionStage::Launched]);
        assert_eq!(pipeline.stats().telemetry_records, 2);
    }

    #[test]
    fn test_close_flushes_tail_and_drops_open_image() {
        let mut pipeline = LinkPipeline::new();
        pipeline.parse_bytes(b"IMG_START\nQUJD\n");
        assert!(pipeline.is_receiving_image());
        pipeline.parse_bytes(b"ACK|last");
        pipeline.close();

        let events: Vec<LinkEvent> = pipeline.drain_events().collect();
        assert_eq!(
            events,
            vec![
                LinkEvent::ImageStarted,
                LinkEvent::Acknowledgement("last".to_string()),
                LinkEvent::Diagnostic(Diagnostic::ImageInterrupted { discarded_chars: 4 }),
            ]
        );
        assert!(!pipeline.is_receiving_image());
    }

    #[test]
    fn test_stats() {
        let mut pipeline = LinkPipeline::new();
        pipeline.parse_bytes(b"\n\nnoise\nS1,2,3,4,5,6,7,8,0,0,0,0\n");
        let stats = pipeline.stats();
        assert_eq!(stats.bytes, 33);
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.telemetry_records, 1);
        assert_eq!(stats.diagnostics, 1);
    }

    #[test]
    fn test_size_mismatch_still_delivers_image() {
        let events = events_for(b"IMG|frame.jpg|9999\nIMG_START\nQUJD\nIMG_END\n");
        let LinkEvent::ImageReceived(image) = &events[2] else {
            panic!("expected image, got {:?}", events[2]);
        };
        assert_eq!(image.bytes, b"ABC");
        assert_eq!(image.declared_size, Some(9999));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_limits_produce_diagnostics_and_decoding_continues() {
        let mut pipeline = LinkPipeline::with_limits(16, 8);
        pipeline.parse_bytes(b"ERR|this line is far too long\nACK|ok\n");
        pipeline.parse_bytes(b"IMG_START\nQUJD\nQUJD\nQUJD\nIMG_END\nACK|after\n");

        let events: Vec<LinkEvent> = pipeline.drain_events().collect();
        assert_eq!(
            events,
            vec![
                LinkEvent::Diagnostic(Diagnostic::LineTooLong { discarded_bytes: 29 }),
                LinkEvent::Acknowledgement("ok".to_string()),
                LinkEvent::ImageStarted,
                LinkEvent::Diagnostic(Diagnostic::ImageDecodeFailed(ImageError::TooLarge {
                    limit: 8
                })),
                LinkEvent::Diagnostic(Diagnostic::UnexpectedImageEnd),
                LinkEvent::Acknowledgement("after".to_string()),
            ]
        );
        assert!(!pipeline.is_receiving_image());
    }
}
