//! Decoder core for the payload ground-station link.
//!
//! Raw serial bytes go through [`line_assembler`], [`frame`] classification, then either the
//! [`image`] assembler or the [`telemetry`] decoder, and decoded records drive the
//! [`stages`] tracker. [`pipeline::LinkPipeline`] ties these together for one session.
//! [`commands`] builds the frames sent the other way.

pub mod commands;
pub mod constants;
pub mod error;
pub mod frame;
pub mod image;
pub mod line_assembler;
pub mod pipeline;
pub mod stages;
pub mod telemetry;
