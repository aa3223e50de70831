use serde::Serialize;
use thiserror::Error;

/// Reasons a telemetry line is rejected by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum TelemetryError {
    #[error("telemetry JSON is not valid: {0}")]
    InvalidJson(String),

    #[error("telemetry JSON is not an object")]
    NotAnObject,

    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{field}` must be a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("positional telemetry has {got} fields, expected {expected}")]
    FieldCount { expected: usize, got: usize },

    #[error("positional telemetry does not start with `{0}`")]
    MissingSentinel(char),
}

/// Reasons an image transfer fails to produce an image.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ImageError {
    #[error("no image transfer is open")]
    NotOpen,

    #[error("image fragment contains characters outside the base64 alphabet")]
    InvalidFragment,

    #[error("image transfer ended with an empty payload")]
    EmptyPayload,

    #[error("image payload of {chars} chars is not valid base64: {reason}")]
    Decode { chars: usize, reason: String },

    #[error("image transfer exceeded {limit} base64 chars")]
    TooLarge { limit: usize },
}

/// Reasons a user command produces no outbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,

    #[error("command contains a line break")]
    EmbeddedLineBreak,
}
