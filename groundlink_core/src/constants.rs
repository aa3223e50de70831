pub mod wire_constants {
    /// Prefix of an acknowledgement line sent by the payload.
    pub const ACK_PREFIX: &str = "ACK|";
    /// Prefix of an error line sent by the payload.
    pub const ERR_PREFIX: &str = "ERR|";
    /// Prefix of an image announcement line, followed by `filename|size`.
    pub const IMAGE_HEADER_PREFIX: &str = "IMG|";
    /// Separator between fields of a prefixed line.
    pub const FIELD_SEPARATOR: char = '|';
    /// Line that opens an image transfer.
    pub const IMAGE_START_MARKER: &str = "IMG_START";
    /// Line that closes an image transfer.
    pub const IMAGE_END_MARKER: &str = "IMG_END";
    /// Leading character of a legacy positional telemetry line.
    pub const POSITIONAL_SENTINEL: char = 'S';
    /// Separator between positional telemetry fields.
    pub const POSITIONAL_SEPARATOR: char = ',';
    /// Number of fields in a positional telemetry line. Changing this is a breaking wire change.
    pub const POSITIONAL_FIELD_COUNT: usize = 12;
}

pub mod command_constants {
    /// Prefix the current payload firmware expects in front of every command.
    pub const DEFAULT_COMMAND_PREFIX: &str = "CMD|";
    /// Line terminator appended to every command.
    pub const DEFAULT_COMMAND_TERMINATOR: &str = "\r\n";
}

pub mod telemetry_constants {
    /// JSON key names, in positional field order.
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const ALTITUDE: &str = "altitude";
    pub const PRESSURE: &str = "pressure";
    pub const X_ROTATION: &str = "x_rotation";
    pub const Y_ROTATION: &str = "y_rotation";
    pub const Z_ROTATION: &str = "z_rotation";
    pub const TEMPERATURE: &str = "temperature";
    pub const LAUNCHED: &str = "launched";
    pub const TARGET_ALTITUDE_REACHED: &str = "target_altitude_reached";
    pub const PARACHUTE_RELEASED: &str = "parachute_released";
    pub const INSTRUMENT_RELEASED: &str = "instrument_released";

    pub const ACCELERATION: &str = "acceleration";
    pub const VOLTAGE: &str = "voltage";
}

pub mod limit_constants {
    /// Longest line kept by the line assembler, in bytes, not counting `\n`.
    pub const MAX_LINE_BYTES: usize = 64 * 1024;
    /// Most base64 text one image transfer may accumulate. Camera frames are a few hundred KiB.
    pub const MAX_IMAGE_CHARS: usize = 8 * 1024 * 1024;
}
