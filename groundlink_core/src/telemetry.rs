use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::telemetry_constants::*;
use crate::constants::wire_constants::{
    POSITIONAL_FIELD_COUNT, POSITIONAL_SENTINEL, POSITIONAL_SEPARATOR,
};
use crate::error::TelemetryError;
use crate::frame::TelemetryFormat;

/// Three-axis acceleration as reported by the payload IMU, in g.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A decoded telemetry reading.
///
/// Numeric readings are either finite or NaN. NaN means the reading was absent or could not
/// be parsed; it is never replaced by a default. NaN serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub pressure: f64,
    pub x_rotation: f64,
    pub y_rotation: f64,
    pub z_rotation: f64,
    pub temperature: f64,

    pub launched: bool,
    pub target_altitude_reached: bool,
    pub parachute_released: bool,
    pub instrument_released: bool,

    /// Only carried by JSON telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<Acceleration>,
    /// Battery voltage. Only carried by JSON telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
}

impl TelemetryRecord {
    /// Returns `false` for the `0,0` position the payload sends before it has a GPS fix,
    /// and for a missing position.
    pub fn has_position_fix(&self) -> bool {
        if self.latitude.is_nan() || self.longitude.is_nan() {
            return false;
        }
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// `(latitude, longitude)` when the record carries a real fix.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.has_position_fix()
            .then_some((self.latitude, self.longitude))
    }
}

/// Converts a NaN-for-absent reading into an `Option`.
pub fn reading(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

/// Decodes a telemetry line that the classifier tagged with `format`.
pub fn decode(line: &str, format: TelemetryFormat) -> Result<TelemetryRecord, TelemetryError> {
    match format {
        TelemetryFormat::Json => decode_json(line),
        TelemetryFormat::Positional => decode_positional(line),
    }
}

/// Decodes a `{...}` telemetry object.
///
/// `latitude`, `longitude` and `altitude` are required. The remaining readings may be absent
/// (NaN), but when present must be JSON numbers. Stage flags may be booleans or numbers and
/// default to `false`.
pub fn decode_json(line: &str) -> Result<TelemetryRecord, TelemetryError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| TelemetryError::InvalidJson(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(TelemetryError::NotAnObject);
    };

    let acceleration = match object.get(ACCELERATION) {
        None | Some(Value::Null) => None,
        Some(Value::Object(axes)) => Some(Acceleration {
            x: optional_number(axes, "x")?,
            y: optional_number(axes, "y")?,
            z: optional_number(axes, "z")?,
        }),
        Some(_) => {
            return Err(TelemetryError::WrongType {
                field: ACCELERATION,
                expected: "object",
            });
        }
    };

    let voltage = reading(optional_number(&object, VOLTAGE)?);

    Ok(TelemetryRecord {
        latitude: required_number(&object, LATITUDE)?,
        longitude: required_number(&object, LONGITUDE)?,
        altitude: required_number(&object, ALTITUDE)?,
        pressure: optional_number(&object, PRESSURE)?,
        x_rotation: optional_number(&object, X_ROTATION)?,
        y_rotation: optional_number(&object, Y_ROTATION)?,
        z_rotation: optional_number(&object, Z_ROTATION)?,
        temperature: optional_number(&object, TEMPERATURE)?,
        launched: flag(&object, LAUNCHED)?,
        target_altitude_reached: flag(&object, TARGET_ALTITUDE_REACHED)?,
        parachute_released: flag(&object, PARACHUTE_RELEASED)?,
        instrument_released: flag(&object, INSTRUMENT_RELEASED)?,
        acceleration,
        voltage,
    })
}

/// Decodes an `S<f1>,...,<f12>` telemetry line.
///
/// Field order is latitude, longitude, altitude, pressure, x_rotation, y_rotation,
/// z_rotation, temperature, launched, target_altitude_reached, parachute_released,
/// instrument_released. A field that does not parse becomes NaN (or `false` for a flag);
/// fields past the twelfth are ignored.
pub fn decode_positional(line: &str) -> Result<TelemetryRecord, TelemetryError> {
    let body = line
        .trim()
        .strip_prefix(POSITIONAL_SENTINEL)
        .ok_or(TelemetryError::MissingSentinel(POSITIONAL_SENTINEL))?;

    let fields: Vec<f64> = body.split(POSITIONAL_SEPARATOR).map(parse_or_nan).collect();
    if fields.len() < POSITIONAL_FIELD_COUNT {
        return Err(TelemetryError::FieldCount {
            expected: POSITIONAL_FIELD_COUNT,
            got: fields.len(),
        });
    }

    let is_set = |value: f64| value.is_finite() && value != 0.0;

    Ok(TelemetryRecord {
        latitude: fields[0],
        longitude: fields[1],
        altitude: fields[2],
        pressure: fields[3],
        x_rotation: fields[4],
        y_rotation: fields[5],
        z_rotation: fields[6],
        temperature: fields[7],
        launched: is_set(fields[8]),
        target_altitude_reached: is_set(fields[9]),
        parachute_released: is_set(fields[10]),
        instrument_released: is_set(fields[11]),
        acceleration: None,
        voltage: None,
    })
}

/// `str::parse` accepts `inf`, `NaN` and overflowing exponents; none of those is a reading.
fn parse_or_nan(field: &str) -> f64 {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(f64::NAN)
}

fn required_number(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<f64, TelemetryError> {
    match object.get(field) {
        None => Err(TelemetryError::MissingField(field)),
        Some(value) => number(value, field),
    }
}

fn optional_number(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<f64, TelemetryError> {
    match object.get(field) {
        None => Ok(f64::NAN),
        Some(value) => number(value, field),
    }
}

fn number(value: &Value, field: &'static str) -> Result<f64, TelemetryError> {
    value.as_f64().ok_or(TelemetryError::WrongType {
        field,
        expected: "number",
    })
}

fn flag(object: &Map<String, Value>, field: &'static str) -> Result<bool, TelemetryError> {
    match object.get(field) {
        None => Ok(false),
        Some(Value::Bool(set)) => Ok(*set),
        Some(Value::Number(n)) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        Some(_) => Err(TelemetryError::WrongType {
            field,
            expected: "boolean or number",
        }),
    }
}
