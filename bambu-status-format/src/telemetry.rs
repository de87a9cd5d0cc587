//! Typed view of a Bambu Lab MQTT status report
//!
//! Printers publish JSON on `device/<serial>/report`. Only reports that carry
//! a `print` object are status pushes; the rest (`info`, `system`, ...) are
//! rejected with [`TelemetryError::NotAPrintReport`].

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Result, TelemetryError};

/// Value of `gcode_state`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintState {
    Running,
    Finish,
    /// PREPARE, PAUSE, FAILED, IDLE, ... kept verbatim
    Other(String),
}

impl PrintState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "RUNNING" => PrintState::Running,
            "FINISH" => PrintState::Finish,
            other => PrintState::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for PrintState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrintState::Running => write!(f, "RUNNING"),
            PrintState::Finish => write!(f, "FINISH"),
            PrintState::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// Validated printer status, one per MQTT push
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    // Required
    pub state: PrintState,
    pub bed_temp: f64,
    pub percent: f64,

    // Optional, zero when absent
    pub bed_target_temp: f64,
    pub nozzle_temp: f64,
    pub nozzle_target_temp: f64,
    pub chamber_temp: f64,
    pub layer: f64,
    pub total_layers: f64,
    pub remaining_minutes: f64,
    pub job_name: String,
}

impl TelemetrySnapshot {
    /// Decode and validate a raw MQTT payload.
    ///
    /// # Errors
    /// - [`TelemetryError::Json`] if the payload is not JSON
    /// - [`TelemetryError::NotAPrintReport`] if there is no `print` object
    /// - [`TelemetryError::MissingField`] / [`TelemetryError::InvalidField`]
    ///   if `gcode_state`, `bed_temper` or `mc_percent` is absent or mistyped
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let report: RawReport = serde_json::from_slice(payload)?;
        let print = report.print.ok_or(TelemetryError::NotAPrintReport)?;
        print.validate()
    }
}

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default, deserialize_with = "object_or_none")]
    print: Option<RawPrint>,
}

/// `print` object as sent by the printer; every field may be missing
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPrint {
    gcode_state: Option<Value>,
    bed_temper: Option<Value>,
    mc_percent: Option<Value>,

    #[serde(deserialize_with = "lenient_number")]
    bed_target_temper: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    nozzle_temper: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    nozzle_target_temper: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    chamber_temper: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    layer_num: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    total_layer_num: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    mc_remaining_time: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    subtask_name: Option<String>,
}

impl RawPrint {
    fn validate(self) -> Result<TelemetrySnapshot> {
        let state = required_string("gcode_state", self.gcode_state)?;
        let bed_temp = required_number("bed_temper", self.bed_temper)?;
        let percent = required_number("mc_percent", self.mc_percent)?;

        if self.mc_remaining_time.is_none() {
            tracing::debug!("Missing or invalid 'mc_remaining_time'");
        }
        if self.subtask_name.is_none() {
            tracing::debug!("Missing or invalid 'subtask_name'");
        }

        Ok(TelemetrySnapshot {
            state: PrintState::parse(&state),
            bed_temp,
            percent,
            bed_target_temp: self.bed_target_temper.unwrap_or_default(),
            nozzle_temp: self.nozzle_temper.unwrap_or_default(),
            nozzle_target_temp: self.nozzle_target_temper.unwrap_or_default(),
            chamber_temp: self.chamber_temper.unwrap_or_default(),
            layer: self.layer_num.unwrap_or_default(),
            total_layers: self.total_layer_num.unwrap_or_default(),
            remaining_minutes: self.mc_remaining_time.unwrap_or_default(),
            job_name: self.subtask_name.unwrap_or_default(),
        })
    }
}

fn required_string(field: &'static str, value: Option<Value>) -> Result<String> {
    match value {
        None => Err(TelemetryError::MissingField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(TelemetryError::InvalidField {
            field,
            expected: "string",
        }),
    }
}

fn required_number(field: &'static str, value: Option<Value>) -> Result<f64> {
    let value = value.ok_or(TelemetryError::MissingField(field))?;
    value.as_f64().ok_or(TelemetryError::InvalidField {
        field,
        expected: "number",
    })
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_f64())
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn object_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<RawPrint>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => RawPrint::deserialize(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
