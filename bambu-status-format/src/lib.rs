//! Telemetry decoding and status formatting for waybar-bambu-status
//!
//! Turns one MQTT payload from a Bambu Lab printer into a [`DisplayRecord`]
//! that a waybar `custom` module can render:
//!
//! ```text
//! {"text":"󰹛 42% (1h 30m)","tooltip":"Job: benchy\n...","class":"running"}
//! ```
//!
//! Decoding ([`TelemetrySnapshot::from_payload`]) validates the handful of
//! fields the status line cannot do without; everything else degrades to a
//! zero value. Formatting ([`Layout::format`]) is a pure function.
//!
//! # Example Usage
//!
//! ```
//! use bambu_status_format::{Layout, StatusClass, TelemetrySnapshot};
//!
//! let payload = br#"{"print":{"gcode_state":"RUNNING","bed_temper":60.0,
//!     "mc_percent":42,"mc_remaining_time":90}}"#;
//!
//! let snapshot = TelemetrySnapshot::from_payload(payload).unwrap();
//! let record = Layout::Detailed.format(&snapshot);
//!
//! assert_eq!(record.class, StatusClass::Running);
//! assert!(record.text.contains("42% (1h 30m)"));
//! ```

pub mod error;
pub mod formatter;
pub mod record;
pub mod telemetry;
pub mod units;

// Re-exports
pub use error::{Result, TelemetryError};
pub use formatter::{Layout, ParseLayoutError};
pub use record::{DisplayRecord, StatusClass};
pub use telemetry::{PrintState, TelemetrySnapshot};
pub use units::{format_duration, temperature_level, TemperatureLevel, TotalMinutes};
