//! Snapshot → [`DisplayRecord`] formatting

use std::str::FromStr;

use thiserror::Error;

use crate::record::{DisplayRecord, StatusClass};
use crate::telemetry::{PrintState, TelemetrySnapshot};
use crate::units::{format_duration, temperature_level, TemperatureLevel};

// 3D print icons (Material Design, nerd font range)
const ICON_PRINTING: &str = "\u{f0e5b}";
const ICON_FINISHED: &str = "\u{f0e5c}";
const ICON_ATTENTION: &str = "\u{f11c1}";
const ICON_LAYERS: &str = "\u{e257}";

/// Which status line to render. Every layout is its own daemon identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Progress and remaining time, full temperature tooltip
    #[default]
    Detailed,
    /// Progress and bed temperature
    Compact,
}

#[derive(Error, Debug)]
#[error("unknown layout {0:?} (expected \"detailed\" or \"compact\")")]
pub struct ParseLayoutError(String);

impl FromStr for Layout {
    type Err = ParseLayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "detailed" => Ok(Layout::Detailed),
            "compact" => Ok(Layout::Compact),
            _ => Err(ParseLayoutError(s.to_string())),
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::Detailed => write!(f, "detailed"),
            Layout::Compact => write!(f, "compact"),
        }
    }
}

impl Layout {
    /// Render one snapshot. Deterministic and total.
    pub fn format(&self, snapshot: &TelemetrySnapshot) -> DisplayRecord {
        match self {
            Layout::Detailed => format_detailed(snapshot),
            Layout::Compact => format_compact(snapshot),
        }
    }
}

fn status_class(state: &PrintState) -> StatusClass {
    match state {
        PrintState::Running => StatusClass::Running,
        PrintState::Finish => StatusClass::Idle,
        PrintState::Other(_) => StatusClass::Fault,
    }
}

fn state_icon(state: &PrintState) -> &'static str {
    match state {
        PrintState::Running => ICON_PRINTING,
        PrintState::Finish => ICON_FINISHED,
        PrintState::Other(_) => ICON_ATTENTION,
    }
}

fn short_tooltip(s: &TelemetrySnapshot) -> String {
    format!("Job: {}\nTemp: {:.2}°C", s.job_name, s.bed_temp)
}

fn detailed_tooltip(s: &TelemetrySnapshot) -> String {
    // The chamber has no target temperature
    let chamber = TemperatureLevel::Quarter;

    format!(
        "Job: {}\n{} Bed: {:.2}/{:.2}°C\n{} Nozzle: {:.2}/{:.2}°C\n{} Chamber: {:.2}°C\n{}  Layer: {:.0}/{:.0}",
        s.job_name,
        temperature_level(s.bed_temp, s.bed_target_temp),
        s.bed_temp,
        s.bed_target_temp,
        temperature_level(s.nozzle_temp, s.nozzle_target_temp),
        s.nozzle_temp,
        s.nozzle_target_temp,
        chamber,
        s.chamber_temp,
        ICON_LAYERS,
        s.layer,
        s.total_layers,
    )
}

fn format_detailed(s: &TelemetrySnapshot) -> DisplayRecord {
    let icon = state_icon(&s.state);
    let class = status_class(&s.state);

    match class {
        StatusClass::Running => DisplayRecord {
            text: format!(
                "{} {:.0}% ({})",
                icon,
                s.percent,
                format_duration(s.remaining_minutes)
            ),
            tooltip: detailed_tooltip(s),
            class,
        },
        StatusClass::Idle => DisplayRecord {
            text: format!("{} IDLE", icon),
            tooltip: detailed_tooltip(s),
            class,
        },
        StatusClass::Fault => DisplayRecord {
            text: format!("{} {:.0}%", icon, s.percent),
            tooltip: short_tooltip(s),
            class,
        },
    }
}

fn format_compact(s: &TelemetrySnapshot) -> DisplayRecord {
    DisplayRecord {
        text: format!(
            "{} {:.0}% ({:.2}°C)",
            state_icon(&s.state),
            s.percent,
            s.bed_temp
        ),
        tooltip: short_tooltip(s),
        class: status_class(&s.state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: PrintState) -> TelemetrySnapshot {
        TelemetrySnapshot {
            state,
            bed_temp: 59.5,
            percent: 42.0,
            bed_target_temp: 60.0,
            nozzle_temp: 110.0,
            nozzle_target_temp: 220.0,
            chamber_temp: 30.0,
            layer: 12.0,
            total_layers: 240.0,
            remaining_minutes: 90.0,
            job_name: "benchy".to_string(),
        }
    }

    #[test]
    fn test_running_detailed() {
        let record = Layout::Detailed.format(&snapshot(PrintState::Running));

        assert_eq!(record.class, StatusClass::Running);
        assert_eq!(record.text, format!("{} 42% (1h 30m)", ICON_PRINTING));
        assert!(record.tooltip.starts_with("Job: benchy\n"));
        assert!(record.tooltip.contains("Bed: 59.50/60.00°C"));
        assert!(record.tooltip.contains(&format!(
            "{} Nozzle: 110.00/220.00°C",
            TemperatureLevel::Half
        )));
        assert!(record.tooltip.ends_with("Layer: 12/240"));
    }

    #[test]
    fn test_finish_is_idle() {
        let record = Layout::Detailed.format(&snapshot(PrintState::Finish));

        assert_eq!(record.class, StatusClass::Idle);
        assert_eq!(record.text, format!("{} IDLE", ICON_FINISHED));
        assert!(record.tooltip.contains("Chamber: 30.00°C"));
    }

    #[test]
    fn test_other_states_are_faults() {
        for raw in ["PAUSE", "FAILED", "PREPARE"] {
            let record = Layout::Detailed.format(&snapshot(PrintState::parse(raw)));
            assert_eq!(record.class, StatusClass::Fault);
            assert_eq!(record.text, format!("{} 42%", ICON_ATTENTION));
            assert_eq!(record.tooltip, "Job: benchy\nTemp: 59.50°C");
        }
    }

    #[test]
    fn test_compact_layout() {
        let record = Layout::Compact.format(&snapshot(PrintState::Running));

        assert_eq!(record.class, StatusClass::Running);
        assert_eq!(record.text, format!("{} 42% (59.50°C)", ICON_PRINTING));
        assert_eq!(record.tooltip, "Job: benchy\nTemp: 59.50°C");
    }

    #[test]
    fn test_format_is_deterministic() {
        let s = snapshot(PrintState::Running);
        assert_eq!(Layout::Detailed.format(&s), Layout::Detailed.format(&s));
    }

    #[test]
    fn test_layout_from_str() {
        assert_eq!("detailed".parse::<Layout>().unwrap(), Layout::Detailed);
        assert_eq!(" Compact ".parse::<Layout>().unwrap(), Layout::Compact);
        assert!("fancy".parse::<Layout>().is_err());
        assert_eq!(Layout::default().to_string(), "detailed");
    }
}
