//! Unit helpers used by the status line: remaining time and thermometer icons.

/// Anything that can be read as a count of whole minutes.
///
/// Floating values are rounded to the nearest minute (halves away from
/// zero); negative and NaN values count as zero.
pub trait TotalMinutes {
    fn total_minutes(self) -> u64;
}

macro_rules! impl_total_minutes_signed {
    ($($t:ty),*) => {
        $(impl TotalMinutes for $t {
            fn total_minutes(self) -> u64 {
                if self < 0 { 0 } else { self as u64 }
            }
        })*
    };
}

macro_rules! impl_total_minutes_unsigned {
    ($($t:ty),*) => {
        $(impl TotalMinutes for $t {
            fn total_minutes(self) -> u64 {
                self as u64
            }
        })*
    };
}

impl_total_minutes_signed!(i8, i16, i32, i64, isize);
impl_total_minutes_unsigned!(u8, u16, u32, u64, usize);

impl TotalMinutes for f64 {
    fn total_minutes(self) -> u64 {
        let rounded = self.round();
        if rounded.is_nan() || rounded <= 0.0 {
            0
        } else {
            // `as` saturates for values beyond u64::MAX
            rounded as u64
        }
    }
}

impl TotalMinutes for f32 {
    fn total_minutes(self) -> u64 {
        f64::from(self).total_minutes()
    }
}

/// Render a minute count as `"2h 6m"`, `"1h"` or `"45m"`.
///
/// The hour part is omitted only when it is zero; minutes are always shown
/// when there are no hours, so zero renders as `"0m"`.
pub fn format_duration(minutes: impl TotalMinutes) -> String {
    let total = minutes.total_minutes();
    let hours = total / 60;
    let mins = total % 60;

    match (hours, mins) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// How far a heater is towards its target, as a thermometer icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemperatureLevel {
    /// No target set
    Empty,
    Quarter,
    Half,
    ThreeQuarters,
    Full,
}

impl TemperatureLevel {
    /// Font Awesome thermometer glyph
    pub fn glyph(self) -> &'static str {
        match self {
            TemperatureLevel::Empty => "\u{f2cb}",
            TemperatureLevel::Quarter => "\u{f2ca}",
            TemperatureLevel::Half => "\u{f2c9}",
            TemperatureLevel::ThreeQuarters => "\u{f2c8}",
            TemperatureLevel::Full => "\u{f2c7}",
        }
    }
}

impl std::fmt::Display for TemperatureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.glyph())
    }
}

/// Pick the thermometer level for a current/target temperature pair.
///
/// Thresholds are quarters of `target`. Between three quarters and the
/// target the icon stays at [`TemperatureLevel::ThreeQuarters`]; it only
/// fills up once `current >= target`.
pub fn temperature_level(current: f64, target: f64) -> TemperatureLevel {
    if !(target > 0.0) || current.is_nan() {
        return TemperatureLevel::Empty;
    }

    if current <= target / 4.0 {
        TemperatureLevel::Quarter
    } else if current <= target / 2.0 {
        TemperatureLevel::Half
    } else if current <= (target / 4.0) * 3.0 {
        TemperatureLevel::ThreeQuarters
    } else if current >= target {
        TemperatureLevel::Full
    } else {
        TemperatureLevel::ThreeQuarters
    }
}
