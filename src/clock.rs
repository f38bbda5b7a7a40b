//! Wall-clock formatting helpers shared by summaries and payload text.

use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Am,
    Pm,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::Am => "AM",
            Period::Pm => "PM",
        })
    }
}

/// A time of day rendered for display, split into the numeric part and the
/// AM/PM suffix so the UI can style them independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwelveHour {
    pub text: String,
    pub period: Period,
}

impl fmt::Display for TwelveHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.text, self.period)
    }
}

/// 12-hour rendering: hour 0 maps to 12 AM, hours 13-23 map to 1-11 PM.
pub fn format_twelve_hour(time: NaiveTime) -> TwelveHour {
    let hour = time.hour();
    let period = if hour >= 12 { Period::Pm } else { Period::Am };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };

    TwelveHour {
        text: format!("{}:{:02}", display_hour, time.minute()),
        period,
    }
}

/// Zero-padded `YYYY-MM-DD`, a stable key for calendar-range marking.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Human-readable window summary, e.g. `6:00 AM - 10:00 PM`.
pub fn window_summary(start: NaiveTime, end: NaiveTime) -> String {
    format!("{} - {}", format_twelve_hour(start), format_twelve_hour(end))
}
