//! Turns a reminder spec and the current instant into the concrete batch of
//! future trigger instants.

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};

use crate::reminder::{DateRangeDaily, IntervalWindow, ReminderSpec, SpecError};

/// Platform-imposed maximum on simultaneously pending notifications.
pub const PENDING_NOTIFICATION_CEILING: usize = 64;

/// One compile-and-schedule cycle's worth of trigger instants, ordered and
/// strictly in the future relative to the `now` they were compiled against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSchedule {
    pub instants: Vec<NaiveDateTime>,
    /// Resolved `[start, end]` pair for interval windows, used for the
    /// human-readable summary. `None` for the other spec shapes.
    pub window: Option<(NaiveDateTime, NaiveDateTime)>,
    /// Set when the batch was cut off at the pending-notification ceiling.
    /// A reported condition, not a failure.
    pub truncated: bool,
}

impl CompiledSchedule {
    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }
}

pub fn compile(spec: &ReminderSpec, now: NaiveDateTime) -> Result<CompiledSchedule, SpecError> {
    spec.validate()?;

    let schedule = match spec {
        ReminderSpec::IntervalWindow(window) => compile_window(window, now),
        ReminderSpec::DateRangeDaily(range) => compile_date_range(range, now),
        ReminderSpec::LabeledInstant(labeled) => CompiledSchedule {
            instants: vec![next_occurrence(labeled.time.time(), now)],
            window: None,
            truncated: false,
        },
    };

    Ok(schedule)
}

/// Today at `fire_at`, rolled forward one day when that instant is already
/// behind `now`. The result is always strictly in the future.
pub fn next_occurrence(fire_at: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date();
    let candidate = today.and_time(fire_at);
    if candidate <= now {
        let tomorrow = today
            .checked_add_signed(TimeDelta::days(1))
            .expect("Not realistic to overflow");
        tomorrow.and_time(fire_at)
    } else {
        candidate
    }
}

fn compile_window(window: &IntervalWindow, now: NaiveDateTime) -> CompiledSchedule {
    let start = next_occurrence(window.start.time(), now);
    let mut end = next_occurrence(window.end.time(), now);
    // An end at or before the start means the window crosses midnight.
    if end <= start {
        end = end
            .checked_add_signed(TimeDelta::days(1))
            .expect("Not realistic to overflow");
    }

    let mut instants = Vec::new();
    let mut truncated = false;
    let mut current = start;
    while current <= end {
        if instants.len() == PENDING_NOTIFICATION_CEILING {
            truncated = true;
            break;
        }
        instants.push(current);
        current += window.every;
    }

    CompiledSchedule {
        instants,
        window: Some((start, end)),
        truncated,
    }
}

fn compile_date_range(range: &DateRangeDaily, now: NaiveDateTime) -> CompiledSchedule {
    let mut instants = Vec::new();
    let mut truncated = false;
    let mut day = range.start_date;
    while day <= range.end_date {
        let trigger = day.and_time(range.time.time());
        // Days already behind `now` are skipped silently so a course that
        // started in the past only fires its remaining doses.
        if trigger > now {
            if instants.len() == PENDING_NOTIFICATION_CEILING {
                truncated = true;
                break;
            }
            instants.push(trigger);
        }
        day = day
            .checked_add_signed(TimeDelta::days(1))
            .expect("Not realistic to overflow");
    }

    CompiledSchedule {
        instants,
        window: None,
        truncated,
    }
}
