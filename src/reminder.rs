use std::fmt;

use chrono::{NaiveDate, NaiveTime, TimeDelta, Timelike};
use thiserror::Error;

/// An independent scheduling domain. Each category owns its own persisted
/// spec and at most one outstanding notification batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderCategory {
    Water,
    Medication,
    MealTime,
}

impl ReminderCategory {
    pub const ALL: [ReminderCategory; 3] = [
        ReminderCategory::Water,
        ReminderCategory::Medication,
        ReminderCategory::MealTime,
    ];

    /// Stable key used for persistence and notification payload tagging.
    pub fn key(&self) -> &'static str {
        match self {
            ReminderCategory::Water => "water",
            ReminderCategory::Medication => "medication",
            ReminderCategory::MealTime => "mealtime",
        }
    }
}

impl fmt::Display for ReminderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReminderCategory::Water => "Water",
            ReminderCategory::Medication => "Medication",
            ReminderCategory::MealTime => "Meal time",
        };
        f.write_str(name)
    }
}

pub type EntryId = i64;

/// Time-of-day a reminder fires at, normalized to whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderFireTime(NaiveTime);

impl ReminderFireTime {
    pub fn new(inner: NaiveTime) -> Self {
        let normalized_time = inner.with_nanosecond(0).expect("Will never fail.");
        Self(normalized_time)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

/// Repeating reminder between two times of day, e.g. water every 30 minutes
/// from 6:00 to 22:00. `end <= start` means the window crosses midnight.
#[derive(Debug, Clone)]
pub struct IntervalWindow {
    pub start: ReminderFireTime,
    pub end: ReminderFireTime,
    pub every: TimeDelta,
}

/// A single labeled time of day, e.g. "Breakfast" at 9:00. Meal-time
/// reminders are a list of these, each scheduled as an independent one-shot.
#[derive(Debug, Clone)]
pub struct LabeledInstant {
    pub label: String,
    pub time: ReminderFireTime,
}

/// Daily reminder over an inclusive calendar-date range, e.g. a course of
/// medication at a fixed time.
#[derive(Debug, Clone)]
pub struct DateRangeDaily {
    pub subject: String,
    pub notes: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time: ReminderFireTime,
}

/// User intent, immutable once compiled. Edits produce a new spec and a
/// full recompile, never an in-place patch of scheduled instants.
#[derive(Debug, Clone)]
pub enum ReminderSpec {
    IntervalWindow(IntervalWindow),
    LabeledInstant(LabeledInstant),
    DateRangeDaily(DateRangeDaily),
}

impl ReminderSpec {
    pub fn validate(&self) -> Result<(), SpecError> {
        match self {
            ReminderSpec::IntervalWindow(window) => {
                if window.every <= TimeDelta::zero() {
                    return Err(SpecError::NonPositiveInterval(window.every.num_seconds()));
                }
            }
            ReminderSpec::LabeledInstant(_) => {}
            ReminderSpec::DateRangeDaily(range) => {
                if range.start_date > range.end_date {
                    return Err(SpecError::InvertedDateRange {
                        start: range.start_date,
                        end: range.end_date,
                    });
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("repeat interval must be positive, got {0} seconds")]
    NonPositiveInterval(i64),

    #[error("date range ends before it starts ({start} > {end})")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
}

/// Persisted meal-time list entry.
#[derive(Debug, Clone)]
pub struct MealEntry {
    pub id: EntryId,
    pub label: String,
    pub time: ReminderFireTime,
}

/// Persisted medication list entry. An inactive entry stays in the list but
/// is excluded from every subsequent compile.
#[derive(Debug, Clone)]
pub struct MedicationEntry {
    pub id: EntryId,
    pub name: String,
    pub notes: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time: ReminderFireTime,
    pub is_active: bool,
}

impl MedicationEntry {
    pub fn to_spec(&self) -> DateRangeDaily {
        DateRangeDaily {
            subject: self.name.clone(),
            notes: self.notes.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            time: self.time,
        }
    }
}
