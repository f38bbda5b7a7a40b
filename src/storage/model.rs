//! Serialized shapes for the file-backed store, kept separate from the
//! domain types and converted at the boundary.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::reminder::{EntryId, IntervalWindow, MealEntry, MedicationEntry, ReminderFireTime};

use super::StoredReminder;

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct StoreFileModel {
    #[serde(default)]
    pub reminders: HashMap<String, StoredReminderModel>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(super) enum StoredReminderModel {
    Window {
        start: NaiveTime,
        end: NaiveTime,
        every_seconds: i64,
        summary: String,
    },
    Medications {
        entries: Vec<MedicationEntryModel>,
    },
    Meals {
        entries: Vec<MealEntryModel>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct MedicationEntryModel {
    pub id: EntryId,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time: NaiveTime,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct MealEntryModel {
    pub id: EntryId,
    pub label: String,
    pub time: NaiveTime,
}

impl From<StoredReminder> for StoredReminderModel {
    fn from(value: StoredReminder) -> Self {
        match value {
            StoredReminder::Window { spec, summary } => StoredReminderModel::Window {
                start: spec.start.time(),
                end: spec.end.time(),
                every_seconds: spec.every.num_seconds(),
                summary,
            },
            StoredReminder::Medications { entries } => StoredReminderModel::Medications {
                entries: entries
                    .into_iter()
                    .map(|entry| MedicationEntryModel {
                        id: entry.id,
                        name: entry.name,
                        notes: entry.notes,
                        start_date: entry.start_date,
                        end_date: entry.end_date,
                        time: entry.time.time(),
                        is_active: entry.is_active,
                    })
                    .collect(),
            },
            StoredReminder::Meals { entries } => StoredReminderModel::Meals {
                entries: entries
                    .into_iter()
                    .map(|entry| MealEntryModel {
                        id: entry.id,
                        label: entry.label,
                        time: entry.time.time(),
                    })
                    .collect(),
            },
        }
    }
}

impl From<StoredReminderModel> for StoredReminder {
    fn from(value: StoredReminderModel) -> Self {
        match value {
            StoredReminderModel::Window {
                start,
                end,
                every_seconds,
                summary,
            } => StoredReminder::Window {
                spec: IntervalWindow {
                    start: ReminderFireTime::new(start),
                    end: ReminderFireTime::new(end),
                    every: TimeDelta::seconds(every_seconds),
                },
                summary,
            },
            StoredReminderModel::Medications { entries } => StoredReminder::Medications {
                entries: entries
                    .into_iter()
                    .map(|entry| MedicationEntry {
                        id: entry.id,
                        name: entry.name,
                        notes: entry.notes,
                        start_date: entry.start_date,
                        end_date: entry.end_date,
                        time: ReminderFireTime::new(entry.time),
                        is_active: entry.is_active,
                    })
                    .collect(),
            },
            StoredReminderModel::Meals { entries } => StoredReminder::Meals {
                entries: entries
                    .into_iter()
                    .map(|entry| MealEntry {
                        id: entry.id,
                        label: entry.label,
                        time: ReminderFireTime::new(entry.time),
                    })
                    .collect(),
            },
        }
    }
}
