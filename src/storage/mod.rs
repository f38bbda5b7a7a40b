mod json_file;
mod memory;
mod model;

pub use json_file::JsonFileReminderStore;
pub use memory::InMemoryReminderStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::reminder::{IntervalWindow, MealEntry, MedicationEntry, ReminderCategory};

/// What the user asked for, persisted per category. Trigger instants are
/// never stored; they are regenerated from the spec on every recompile.
#[derive(Debug, Clone)]
pub enum StoredReminder {
    /// Water screen: a single interval-window spec plus its display summary.
    Window { spec: IntervalWindow, summary: String },
    /// Medication screen: a list of date-range entries, each independently
    /// toggleable.
    Medications { entries: Vec<MedicationEntry> },
    /// Meal-time screen: a list of labeled one-shot entries.
    Meals { entries: Vec<MealEntry> },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access the reminder store: {0}")]
    Io(#[from] std::io::Error),

    #[error("reminder store contents are corrupted: {0}")]
    Corrupted(#[from] serde_json::Error),
}

#[async_trait]
pub trait ReminderStore: Send + Sync + 'static {
    async fn get(&self, category: ReminderCategory) -> Result<Option<StoredReminder>, StoreError>;
    async fn put(
        &self,
        category: ReminderCategory,
        reminder: StoredReminder,
    ) -> Result<(), StoreError>;
    async fn remove(&self, category: ReminderCategory) -> Result<(), StoreError>;
}
