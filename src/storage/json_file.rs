use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::reminder::ReminderCategory;

use super::model::StoreFileModel;
use super::{ReminderStore, StoreError, StoredReminder};

/// Durable store backed by a single JSON file. Every operation rewrites the
/// whole file; fine at three categories and a handful of entries.
pub struct JsonFileReminderStore {
    path: PathBuf,
    // Serializes read-modify-write cycles against the file.
    write_lock: Mutex<()>,
}

impl JsonFileReminderStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<StoreFileModel, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StoreFileModel::default()),
            Err(err) => return Err(err.into()),
        };

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, model: &StoreFileModel) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(model)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ReminderStore for JsonFileReminderStore {
    async fn get(&self, category: ReminderCategory) -> Result<Option<StoredReminder>, StoreError> {
        let mut model = self.load().await?;
        Ok(model.reminders.remove(category.key()).map(Into::into))
    }

    async fn put(
        &self,
        category: ReminderCategory,
        reminder: StoredReminder,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut model = self.load().await?;
        model
            .reminders
            .insert(category.key().to_owned(), reminder.into());
        self.save(&model).await
    }

    async fn remove(&self, category: ReminderCategory) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut model = self.load().await?;
        model.reminders.remove(category.key());
        self.save(&model).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeDelta};

    use crate::reminder::{IntervalWindow, MedicationEntry, ReminderFireTime};

    use super::*;

    fn fire_time(hour: u32, minute: u32) -> ReminderFireTime {
        ReminderFireTime::new(NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
    }

    fn water_reminder() -> StoredReminder {
        StoredReminder::Window {
            spec: IntervalWindow {
                start: fire_time(6, 0),
                end: fire_time(22, 0),
                every: TimeDelta::minutes(90),
            },
            summary: "6:00 AM - 10:00 PM".to_owned(),
        }
    }

    fn medication_reminder() -> StoredReminder {
        StoredReminder::Medications {
            entries: vec![MedicationEntry {
                id: 1,
                name: "Amoxicillin".to_owned(),
                notes: "After food".to_owned(),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
                time: fire_time(8, 0),
                is_active: true,
            }],
        }
    }

    #[tokio::test]
    async fn reminders_survive_a_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.json");

        let store = JsonFileReminderStore::new(&path);
        store
            .put(ReminderCategory::Water, water_reminder())
            .await
            .unwrap();
        store
            .put(ReminderCategory::Medication, medication_reminder())
            .await
            .unwrap();
        drop(store);

        let reopened = JsonFileReminderStore::new(&path);
        let water = reopened.get(ReminderCategory::Water).await.unwrap();
        let medication = reopened.get(ReminderCategory::Medication).await.unwrap();

        match water {
            Some(StoredReminder::Window { spec, summary }) => {
                assert_eq!(spec.every, TimeDelta::minutes(90));
                assert_eq!(summary, "6:00 AM - 10:00 PM");
            }
            other => panic!("expected a window reminder, got {other:?}"),
        }
        match medication {
            Some(StoredReminder::Medications { entries }) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].name, "Amoxicillin");
                assert!(entries[0].is_active);
            }
            other => panic!("expected a medication list, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileReminderStore::new(dir.path().join("missing.json"));

        let stored = store.get(ReminderCategory::Water).await.unwrap();

        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn remove_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.json");

        let store = JsonFileReminderStore::new(&path);
        store
            .put(ReminderCategory::Water, water_reminder())
            .await
            .unwrap();
        store.remove(ReminderCategory::Water).await.unwrap();

        let reopened = JsonFileReminderStore::new(&path);
        let stored = reopened.get(ReminderCategory::Water).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn garbage_contents_surface_as_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.json");
        tokio::fs::write(&path, b"not json at all").await.unwrap();

        let store = JsonFileReminderStore::new(&path);
        let result = store.get(ReminderCategory::Water).await;

        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }
}
