use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::reminder::ReminderCategory;

use super::{ReminderStore, StoreError, StoredReminder};

/// Volatile store, used by tests and as a stand-in while no durable backend
/// is wired up.
pub struct InMemoryReminderStore {
    store: RwLock<HashMap<ReminderCategory, StoredReminder>>,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryReminderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn get(&self, category: ReminderCategory) -> Result<Option<StoredReminder>, StoreError> {
        let store = self.store.read().await;
        Ok(store.get(&category).cloned())
    }

    async fn put(
        &self,
        category: ReminderCategory,
        reminder: StoredReminder,
    ) -> Result<(), StoreError> {
        let mut store = self.store.write().await;
        store.insert(category, reminder);
        Ok(())
    }

    async fn remove(&self, category: ReminderCategory) -> Result<(), StoreError> {
        let mut store = self.store.write().await;
        store.remove(&category);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeDelta};

    use crate::reminder::{IntervalWindow, ReminderFireTime};

    use super::*;

    fn water_reminder() -> StoredReminder {
        StoredReminder::Window {
            spec: IntervalWindow {
                start: ReminderFireTime::new(NaiveTime::from_hms_opt(6, 0, 0).unwrap()),
                end: ReminderFireTime::new(NaiveTime::from_hms_opt(22, 0, 0).unwrap()),
                every: TimeDelta::minutes(30),
            },
            summary: "6:00 AM - 10:00 PM".to_owned(),
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_the_reminder() {
        let store = InMemoryReminderStore::new();

        store
            .put(ReminderCategory::Water, water_reminder())
            .await
            .unwrap();

        let stored = store.get(ReminderCategory::Water).await.unwrap();
        assert!(matches!(stored, Some(StoredReminder::Window { .. })));
    }

    #[tokio::test]
    async fn categories_do_not_leak_into_each_other() {
        let store = InMemoryReminderStore::new();

        store
            .put(ReminderCategory::Water, water_reminder())
            .await
            .unwrap();

        let stored = store.get(ReminderCategory::Medication).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn remove_clears_the_category() {
        let store = InMemoryReminderStore::new();

        store
            .put(ReminderCategory::Water, water_reminder())
            .await
            .unwrap();
        store.remove(ReminderCategory::Water).await.unwrap();

        let stored = store.get(ReminderCategory::Water).await.unwrap();
        assert!(stored.is_none());
    }
}
