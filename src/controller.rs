//! Orchestrates compile, cancel, schedule and persist for each reminder
//! category, and recovers every component error into a single user-facing
//! outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{NaiveDateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{self, JoinHandle};

use crate::clock;
use crate::notify::{
    NotificationGateway, NotificationPayload, NotificationResponse, ResponseAction,
};
use crate::reminder::{
    DateRangeDaily, EntryId, IntervalWindow, LabeledInstant, MealEntry, MedicationEntry,
    ReminderCategory, ReminderSpec, SpecError,
};
use crate::scheduling::{PENDING_NOTIFICATION_CEILING, compile};
use crate::storage::{ReminderStore, StoreError, StoredReminder};

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub timezone: chrono_tz::Tz,
    pub snooze: TimeDelta,
    pub sound: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            snooze: TimeDelta::minutes(5),
            sound: true,
        }
    }
}

/// Outcome of a successful `add`: what to show the user, and how much of the
/// batch actually made it to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddReceipt {
    pub summary: String,
    pub scheduled: usize,
    pub failed: usize,
    pub truncated: bool,
    /// When false the reminder is persisted but will not fire until the user
    /// grants notification permission.
    pub permission_granted: bool,
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("this spec shape cannot be added to the {0} category")]
    KindMismatch(ReminderCategory),

    #[error("the schedule has no future trigger instants")]
    EmptySchedule,

    #[error("the {0} category has no entry list")]
    NotAList(ReminderCategory),

    #[error("no entry {entry_id} in the {category} list")]
    NoSuchEntry {
        category: ReminderCategory,
        entry_id: EntryId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ReminderController {
    store: Arc<dyn ReminderStore>,
    gateway: Arc<dyn NotificationGateway>,
    options: ControllerOptions,
    permission_granted: AtomicBool,
    // One lock per category so two adds for the same category never
    // interleave their cancel/schedule/persist sequences.
    locks: HashMap<ReminderCategory, Mutex<()>>,
}

impl ReminderController {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        gateway: Arc<dyn NotificationGateway>,
        options: ControllerOptions,
    ) -> Self {
        let locks = ReminderCategory::ALL
            .into_iter()
            .map(|category| (category, Mutex::new(())))
            .collect();

        Self {
            store,
            gateway,
            options,
            permission_granted: AtomicBool::new(false),
            locks,
        }
    }

    /// Asks the platform for notification permission once, at screen mount.
    /// A denial is remembered and reported on every receipt, not swallowed.
    pub async fn request_permission(&self) -> bool {
        let granted = self.gateway.request_permission().await;
        self.permission_granted.store(granted, Ordering::SeqCst);
        if !granted {
            log::warn!("Notification permission denied, reminders will be saved but will not fire");
        }

        granted
    }

    pub async fn add(
        &self,
        category: ReminderCategory,
        spec: ReminderSpec,
    ) -> Result<AddReceipt, ReminderError> {
        let _guard = self.lock(category).lock().await;
        let now = self.now();

        match (category, spec) {
            (ReminderCategory::Water, ReminderSpec::IntervalWindow(window)) => {
                self.add_water(window, now).await
            }
            (ReminderCategory::Medication, ReminderSpec::DateRangeDaily(range)) => {
                self.add_medication(range, now).await
            }
            (ReminderCategory::MealTime, ReminderSpec::LabeledInstant(labeled)) => {
                self.add_meal(labeled, now).await
            }
            _ => Err(ReminderError::KindMismatch(category)),
        }
    }

    /// Cancels the category's outstanding batch and forgets its persisted
    /// spec. The reverse of `add`.
    pub async fn remove(&self, category: ReminderCategory) -> Result<(), ReminderError> {
        let _guard = self.lock(category).lock().await;

        self.gateway.cancel_category(category).await;
        self.store.remove(category).await?;
        log::info!("[REMOVE] Cleared reminder. [category = {category}]");

        Ok(())
    }

    /// Drops a single meal-time entry, cancelling only that entry's pending
    /// notification and leaving its siblings untouched.
    pub async fn remove_one(
        &self,
        category: ReminderCategory,
        entry_id: EntryId,
    ) -> Result<(), ReminderError> {
        if category != ReminderCategory::MealTime {
            return Err(ReminderError::NotAList(category));
        }
        let _guard = self.lock(category).lock().await;

        let mut entries = match self.store.get(category).await? {
            Some(StoredReminder::Meals { entries }) => entries,
            _ => Vec::new(),
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != entry_id);
        if entries.len() == before {
            return Err(ReminderError::NoSuchEntry { category, entry_id });
        }

        self.gateway.cancel_entry(category, entry_id).await;
        if entries.is_empty() {
            self.store.remove(category).await?;
        } else {
            self.store
                .put(category, StoredReminder::Meals { entries })
                .await?;
        }
        log::info!("[REMOVE] Dropped entry. [category = {category}, entry = {entry_id}]");

        Ok(())
    }

    /// Flips a medication entry's active flag and returns the new value.
    /// Does not touch the outstanding batch; an inactive entry is excluded
    /// from the next compile (the next `add` or `restore`).
    pub async fn toggle_active(
        &self,
        category: ReminderCategory,
        entry_id: EntryId,
    ) -> Result<bool, ReminderError> {
        if category != ReminderCategory::Medication {
            return Err(ReminderError::NotAList(category));
        }
        let _guard = self.lock(category).lock().await;

        let mut entries = match self.store.get(category).await? {
            Some(StoredReminder::Medications { entries }) => entries,
            _ => Vec::new(),
        };
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == entry_id)
            .ok_or(ReminderError::NoSuchEntry { category, entry_id })?;
        entry.is_active = !entry.is_active;
        let is_active = entry.is_active;

        self.store
            .put(category, StoredReminder::Medications { entries })
            .await?;
        log::info!(
            "[TOGGLE] Entry is now {}. [category = {category}, entry = {entry_id}]",
            if is_active { "active" } else { "inactive" }
        );

        Ok(is_active)
    }

    /// Recompiles every persisted spec and reschedules its batch. Called at
    /// startup; the platform queue does not survive a device restart, the
    /// specs do. Failures are logged per category and never abort the rest.
    pub async fn restore(&self) -> usize {
        let mut total = 0;

        for category in ReminderCategory::ALL {
            let _guard = self.lock(category).lock().await;
            let now = self.now();

            let stored = match self.store.get(category).await {
                Ok(Some(stored)) => stored,
                Ok(None) => continue,
                Err(err) => {
                    log::error!("[RESTORE] Could not read store. [category = {category}]: {err}");
                    continue;
                }
            };

            self.gateway.cancel_category(category).await;
            let scheduled = match stored {
                StoredReminder::Window { spec, .. } => self.restore_window(spec, now).await,
                StoredReminder::Medications { entries } => {
                    self.restore_medications(&entries, now).await
                }
                StoredReminder::Meals { entries } => self.restore_meals(&entries, now).await,
            };

            log::info!("[RESTORE] Rescheduled {scheduled} notifications. [category = {category}]");
            total += scheduled;
        }

        total
    }

    /// Consumes the gateway's response stream; a snooze schedules a single
    /// one-shot a few minutes out.
    pub fn spawn_response_worker(
        self: &Arc<Self>,
        mut responses: mpsc::Receiver<NotificationResponse>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        task::spawn(async move {
            while let Some(response) = responses.recv().await {
                controller.handle_response(response).await;
            }
            log::info!("Notification response stream closed");
        })
    }

    pub async fn handle_response(&self, response: NotificationResponse) {
        match response.action {
            ResponseAction::Snooze => {
                let instant = self.now() + self.options.snooze;
                let payload = self.snooze_payload(response.category, response.entry_id);
                match self.gateway.schedule_at(instant, payload).await {
                    Ok(_) => log::info!(
                        "[SNOOZE] Rescheduled for {instant}. [category = {}]",
                        response.category
                    ),
                    Err(err) => log::warn!(
                        "[SNOOZE] Could not reschedule. [category = {}]: {err}",
                        response.category
                    ),
                }
            }
            ResponseAction::Dismiss => {
                log::debug!("Notification dismissed. [category = {}]", response.category);
            }
        }
    }

    async fn add_water(
        &self,
        window: IntervalWindow,
        now: NaiveDateTime,
    ) -> Result<AddReceipt, ReminderError> {
        let compiled = compile(&ReminderSpec::IntervalWindow(window.clone()), now)?;
        if compiled.is_empty() {
            return Err(ReminderError::EmptySchedule);
        }

        self.gateway.cancel_category(ReminderCategory::Water).await;
        let payload = self.water_payload();
        let batch: Vec<_> = compiled
            .instants
            .iter()
            .map(|instant| (*instant, payload.clone()))
            .collect();
        let (scheduled, failed) = self.schedule_batch(&batch).await;

        let (start, end) = compiled
            .window
            .expect("interval windows always resolve a window");
        let summary = clock::window_summary(start.time(), end.time());
        self.store
            .put(
                ReminderCategory::Water,
                StoredReminder::Window {
                    spec: window,
                    summary: summary.clone(),
                },
            )
            .await?;

        log::info!("[ADD] Scheduled {scheduled} notifications. [category = Water]");
        Ok(self.receipt(summary, scheduled, failed, compiled.truncated))
    }

    async fn add_medication(
        &self,
        range: DateRangeDaily,
        now: NaiveDateTime,
    ) -> Result<AddReceipt, ReminderError> {
        // Compile the new entry alone first so a fully-past course is
        // reported without disturbing the entries already scheduled.
        let solo = compile(&ReminderSpec::DateRangeDaily(range.clone()), now)?;
        if solo.is_empty() {
            return Err(ReminderError::EmptySchedule);
        }

        let mut entries = match self.store.get(ReminderCategory::Medication).await? {
            Some(StoredReminder::Medications { entries }) => entries,
            _ => Vec::new(),
        };
        let id = next_entry_id(entries.iter().map(|entry| entry.id));
        entries.push(MedicationEntry {
            id,
            name: range.subject.clone(),
            notes: range.notes.clone(),
            start_date: range.start_date,
            end_date: range.end_date,
            time: range.time,
            is_active: true,
        });

        let (instants, truncated) = compile_active_medications(&entries, now)?;
        self.gateway
            .cancel_category(ReminderCategory::Medication)
            .await;
        let batch: Vec<_> = instants
            .iter()
            .map(|(instant, entry_id)| {
                let entry = entries
                    .iter()
                    .find(|entry| entry.id == *entry_id)
                    .expect("batch instants only reference entries in the list");
                (*instant, self.medication_payload(entry))
            })
            .collect();
        let (scheduled, failed) = self.schedule_batch(&batch).await;

        let summary = format!(
            "{}, {} - {}",
            clock::format_twelve_hour(range.time.time()),
            clock::date_key(range.start_date),
            clock::date_key(range.end_date),
        );
        self.store
            .put(
                ReminderCategory::Medication,
                StoredReminder::Medications { entries },
            )
            .await?;

        log::info!("[ADD] Scheduled {scheduled} notifications. [category = Medication]");
        Ok(self.receipt(summary, scheduled, failed, truncated))
    }

    async fn add_meal(
        &self,
        labeled: LabeledInstant,
        now: NaiveDateTime,
    ) -> Result<AddReceipt, ReminderError> {
        let compiled = compile(&ReminderSpec::LabeledInstant(labeled.clone()), now)?;

        let mut entries = match self.store.get(ReminderCategory::MealTime).await? {
            Some(StoredReminder::Meals { entries }) => entries,
            _ => Vec::new(),
        };
        let id = next_entry_id(entries.iter().map(|entry| entry.id));
        let entry = MealEntry {
            id,
            label: labeled.label.clone(),
            time: labeled.time,
        };

        // Entries are independent one-shots; siblings keep their schedules.
        let payload = self.meal_payload(&entry);
        let batch: Vec<_> = compiled
            .instants
            .iter()
            .map(|instant| (*instant, payload.clone()))
            .collect();
        let (scheduled, failed) = self.schedule_batch(&batch).await;

        let summary = format!(
            "{} at {}",
            entry.label,
            clock::format_twelve_hour(entry.time.time())
        );
        entries.push(entry);
        self.store
            .put(ReminderCategory::MealTime, StoredReminder::Meals { entries })
            .await?;

        log::info!("[ADD] Scheduled {scheduled} notifications. [category = Meal time]");
        Ok(self.receipt(summary, scheduled, failed, compiled.truncated))
    }

    async fn restore_window(&self, spec: IntervalWindow, now: NaiveDateTime) -> usize {
        let compiled = match compile(&ReminderSpec::IntervalWindow(spec), now) {
            Ok(compiled) => compiled,
            Err(err) => {
                log::warn!("[RESTORE] Stored water spec no longer compiles: {err}");
                return 0;
            }
        };
        let payload = self.water_payload();
        let batch: Vec<_> = compiled
            .instants
            .iter()
            .map(|instant| (*instant, payload.clone()))
            .collect();
        self.schedule_batch(&batch).await.0
    }

    async fn restore_medications(&self, entries: &[MedicationEntry], now: NaiveDateTime) -> usize {
        let (instants, _) = match compile_active_medications(entries, now) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("[RESTORE] Stored medication list no longer compiles: {err}");
                return 0;
            }
        };
        let batch: Vec<_> = instants
            .iter()
            .map(|(instant, entry_id)| {
                let entry = entries
                    .iter()
                    .find(|entry| entry.id == *entry_id)
                    .expect("batch instants only reference entries in the list");
                (*instant, self.medication_payload(entry))
            })
            .collect();
        self.schedule_batch(&batch).await.0
    }

    async fn restore_meals(&self, entries: &[MealEntry], now: NaiveDateTime) -> usize {
        let batch: Vec<_> = entries
            .iter()
            .map(|entry| {
                let instant = crate::scheduling::next_occurrence(entry.time.time(), now);
                (instant, self.meal_payload(entry))
            })
            .collect();
        self.schedule_batch(&batch).await.0
    }

    /// Schedules every instant of a batch, counting failures instead of
    /// aborting: a rejected instant must not take the rest down with it.
    async fn schedule_batch(&self, batch: &[(NaiveDateTime, NotificationPayload)]) -> (usize, usize) {
        let mut scheduled = 0;
        let mut failed = 0;
        for (instant, payload) in batch {
            match self.gateway.schedule_at(*instant, payload.clone()).await {
                Ok(_) => scheduled += 1,
                Err(err) => {
                    failed += 1;
                    log::warn!(
                        "Platform rejected notification at {instant}. [category = {}]: {err}",
                        payload.category
                    );
                }
            }
        }

        (scheduled, failed)
    }

    fn receipt(&self, summary: String, scheduled: usize, failed: usize, truncated: bool) -> AddReceipt {
        AddReceipt {
            summary,
            scheduled,
            failed,
            truncated,
            permission_granted: self.permission_granted.load(Ordering::SeqCst),
        }
    }

    fn lock(&self, category: ReminderCategory) -> &Mutex<()> {
        self.locks
            .get(&category)
            .expect("every category has a lock")
    }

    fn now(&self) -> NaiveDateTime {
        Utc::now()
            .with_timezone(&self.options.timezone)
            .naive_local()
    }

    fn water_payload(&self) -> NotificationPayload {
        NotificationPayload {
            title: "Water".to_owned(),
            body: "Time to drink some water".to_owned(),
            sound: self.options.sound,
            category: ReminderCategory::Water,
            entry_id: None,
        }
    }

    fn medication_payload(&self, entry: &MedicationEntry) -> NotificationPayload {
        let body = if entry.notes.is_empty() {
            format!("Time to take {}", entry.name)
        } else {
            format!("Time to take {} ({})", entry.name, entry.notes)
        };

        NotificationPayload {
            title: "Medication".to_owned(),
            body,
            sound: self.options.sound,
            category: ReminderCategory::Medication,
            entry_id: Some(entry.id),
        }
    }

    fn meal_payload(&self, entry: &MealEntry) -> NotificationPayload {
        NotificationPayload {
            title: "Meal time".to_owned(),
            body: format!("Time for {}", entry.label),
            sound: self.options.sound,
            category: ReminderCategory::MealTime,
            entry_id: Some(entry.id),
        }
    }

    fn snooze_payload(
        &self,
        category: ReminderCategory,
        entry_id: Option<EntryId>,
    ) -> NotificationPayload {
        NotificationPayload {
            title: category.to_string(),
            body: "Snoozed reminder".to_owned(),
            sound: self.options.sound,
            category,
            entry_id,
        }
    }
}

fn next_entry_id(ids: impl Iterator<Item = EntryId>) -> EntryId {
    ids.max().unwrap_or(0) + 1
}

/// Union batch over the active medication entries: sorted, deduplicated and
/// cut off at the ceiling so the whole category still fits one batch.
fn compile_active_medications(
    entries: &[MedicationEntry],
    now: NaiveDateTime,
) -> Result<(Vec<(NaiveDateTime, EntryId)>, bool), SpecError> {
    let mut instants = Vec::new();
    let mut truncated = false;

    for entry in entries.iter().filter(|entry| entry.is_active) {
        let compiled = compile(&ReminderSpec::DateRangeDaily(entry.to_spec()), now)?;
        truncated |= compiled.truncated;
        instants.extend(
            compiled
                .instants
                .into_iter()
                .map(|instant| (instant, entry.id)),
        );
    }

    instants.sort_unstable();
    instants.dedup();
    if instants.len() > PENDING_NOTIFICATION_CEILING {
        instants.truncate(PENDING_NOTIFICATION_CEILING);
        truncated = true;
    }

    Ok((instants, truncated))
}
