use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::reminder::{EntryId, ReminderCategory};
use crate::scheduling::PENDING_NOTIFICATION_CEILING;

use super::{
    NotificationGateway, NotificationHandle, NotificationPayload, NotificationResponse,
    NotificationSink, SchedulingError,
};

struct ScheduledTask {
    task: JoinHandle<()>,
    cancellation_token: CancellationToken,
    category: ReminderCategory,
    entry_id: Option<EntryId>,
}

struct CleanupTask(watch::Sender<()>);

type TaskStore = RwLock<HashMap<u64, ScheduledTask>>;

/// In-process gateway implementation: each scheduled notification is a tokio
/// task sleeping until its instant, torn down through a cancellation token.
pub struct LocalNotificationGateway {
    tasks: Arc<TaskStore>,
    sink: Arc<dyn NotificationSink>,
    timezone: chrono_tz::Tz,
    permission_granted: AtomicBool,
    next_handle_id: AtomicU64,
    response_tx: mpsc::Sender<NotificationResponse>,
    response_rx: Mutex<Option<mpsc::Receiver<NotificationResponse>>>,
    cleanup_task: CleanupTask,
}

impl LocalNotificationGateway {
    pub fn new(sink: Arc<dyn NotificationSink>, timezone: chrono_tz::Tz) -> Self {
        let tasks = Arc::new(RwLock::new(HashMap::new()));
        let cleanup_task = Self::spawn_cleanup_task(Arc::clone(&tasks));
        let (response_tx, response_rx) = mpsc::channel(64);

        Self {
            tasks,
            sink,
            timezone,
            permission_granted: AtomicBool::new(true),
            next_handle_id: AtomicU64::new(0),
            response_tx,
            response_rx: Mutex::new(Some(response_rx)),
            cleanup_task,
        }
    }

    /// Simulates the host permission prompt outcome.
    pub fn set_permission(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    /// Host glue: forwards a user's interaction with a delivered
    /// notification into the response stream.
    pub async fn push_response(&self, response: NotificationResponse) {
        if self.response_tx.send(response).await.is_err() {
            log::warn!("Notification response dropped, stream receiver is gone");
        }
    }

    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }

    fn spawn_cleanup_task(tasks: Arc<TaskStore>) -> CleanupTask {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        task::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(300)) => {
                        Self::clean_finished_tasks(&tasks).await;
                    }
                    _ = shutdown_rx.changed() => {
                        log::info!("Notification cleanup task shutting down");
                        break;
                    }
                };
            }
        });

        CleanupTask(shutdown_tx)
    }

    async fn clean_finished_tasks(tasks: &TaskStore) {
        let mut tasks = tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, handle| !handle.task.is_finished());
        let after = tasks.len();

        if before != after {
            log::info!("Cleaned up {} delivered notification tasks", before - after);
        }
    }

    async fn cancel_matching(&self, filter: impl Fn(&ScheduledTask) -> bool) -> usize {
        let mut tasks = self.tasks.write().await;
        let ids: Vec<u64> = tasks
            .iter()
            .filter(|(_, task)| filter(task))
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            if let Some(task) = tasks.remove(id) {
                task.cancellation_token.cancel();
            }
        }

        ids.len()
    }
}

impl Drop for LocalNotificationGateway {
    fn drop(&mut self) {
        let _ = self.cleanup_task.0.send(());
    }
}

#[async_trait]
impl NotificationGateway for LocalNotificationGateway {
    async fn request_permission(&self) -> bool {
        self.permission_granted.load(Ordering::SeqCst)
    }

    async fn schedule_at(
        &self,
        instant: NaiveDateTime,
        payload: NotificationPayload,
    ) -> Result<NotificationHandle, SchedulingError> {
        if !self.permission_granted.load(Ordering::SeqCst) {
            return Err(SchedulingError::PermissionRevoked);
        }

        let delay = (instant - self.now())
            .to_std()
            .map_err(|_| SchedulingError::InstantInPast(instant))?;

        let mut tasks = self.tasks.write().await;
        let pending = tasks.values().filter(|t| !t.task.is_finished()).count();
        if pending >= PENDING_NOTIFICATION_CEILING {
            return Err(SchedulingError::CeilingReached);
        }

        let id = self.next_handle_id.fetch_add(1, Ordering::SeqCst);
        let category = payload.category;
        let entry_id = payload.entry_id;

        let cancellation_token = CancellationToken::new();
        let task_token = cancellation_token.child_token();
        let sink = Arc::clone(&self.sink);
        let task = task::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    log::debug!("Notification task cancelled before firing. [category = {}]", payload.category);
                }
                _ = tokio::time::sleep(delay) => {
                    sink.deliver(&payload).await;
                }
            }
        });

        log::info!(
            "[SCHEDULE] Notification in {:?}. [category = {category}, handle = {id}]",
            delay
        );

        tasks.insert(
            id,
            ScheduledTask {
                task,
                cancellation_token,
                category,
                entry_id,
            },
        );

        Ok(NotificationHandle(id))
    }

    async fn cancel_category(&self, category: ReminderCategory) {
        let cancelled = self.cancel_matching(|task| task.category == category).await;
        log::info!("[CANCEL] {cancelled} pending notifications. [category = {category}]");
    }

    async fn cancel_entry(&self, category: ReminderCategory, entry_id: EntryId) {
        let cancelled = self
            .cancel_matching(|task| task.category == category && task.entry_id == Some(entry_id))
            .await;
        log::info!(
            "[CANCEL] {cancelled} pending notifications. [category = {category}, entry = {entry_id}]"
        );
    }

    async fn cancel_all(&self) {
        let cancelled = self.cancel_matching(|_| true).await;
        log::info!("[CANCEL] {cancelled} pending notifications across all categories");
    }

    async fn pending_count(&self) -> usize {
        let tasks = self.tasks.read().await;
        tasks.values().filter(|t| !t.task.is_finished()).count()
    }

    async fn take_response_stream(&self) -> Option<mpsc::Receiver<NotificationResponse>> {
        self.response_rx.lock().await.take()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use chrono::TimeDelta;
    use proptest::prelude::*;
    use test_strategy::proptest;

    use crate::notify::ResponseAction;

    use super::*;

    type Delivered = Arc<StdMutex<Vec<NotificationPayload>>>;

    struct TestSink {
        delivered: Delivered,
    }

    #[async_trait]
    impl NotificationSink for TestSink {
        async fn deliver(&self, payload: &NotificationPayload) {
            self.delivered.lock().unwrap().push(payload.clone());
        }
    }

    struct TestContext {
        delivered: Delivered,
        gateway: LocalNotificationGateway,
    }

    impl TestContext {
        fn new() -> Self {
            let delivered: Delivered = Arc::new(StdMutex::new(Vec::new()));
            let sink = Arc::new(TestSink {
                delivered: Arc::clone(&delivered),
            });
            let gateway = LocalNotificationGateway::new(sink, chrono_tz::UTC);

            Self { delivered, gateway }
        }
    }

    fn payload(category: ReminderCategory, entry_id: Option<EntryId>) -> NotificationPayload {
        NotificationPayload {
            title: category.to_string(),
            body: "test".to_owned(),
            sound: true,
            category,
            entry_id,
        }
    }

    fn in_minutes(minutes: i64) -> NaiveDateTime {
        Utc::now().naive_utc() + TimeDelta::minutes(minutes)
    }

    async fn wait(minutes: i64) {
        tokio::time::sleep(Duration::from_secs((minutes * 60) as u64 + 5)).await;
    }

    fn tokio_ct(
        future: impl std::future::Future<Output = Result<(), TestCaseError>>,
    ) -> Result<(), TestCaseError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap()
            .block_on(future)
    }

    #[proptest(async = tokio_ct)]
    async fn any_future_instant_is_delivered_exactly_once(#[strategy(1i64..720)] minutes: i64) {
        let ctx = TestContext::new();

        ctx.gateway
            .schedule_at(in_minutes(minutes), payload(ReminderCategory::Water, None))
            .await
            .unwrap();

        wait(minutes).await;

        prop_assert_eq!(ctx.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_notification_is_delivered_at_its_instant() {
        let ctx = TestContext::new();

        ctx.gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::Water, None))
            .await
            .unwrap();

        wait(30).await;

        let delivered = ctx.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].category, ReminderCategory::Water);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_category_never_fires() {
        let ctx = TestContext::new();

        ctx.gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::Water, None))
            .await
            .unwrap();
        ctx.gateway.cancel_category(ReminderCategory::Water).await;

        wait(30).await;

        assert!(ctx.delivered.lock().unwrap().is_empty());
        assert_eq!(ctx.gateway.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_one_category_leaves_the_other_pending() {
        let ctx = TestContext::new();

        ctx.gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::Water, None))
            .await
            .unwrap();
        ctx.gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::Medication, Some(1)))
            .await
            .unwrap();

        ctx.gateway.cancel_category(ReminderCategory::Water).await;

        wait(30).await;

        let delivered = ctx.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].category, ReminderCategory::Medication);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_entry_only_touches_that_entry() {
        let ctx = TestContext::new();

        ctx.gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::MealTime, Some(1)))
            .await
            .unwrap();
        ctx.gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::MealTime, Some(2)))
            .await
            .unwrap();

        ctx.gateway.cancel_entry(ReminderCategory::MealTime, 1).await;

        wait(30).await;

        let delivered = ctx.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].entry_id, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_every_category() {
        let ctx = TestContext::new();

        ctx.gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::Water, None))
            .await
            .unwrap();
        ctx.gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::Medication, Some(1)))
            .await
            .unwrap();
        ctx.gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::MealTime, Some(1)))
            .await
            .unwrap();

        ctx.gateway.cancel_all().await;

        wait(30).await;

        assert!(ctx.delivered.lock().unwrap().is_empty());
        assert_eq!(ctx.gateway.pending_count().await, 0);
    }

    #[tokio::test]
    async fn ceiling_is_enforced() {
        let ctx = TestContext::new();

        for _ in 0..PENDING_NOTIFICATION_CEILING {
            ctx.gateway
                .schedule_at(in_minutes(600), payload(ReminderCategory::Water, None))
                .await
                .unwrap();
        }

        let overflow = ctx
            .gateway
            .schedule_at(in_minutes(600), payload(ReminderCategory::Water, None))
            .await;

        assert_eq!(overflow, Err(SchedulingError::CeilingReached));
        assert_eq!(ctx.gateway.pending_count().await, PENDING_NOTIFICATION_CEILING);
    }

    #[tokio::test]
    async fn past_instant_is_rejected() {
        let ctx = TestContext::new();

        let result = ctx
            .gateway
            .schedule_at(in_minutes(-5), payload(ReminderCategory::Water, None))
            .await;

        assert!(matches!(result, Err(SchedulingError::InstantInPast(_))));
    }

    #[tokio::test]
    async fn revoked_permission_rejects_scheduling() {
        let ctx = TestContext::new();
        ctx.gateway.set_permission(false);

        assert!(!ctx.gateway.request_permission().await);
        let result = ctx
            .gateway
            .schedule_at(in_minutes(30), payload(ReminderCategory::Water, None))
            .await;

        assert_eq!(result, Err(SchedulingError::PermissionRevoked));
    }

    #[tokio::test]
    async fn pushed_responses_reach_the_stream() {
        let ctx = TestContext::new();
        let mut rx = ctx.gateway.take_response_stream().await.unwrap();

        ctx.gateway
            .push_response(NotificationResponse {
                category: ReminderCategory::Water,
                entry_id: None,
                action: ResponseAction::Snooze,
            })
            .await;

        let response = rx.recv().await.unwrap();
        assert_eq!(response.action, ResponseAction::Snooze);

        assert!(ctx.gateway.take_response_stream().await.is_none());
    }
}
