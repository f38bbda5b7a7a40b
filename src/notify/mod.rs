mod local;

pub use local::LocalNotificationGateway;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::reminder::{EntryId, ReminderCategory};
use crate::scheduling::PENDING_NOTIFICATION_CEILING;

/// Opaque id for one scheduled notification. Invalidated wholesale by the
/// cancel operations; never tracked individually by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub sound: bool,
    /// Tags the handle so cancellation can be scoped to a category.
    pub category: ReminderCategory,
    pub entry_id: Option<EntryId>,
}

/// User interaction with a delivered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    Snooze,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResponse {
    pub category: ReminderCategory,
    pub entry_id: Option<EntryId>,
    pub action: ResponseAction,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("pending notification ceiling of {PENDING_NOTIFICATION_CEILING} reached")]
    CeilingReached,

    #[error("trigger instant {0} is not in the future")]
    InstantInPast(NaiveDateTime),

    #[error("notification permission has not been granted")]
    PermissionRevoked,
}

/// Contract the core needs from the platform notification service.
///
/// Cancellation is scoped: the payload's category/entry tags are the filter,
/// so clearing one category never clobbers another's pending batch.
#[async_trait]
pub trait NotificationGateway: Send + Sync + 'static {
    async fn request_permission(&self) -> bool;

    async fn schedule_at(
        &self,
        instant: NaiveDateTime,
        payload: NotificationPayload,
    ) -> Result<NotificationHandle, SchedulingError>;

    async fn cancel_category(&self, category: ReminderCategory);

    async fn cancel_entry(&self, category: ReminderCategory, entry_id: EntryId);

    async fn cancel_all(&self);

    async fn pending_count(&self) -> usize;

    /// Stream of user interactions with delivered notifications. Yields the
    /// receiver once; later calls return `None`.
    async fn take_response_stream(&self) -> Option<mpsc::Receiver<NotificationResponse>>;
}

/// Where delivered notifications end up. The host hands the payload to the
/// OS notification center; tests and the demo binary collect or log it.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(&self, payload: &NotificationPayload);
}
