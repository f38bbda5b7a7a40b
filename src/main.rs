use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;

use remindful::appsettings;
use remindful::controller::{ControllerOptions, ReminderController};
use remindful::notify::{
    LocalNotificationGateway, NotificationGateway, NotificationPayload, NotificationSink,
};
use remindful::storage::JsonFileReminderStore;

/// Demo sink: where a mobile host would hand the payload to the OS
/// notification center, the binary writes it to the log.
struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, payload: &NotificationPayload) {
        log::info!("[{}] {}: {}", payload.category, payload.title, payload.body);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = appsettings::get();
    let timezone: chrono_tz::Tz = settings.timezone.parse().map_err(|err| {
        anyhow::anyhow!("invalid timezone {:?} in settings: {err}", settings.timezone)
    })?;

    let gateway = Arc::new(LocalNotificationGateway::new(Arc::new(LogSink), timezone));
    let store = Arc::new(JsonFileReminderStore::new(&settings.store_path));
    let controller = Arc::new(ReminderController::new(
        store,
        Arc::clone(&gateway) as Arc<dyn NotificationGateway>,
        ControllerOptions {
            timezone,
            snooze: TimeDelta::minutes(settings.notifications.snooze_minutes as i64),
            sound: settings.notifications.sound,
        },
    ));

    if !controller.request_permission().await {
        log::warn!("Running without notification permission, reminders will only be saved");
    }

    let restored = controller.restore().await;
    log::info!("Restored {restored} scheduled notifications from the reminder store");

    let _response_worker = match gateway.take_response_stream().await {
        Some(responses) => Some(controller.spawn_response_worker(responses)),
        None => None,
    };

    log::info!("Reminder core running, press Ctrl-C to exit");
    tokio::signal::ctrl_c().await?;

    Ok(())
}
