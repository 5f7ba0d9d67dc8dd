pub mod types;

pub use types::{
    Clock, Host, Importance, Notification, NotificationAction, NotificationChannel,
    NotificationIcon, NotificationTag, Notifier, OverlaySurface, PackageInfo, PackageRegistry,
    RunStateIcon, SystemClock, SystemSettings, UsageEvent, UsageEventKind, UsageEventLog,
};

#[cfg(target_os = "linux")]
pub mod linux;

use crate::error::PlatformError;
use log::{debug, info};

/// Notifier for hosts without a notification daemon: renders to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn create_channel(&self, channel: &NotificationChannel) -> Result<(), PlatformError> {
        debug!("Notification channel '{}' ready ({:?})", channel.id, channel.importance);
        Ok(())
    }

    fn post(&self, id: u32, notification: &Notification) -> Result<(), PlatformError> {
        info!("[notification {id}] {}: {}", notification.title, notification.text);
        Ok(())
    }

    fn cancel(&self, id: u32) -> Result<(), PlatformError> {
        info!("[notification {id}] removed");
        Ok(())
    }
}
