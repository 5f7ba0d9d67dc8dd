use crate::error::PlatformError;
use std::sync::Arc;
use std::time::SystemTime;

/// Kind of an entry in the host's activity-usage log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageEventKind {
    Resumed,
    Paused,
    Stopped,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    pub kind: UsageEventKind,
    pub application: String,
    pub timestamp: SystemTime,
}

impl UsageEvent {
    pub fn new(kind: UsageEventKind, application: &str, timestamp: SystemTime) -> Self {
        Self {
            kind,
            application: application.to_string(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub identifier: String,
    pub is_system_app: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    Min,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub importance: Importance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationIcon {
    Lock,
    Hourglass,
}

/// Play/pause control glyph. `Running` shows the pause glyph, `Paused` the play glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStateIcon {
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    TogglePause,
    Stop,
    OpenApp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTag {
    pub text: String,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel_id: &'static str,
    pub title: String,
    pub text: String,
    pub icon: NotificationIcon,
    pub tag: Option<NotificationTag>,
    pub run_state: Option<RunStateIcon>,
    pub actions: Vec<NotificationAction>,
    pub ongoing: bool,
}

/// Time-ranged view of the host's usage-event log.
pub trait UsageEventLog: Send + Sync {
    /// Events with `begin <= timestamp <= end`, oldest first.
    fn query_events(&self, begin: SystemTime, end: SystemTime) -> Result<Vec<UsageEvent>, PlatformError>;
}

/// The single full-screen blocking surface.
pub trait OverlaySurface: Send + Sync {
    fn attach(&self) -> Result<(), PlatformError>;
    fn detach(&self) -> Result<(), PlatformError>;
}

pub trait PackageRegistry: Send + Sync {
    fn lookup(&self, identifier: &str) -> Result<PackageInfo, PlatformError>;
    /// Application currently holding the home/launcher role.
    fn home_package(&self) -> Option<String>;
}

pub trait Notifier: Send + Sync {
    fn create_channel(&self, channel: &NotificationChannel) -> Result<(), PlatformError>;
    /// Post or replace the notification with this id.
    fn post(&self, id: u32, notification: &Notification) -> Result<(), PlatformError>;
    fn cancel(&self, id: u32) -> Result<(), PlatformError>;
}

/// Permission checks, settings screens and app launching.
pub trait SystemSettings: Send + Sync {
    fn usage_access_granted(&self) -> bool;
    fn overlay_granted(&self) -> bool;
    fn open_usage_access_settings(&self) -> Result<(), PlatformError>;
    fn open_overlay_settings(&self) -> Result<(), PlatformError>;
    fn launch_app(&self, identifier: &str) -> Result<(), PlatformError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Every OS collaborator the core talks to.
#[derive(Clone)]
pub struct Host {
    pub usage_log: Arc<dyn UsageEventLog>,
    pub surface: Arc<dyn OverlaySurface>,
    pub registry: Arc<dyn PackageRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: Arc<dyn SystemSettings>,
    pub clock: Arc<dyn Clock>,
}
