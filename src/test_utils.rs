//! Shared test fakes for the host collaborators.
//!
//! Every fake records what the core asked of it so tests can assert on
//! overlay attach/detach counts, posted notifications and launched apps.

#![cfg(test)]

use crate::error::PlatformError;
use crate::platform::{
    Clock, Host, Notification, NotificationChannel, Notifier, OverlaySurface, PackageInfo,
    PackageRegistry, SystemSettings, UsageEvent, UsageEventKind, UsageEventLog,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall clock that follows tokio's (possibly paused) clock.
pub struct TestClock {
    origin: SystemTime,
    start: tokio::time::Instant,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            origin: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> SystemTime {
        self.origin + self.start.elapsed()
    }
}

#[derive(Default)]
pub struct FakeUsageLog {
    events: Mutex<Vec<UsageEvent>>,
    queries: AtomicUsize,
    failing: AtomicBool,
}

impl FakeUsageLog {
    pub fn push(&self, kind: UsageEventKind, application: &str, at: SystemTime) {
        self.events.lock().unwrap().push(UsageEvent::new(kind, application, at));
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl UsageEventLog for FakeUsageLog {
    fn query_events(&self, begin: SystemTime, end: SystemTime) -> Result<Vec<UsageEvent>, PlatformError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlatformError::unavailable("usage log", "permission revoked"));
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp >= begin && e.timestamp <= end)
            .cloned()
            .collect())
    }
}

/// Ordered record of surface and launch calls, shared between fakes.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub struct RecordingSurface {
    attached: AtomicBool,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    fail_attach: AtomicBool,
    fail_detach: AtomicBool,
    journal: Journal,
}

impl RecordingSurface {
    pub fn new(journal: Journal) -> Self {
        Self {
            attached: AtomicBool::new(false),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            fail_attach: AtomicBool::new(false),
            fail_detach: AtomicBool::new(false),
            journal,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn set_fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_detach(&self, fail: bool) {
        self.fail_detach.store(fail, Ordering::SeqCst);
    }
}

impl OverlaySurface for RecordingSurface {
    fn attach(&self) -> Result<(), PlatformError> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(PlatformError::unavailable("overlay", "permission revoked"));
        }
        assert!(
            !self.attached.swap(true, Ordering::SeqCst),
            "surface attached twice"
        );
        self.attaches.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().unwrap().push("attach".to_string());
        Ok(())
    }

    fn detach(&self) -> Result<(), PlatformError> {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().unwrap().push("detach".to_string());
        // A failing detach models the OS having already removed the view.
        self.attached.store(false, Ordering::SeqCst);
        if self.fail_detach.load(Ordering::SeqCst) {
            return Err(PlatformError::Host("view not attached to window manager".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    packages: Mutex<HashMap<String, bool>>,
    home: Mutex<Option<String>>,
}

impl FakeRegistry {
    pub fn install(&self, identifier: &str, is_system_app: bool) {
        self.packages
            .lock()
            .unwrap()
            .insert(identifier.to_string(), is_system_app);
    }

    pub fn set_home(&self, identifier: Option<&str>) {
        *self.home.lock().unwrap() = identifier.map(str::to_string);
    }
}

impl PackageRegistry for FakeRegistry {
    fn lookup(&self, identifier: &str) -> Result<PackageInfo, PlatformError> {
        self.packages
            .lock()
            .unwrap()
            .get(identifier)
            .map(|is_system_app| PackageInfo {
                identifier: identifier.to_string(),
                is_system_app: *is_system_app,
            })
            .ok_or_else(|| PlatformError::PackageNotFound(identifier.to_string()))
    }

    fn home_package(&self) -> Option<String> {
        self.home.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub channels: Mutex<Vec<NotificationChannel>>,
    pub posts: Mutex<Vec<(u32, Notification)>>,
    pub cancels: Mutex<Vec<u32>>,
}

impl RecordingNotifier {
    pub fn last_post(&self, id: u32) -> Option<Notification> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(posted, _)| *posted == id)
            .map(|(_, n)| n.clone())
    }

    pub fn post_count(&self, id: u32) -> usize {
        self.posts.lock().unwrap().iter().filter(|(posted, _)| *posted == id).count()
    }

    pub fn was_cancelled(&self, id: u32) -> bool {
        self.cancels.lock().unwrap().contains(&id)
    }
}

impl Notifier for RecordingNotifier {
    fn create_channel(&self, channel: &NotificationChannel) -> Result<(), PlatformError> {
        self.channels.lock().unwrap().push(channel.clone());
        Ok(())
    }

    fn post(&self, id: u32, notification: &Notification) -> Result<(), PlatformError> {
        self.posts.lock().unwrap().push((id, notification.clone()));
        Ok(())
    }

    fn cancel(&self, id: u32) -> Result<(), PlatformError> {
        self.cancels.lock().unwrap().push(id);
        Ok(())
    }
}

pub struct FakeSettings {
    pub usage_granted: AtomicBool,
    pub overlay_granted: AtomicBool,
    pub opened: Mutex<Vec<&'static str>>,
    journal: Journal,
}

impl FakeSettings {
    pub fn new(journal: Journal) -> Self {
        Self {
            usage_granted: AtomicBool::new(true),
            overlay_granted: AtomicBool::new(true),
            opened: Mutex::new(Vec::new()),
            journal,
        }
    }
}

impl SystemSettings for FakeSettings {
    fn usage_access_granted(&self) -> bool {
        self.usage_granted.load(Ordering::SeqCst)
    }

    fn overlay_granted(&self) -> bool {
        self.overlay_granted.load(Ordering::SeqCst)
    }

    fn open_usage_access_settings(&self) -> Result<(), PlatformError> {
        self.opened.lock().unwrap().push("usage_access");
        Ok(())
    }

    fn open_overlay_settings(&self) -> Result<(), PlatformError> {
        self.opened.lock().unwrap().push("overlay");
        Ok(())
    }

    fn launch_app(&self, identifier: &str) -> Result<(), PlatformError> {
        self.journal.lock().unwrap().push(format!("launch {identifier}"));
        Ok(())
    }
}

/// Handles on every fake behind a test [`Host`].
pub struct Fakes {
    pub usage_log: Arc<FakeUsageLog>,
    pub surface: Arc<RecordingSurface>,
    pub registry: Arc<FakeRegistry>,
    pub notifier: Arc<RecordingNotifier>,
    pub settings: Arc<FakeSettings>,
    pub clock: Arc<TestClock>,
    pub journal: Journal,
}

impl Fakes {
    /// Record `application` coming to the foreground now.
    pub fn foreground(&self, application: &str) {
        self.usage_log
            .push(UsageEventKind::Resumed, application, self.clock.now());
    }
}

/// Build a host whose collaborators are all fakes.
///
/// Must be called inside a tokio runtime so the clock can anchor itself.
pub fn test_host() -> (Host, Fakes) {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let fakes = Fakes {
        usage_log: Arc::new(FakeUsageLog::default()),
        surface: Arc::new(RecordingSurface::new(Arc::clone(&journal))),
        registry: Arc::new(FakeRegistry::default()),
        notifier: Arc::new(RecordingNotifier::default()),
        settings: Arc::new(FakeSettings::new(Arc::clone(&journal))),
        clock: Arc::new(TestClock::new()),
        journal,
    };

    let host = Host {
        usage_log: Arc::clone(&fakes.usage_log) as Arc<dyn UsageEventLog>,
        surface: Arc::clone(&fakes.surface) as Arc<dyn OverlaySurface>,
        registry: Arc::clone(&fakes.registry) as Arc<dyn PackageRegistry>,
        notifier: Arc::clone(&fakes.notifier) as Arc<dyn Notifier>,
        settings: Arc::clone(&fakes.settings) as Arc<dyn SystemSettings>,
        clock: Arc::clone(&fakes.clock) as Arc<dyn Clock>,
    };
    (host, fakes)
}
