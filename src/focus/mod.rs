use crate::allowlist::Allowlist;
use crate::detector::ForegroundDetector;
use crate::enforcement::EnforcementService;
use crate::error::SessionError;
use crate::models::Session;
use crate::overlay::OverlayController;
use crate::platform::Clock;
use crate::policy::DecisionPolicy;
use crate::scheduler::{FirstTick, PeriodicTask};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Idle,
    Running,
}

/// Point-in-time view of the monitor, for status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusState {
    pub active: bool,
    pub overlay_visible: bool,
    /// `None` for unbounded sessions and when idle.
    pub remaining: Option<Duration>,
}

/// Primary polling loop of a focus session: `Idle -> Running -> Idle`.
///
/// Owns the session and drives the overlay from the foreground detector
/// and the shared decision policy. Starting a session also launches the
/// enforcement service; every way out of Running stops it and hides the
/// overlay.
pub struct SessionMonitor {
    inner: Arc<MonitorInner>,
    runtime: Handle,
}

struct MonitorInner {
    tick_interval: Duration,
    detector: ForegroundDetector,
    policy: Arc<DecisionPolicy>,
    allowlist: Arc<Allowlist>,
    overlay: Arc<OverlayController>,
    enforcement: Arc<EnforcementService>,
    clock: Arc<dyn Clock>,
    state: Mutex<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    session: Option<Session>,
    task: Option<PeriodicTask>,
}

pub struct MonitorParts {
    pub tick_interval: Duration,
    pub detector: ForegroundDetector,
    pub policy: Arc<DecisionPolicy>,
    pub allowlist: Arc<Allowlist>,
    pub overlay: Arc<OverlayController>,
    pub enforcement: Arc<EnforcementService>,
    pub clock: Arc<dyn Clock>,
}

impl SessionMonitor {
    pub fn new(parts: MonitorParts, runtime: Handle) -> Self {
        let MonitorParts {
            tick_interval,
            detector,
            policy,
            allowlist,
            overlay,
            enforcement,
            clock,
        } = parts;

        Self {
            inner: Arc::new(MonitorInner {
                tick_interval,
                detector,
                policy,
                allowlist,
                overlay,
                enforcement,
                clock,
                state: Mutex::new(MonitorState::default()),
            }),
            runtime,
        }
    }

    /// Begin a session. `None` or a zero duration runs until `stop`.
    pub fn start(&self, duration: Option<Duration>) -> Result<(), SessionError> {
        let mut state = self.inner.lock_state();
        if state.session.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let session = Session::start(duration, Instant::now());
        match session.duration {
            Some(d) => info!("Focus session started for {}s", d.as_secs()),
            None => info!("Focus session started (unbounded)"),
        }
        state.session = Some(session);

        self.inner.enforcement.start();

        let inner = Arc::clone(&self.inner);
        state.task = Some(PeriodicTask::spawn(
            &self.runtime,
            self.inner.tick_interval,
            FirstTick::Immediate,
            move || inner.tick(),
        ));
        Ok(())
    }

    /// End the session if one is running; always leaves the overlay hidden.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn update_allowlist(&self, packages: HashSet<String>) {
        self.inner.allowlist.replace(packages);
    }

    pub fn status(&self) -> MonitorStatus {
        if self.inner.lock_state().session.is_some() {
            MonitorStatus::Running
        } else {
            MonitorStatus::Idle
        }
    }

    pub fn focus_state(&self) -> FocusState {
        let state = self.inner.lock_state();
        let now = Instant::now();
        FocusState {
            active: state.session.is_some(),
            overlay_visible: self.inner.overlay.is_visible(),
            remaining: state.session.as_ref().and_then(|s| s.remaining(now)),
        }
    }
}

impl MonitorInner {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("SessionMonitor: state mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// One tick, run under the state lock so `stop` never interleaves with
    /// an overlay decision.
    fn tick(&self) -> ControlFlow<()> {
        let state = self.lock_state();
        let Some(session) = state.session.as_ref() else {
            return ControlFlow::Break(());
        };

        if session.is_expired(Instant::now()) {
            drop(state);
            info!("Focus session expired");
            self.stop();
            return ControlFlow::Break(());
        }

        let sample = self.detector.current_foreground(self.clock.now());
        let verdict = self.policy.evaluate(&sample);
        debug!("Tick: foreground {:?} -> {verdict:?}", sample.application);
        if verdict.blocks() {
            self.overlay.show();
        } else {
            self.overlay.hide();
        }

        ControlFlow::Continue(())
    }

    fn stop(&self) {
        let (was_running, task) = {
            let mut state = self.lock_state();
            (state.session.take().is_some(), state.task.take())
        };
        if let Some(task) = task {
            task.cancel();
        }

        self.enforcement.stop();
        self.overlay.hide();

        if was_running {
            info!("Focus session stopped");
        }
    }
}
