use crate::constants::{FOCUS_CHANNEL_ID, FOCUS_INDICATOR_ID};
use crate::detector::ForegroundDetector;
use crate::overlay::OverlayController;
use crate::platform::{
    Clock, Importance, Notification, NotificationChannel, NotificationIcon, Notifier,
};
use crate::policy::DecisionPolicy;
use crate::scheduler::{FirstTick, PeriodicTask};
use log::{debug, info, warn};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

pub struct EnforcementConfig {
    pub poll_interval: Duration,
    pub hide_debounce: Duration,
}

/// Background keep-alive loop that re-derives the block decision on its own
/// cadence, independent of whether the UI that started the session is visible.
///
/// Shows as soon as a blocking app is observed; hides only after a debounce,
/// so the brief foreground hops while the user returns to an allowed app do
/// not flicker the overlay.
pub struct EnforcementService {
    inner: Arc<ServiceInner>,
    runtime: Handle,
}

struct ServiceInner {
    config: EnforcementConfig,
    detector: ForegroundDetector,
    policy: Arc<DecisionPolicy>,
    overlay: Arc<OverlayController>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    state: Mutex<ServiceState>,
}

#[derive(Default)]
struct ServiceState {
    task: Option<PeriodicTask>,
    last_observed: Option<String>,
}

fn indicator_channel() -> NotificationChannel {
    NotificationChannel {
        id: FOCUS_CHANNEL_ID,
        name: "Focus Mode",
        description: "Shown while a focus session is blocking distractions.",
        importance: Importance::Min,
    }
}

fn indicator_notification() -> Notification {
    Notification {
        channel_id: FOCUS_CHANNEL_ID,
        title: "Focus Mode".to_string(),
        text: "Blocking distractions during your session.".to_string(),
        icon: NotificationIcon::Lock,
        tag: None,
        run_state: None,
        actions: Vec::new(),
        ongoing: true,
    }
}

impl EnforcementService {
    pub fn new(
        config: EnforcementConfig,
        detector: ForegroundDetector,
        policy: Arc<DecisionPolicy>,
        overlay: Arc<OverlayController>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                config,
                detector,
                policy,
                overlay,
                notifier,
                clock,
                state: Mutex::new(ServiceState::default()),
            }),
            runtime,
        }
    }

    /// Post the keep-alive indicator and begin polling. Starting a running
    /// service is a no-op.
    pub fn start(&self) {
        let mut state = self.inner.lock_state();
        if state.task.is_some() {
            debug!("Enforcement service already running");
            return;
        }

        if let Err(e) = self.inner.notifier.create_channel(&indicator_channel()) {
            warn!("Failed to create focus indicator channel: {e}");
        }
        if let Err(e) = self.inner.notifier.post(FOCUS_INDICATOR_ID, &indicator_notification()) {
            warn!("Failed to post focus indicator: {e}");
        }

        state.last_observed = None;
        let inner = Arc::clone(&self.inner);
        let runtime = self.runtime.clone();
        state.task = Some(PeriodicTask::spawn(
            &self.runtime,
            self.inner.config.poll_interval,
            FirstTick::AfterPeriod,
            move || inner.poll(&runtime),
        ));
        info!("Enforcement service started");
    }

    /// Stop polling, cancel pending deferred hides, force the overlay
    /// hidden and release the indicator. Safe to call when not running.
    pub fn stop(&self) {
        let task = {
            let mut state = self.inner.lock_state();
            state.last_observed = None;
            state.task.take()
        };

        let Some(task) = task else {
            return;
        };
        task.cancel();
        self.inner.overlay.hide();
        if let Err(e) = self.inner.notifier.cancel(FOCUS_INDICATOR_ID) {
            debug!("Failed to remove focus indicator: {e}");
        }
        info!("Enforcement service stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_state().task.is_some()
    }
}

impl ServiceInner {
    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("EnforcementService: state mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn poll(self: &Arc<Self>, runtime: &Handle) -> ControlFlow<()> {
        let mut state = self.lock_state();
        if state.task.is_none() {
            return ControlFlow::Break(());
        }

        let sample = self.detector.current_foreground(self.clock.now());
        let Some(app) = sample.application else {
            return ControlFlow::Continue(());
        };
        if state.last_observed.as_deref() == Some(app.as_str()) {
            return ControlFlow::Continue(());
        }
        state.last_observed = Some(app.clone());

        let verdict = self.policy.evaluate_app(Some(&app));
        debug!("Foreground changed to {app}: {verdict:?}");
        if verdict.blocks() {
            if !self.overlay.is_visible() {
                self.overlay.show();
            }
        } else if self.overlay.is_visible() {
            if let Some(task) = state.task.as_ref() {
                self.schedule_hide(runtime, task.token().child_token());
            }
        }

        ControlFlow::Continue(())
    }

    fn schedule_hide(self: &Arc<Self>, runtime: &Handle, token: CancellationToken) {
        let inner = Arc::clone(self);
        let delay = self.config.hide_debounce;
        runtime.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => inner.finish_deferred_hide(),
            }
        });
    }

    /// Re-sample after the debounce and hide only if the foreground is
    /// still an app that should not be blocked.
    fn finish_deferred_hide(&self) {
        let mut state = self.lock_state();
        if state.task.is_none() {
            return;
        }

        let sample = self.detector.current_foreground(self.clock.now());
        if let Some(app) = sample.application {
            state.last_observed = Some(app);
        }

        let verdict = self.policy.evaluate_app(state.last_observed.as_deref());
        if verdict.blocks() {
            debug!("Deferred hide skipped, foreground went back to a blocked app");
            return;
        }
        if self.overlay.is_visible() {
            self.overlay.hide();
        }
    }
}
