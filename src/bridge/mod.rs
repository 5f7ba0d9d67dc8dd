use crate::allowlist::{seed_packages, Allowlist};
use crate::config::FocusConfig;
use crate::detector::{EventFilter, ForegroundDetector};
use crate::enforcement::{EnforcementConfig, EnforcementService};
use crate::error::BridgeError;
use crate::focus::{MonitorParts, SessionMonitor};
use crate::models::Session;
use crate::notification::{NotificationState, TimerCommand, TimerEvent, TimerNotificationService};
use crate::overlay::OverlayController;
use crate::platform::{Host, NotificationAction};
use crate::policy::DecisionPolicy;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// One call from the UI layer: a method name plus its JSON arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: &str, arguments: Value) -> Self {
        Self {
            method: method.to_string(),
            arguments,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StartSessionArgs {
    minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AllowedPackagesArgs {
    List(Vec<String>),
    Wrapped { packages: Vec<String> },
}

impl Default for AllowedPackagesArgs {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl AllowedPackagesArgs {
    fn into_set(self) -> HashSet<String> {
        match self {
            Self::List(packages) | Self::Wrapped { packages } => packages.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TimerArgs {
    time: String,
    #[serde(rename = "type")]
    session_type: String,
    #[serde(rename = "isRunning")]
    running: bool,
}

impl Default for TimerArgs {
    fn default() -> Self {
        Self {
            time: "00:00".to_string(),
            session_type: "Timer".to_string(),
            running: true,
        }
    }
}

impl From<TimerArgs> for NotificationState {
    fn from(args: TimerArgs) -> Self {
        Self {
            formatted_time: args.time,
            session_type: args.session_type,
            running: args.running,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TimerActionArgs {
    action: NotificationAction,
}

/// Decode call arguments, falling back to defaults when they are absent
/// or malformed.
fn parse_args<T: DeserializeOwned + Default>(method: &str, arguments: &Value) -> T {
    if arguments.is_null() {
        return T::default();
    }
    match serde_json::from_value(arguments.clone()) {
        Ok(args) => args,
        Err(e) => {
            warn!("{method}: ignoring malformed arguments: {e}");
            T::default()
        }
    }
}

/// The method-call surface exposed to the UI layer.
///
/// Owns the full focus stack for one host: shared allowlist and policy,
/// the overlay, both enforcement loops and the timer notification. Every
/// internal failure is absorbed here; the caller only ever sees
/// [`BridgeError::NotImplemented`].
pub struct Bridge {
    config: FocusConfig,
    host: Host,
    overlay: Arc<OverlayController>,
    monitor: SessionMonitor,
    timer: TimerNotificationService,
}

impl Bridge {
    pub fn new(config: FocusConfig, host: Host, runtime: Handle) -> Self {
        let allowlist = Arc::new(Allowlist::new(seed_packages(
            &config.host_identifier,
            None,
            &config.system_ui_identifier,
        )));
        let policy = Arc::new(DecisionPolicy::new(
            &config.host_identifier,
            Arc::clone(&allowlist),
            Arc::clone(&host.registry),
            config.exempt_system_apps,
        ));
        let overlay = Arc::new(OverlayController::new(
            Arc::clone(&host.surface),
            Arc::clone(&host.settings),
            &config.host_identifier,
        ));

        let enforcement = Arc::new(EnforcementService::new(
            EnforcementConfig {
                poll_interval: config.enforcement_interval(),
                hide_debounce: config.hide_debounce(),
            },
            ForegroundDetector::new(
                Arc::clone(&host.usage_log),
                config.usage_window(),
                EventFilter::ResumedOnly,
            ),
            Arc::clone(&policy),
            Arc::clone(&overlay),
            Arc::clone(&host.notifier),
            Arc::clone(&host.clock),
            runtime.clone(),
        ));

        let monitor = SessionMonitor::new(
            MonitorParts {
                tick_interval: config.monitor_interval(),
                detector: ForegroundDetector::new(
                    Arc::clone(&host.usage_log),
                    config.usage_window(),
                    EventFilter::Transitions,
                ),
                policy,
                allowlist,
                overlay: Arc::clone(&overlay),
                enforcement,
                clock: Arc::clone(&host.clock),
            },
            runtime,
        );

        let timer = TimerNotificationService::new(Arc::clone(&host.notifier));

        Self {
            config,
            host,
            overlay,
            monitor,
            timer,
        }
    }

    pub fn overlay(&self) -> &Arc<OverlayController> {
        &self.overlay
    }

    pub fn subscribe_timer_events(&self) -> mpsc::UnboundedReceiver<TimerEvent> {
        self.timer.subscribe()
    }

    pub fn handle(&self, call: &MethodCall) -> Result<Value, BridgeError> {
        debug!("Bridge call: {}", call.method);
        match call.method.as_str() {
            "requestAuthorization" => Ok(Value::Bool(self.request_authorization())),
            "checkAuthorizationStatus" => Ok(Value::Bool(self.authorized())),
            "startFocusSession" => {
                let args: StartSessionArgs = parse_args(&call.method, &call.arguments);
                self.start_focus_session(args.minutes.unwrap_or(self.config.default_session_minutes));
                Ok(Value::Null)
            }
            "updateAllowedPackages" => {
                let args: AllowedPackagesArgs = parse_args(&call.method, &call.arguments);
                self.monitor.update_allowlist(args.into_set());
                Ok(Value::Null)
            }
            "endFocusSession" => {
                self.monitor.stop();
                Ok(Value::Null)
            }
            "getFocusState" => Ok(self.focus_state()),
            // App picking happens in the UI; the allowlist arrives via updateAllowedPackages.
            "presentPicker" => Ok(Value::Null),
            "startTimerService" => {
                let args: TimerArgs = parse_args(&call.method, &call.arguments);
                self.timer.handle(TimerCommand::Start(args.into()));
                Ok(Value::Null)
            }
            "updateTimerService" => {
                let args: TimerArgs = parse_args(&call.method, &call.arguments);
                self.timer.handle(TimerCommand::Update(args.into()));
                Ok(Value::Null)
            }
            "stopTimerService" => {
                self.timer.handle(TimerCommand::Stop);
                Ok(Value::Null)
            }
            "timerAction" => {
                match serde_json::from_value::<TimerActionArgs>(call.arguments.clone()) {
                    Ok(args) => self.timer.handle_action(args.action),
                    Err(e) => warn!("timerAction: ignoring malformed arguments: {e}"),
                }
                Ok(Value::Null)
            }
            other => Err(BridgeError::NotImplemented(other.to_string())),
        }
    }

    /// End everything this bridge started. Used when the UI disconnects.
    pub fn shutdown(&self) {
        self.monitor.stop();
        self.timer.stop();
        info!("Bridge shut down");
    }

    fn authorized(&self) -> bool {
        self.host.settings.usage_access_granted() && self.host.settings.overlay_granted()
    }

    fn request_authorization(&self) -> bool {
        let settings = &self.host.settings;
        if !settings.usage_access_granted() {
            if let Err(e) = settings.open_usage_access_settings() {
                warn!("Could not open usage access settings: {e}");
            }
        }
        if !settings.overlay_granted() {
            if let Err(e) = settings.open_overlay_settings() {
                warn!("Could not open overlay settings: {e}");
            }
        }
        true
    }

    fn start_focus_session(&self, minutes: i64) {
        let home = self.host.registry.home_package();
        let seed = seed_packages(
            &self.config.host_identifier,
            home.as_deref(),
            &self.config.system_ui_identifier,
        );
        self.monitor.update_allowlist(seed);

        if let Err(e) = self.monitor.start(Session::duration_from_minutes(minutes)) {
            warn!("startFocusSession: {e}, allowlist reset only");
        }
    }

    fn focus_state(&self) -> Value {
        let state = self.monitor.focus_state();
        json!({
            "active": state.active,
            "overlayVisible": state.overlay_visible,
            "remainingSecs": state.remaining.map(|r| r.as_secs()),
        })
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}
