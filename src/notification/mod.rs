use crate::constants::{TIMER_CHANNEL_ID, TIMER_NOTIFICATION_ID};
use crate::platform::{
    Importance, Notification, NotificationAction, NotificationChannel, NotificationIcon,
    NotificationTag, Notifier, RunStateIcon,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

const WORK_COLOR: &str = "#B8F397";
const BREAK_COLOR: &str = "#9FD8FF";
const NEUTRAL_COLOR: &str = "#FFFFFF";

/// Everything the timer notification shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationState {
    pub formatted_time: String,
    pub session_type: String,
    pub running: bool,
}

impl Default for NotificationState {
    fn default() -> Self {
        Self {
            formatted_time: "25:00".to_string(),
            session_type: "Work".to_string(),
            running: true,
        }
    }
}

/// Something the user did on the notification, forwarded to the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimerEvent {
    PauseToggled { running: bool },
    Stopped,
    OpenApp,
}

pub enum TimerCommand {
    Start(NotificationState),
    Update(NotificationState),
    TogglePause,
    Stop,
}

pub fn tag_color(session_type: &str) -> &'static str {
    match session_type.to_lowercase().as_str() {
        "work" | "pomodoro" => WORK_COLOR,
        "break" | "short break" | "long break" => BREAK_COLOR,
        _ => NEUTRAL_COLOR,
    }
}

/// Pure mapping from notification state to what gets posted.
pub fn render(state: &NotificationState) -> Notification {
    let title = if state.running {
        state.session_type.clone()
    } else {
        format!("{} (Paused)", state.session_type)
    };

    Notification {
        channel_id: TIMER_CHANNEL_ID,
        title,
        text: state.formatted_time.clone(),
        icon: NotificationIcon::Hourglass,
        tag: Some(NotificationTag {
            text: state.session_type.clone(),
            color: tag_color(&state.session_type),
        }),
        run_state: Some(if state.running {
            RunStateIcon::Running
        } else {
            RunStateIcon::Paused
        }),
        actions: vec![
            NotificationAction::TogglePause,
            NotificationAction::Stop,
            NotificationAction::OpenApp,
        ],
        ongoing: true,
    }
}

fn timer_channel() -> NotificationChannel {
    NotificationChannel {
        id: TIMER_CHANNEL_ID,
        name: "Focus Timer",
        description: "Remaining time of the current focus block.",
        importance: Importance::Low,
    }
}

#[derive(Default)]
struct Slot {
    state: NotificationState,
    active: bool,
    channel_ready: bool,
}

/// The single persistent, updatable timer notification.
pub struct TimerNotificationService {
    notifier: Arc<dyn Notifier>,
    slot: Mutex<Slot>,
    events: Mutex<Option<mpsc::UnboundedSender<TimerEvent>>>,
}

impl TimerNotificationService {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            slot: Mutex::new(Slot::default()),
            events: Mutex::new(None),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("TimerNotificationService: mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Receive user actions taken on the notification. A new subscriber
    /// replaces the previous one.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TimerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.events.lock() {
            Ok(mut guard) => *guard = Some(tx),
            Err(poisoned) => *poisoned.into_inner() = Some(tx),
        }
        rx
    }

    fn emit(&self, event: TimerEvent) {
        let guard = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tx) = guard.as_ref() {
            if tx.send(event).is_err() {
                debug!("Timer event dropped, no listener");
            }
        }
    }

    pub fn handle(&self, command: TimerCommand) {
        match command {
            TimerCommand::Start(state) => self.start(state),
            TimerCommand::Update(state) => self.update(state),
            TimerCommand::TogglePause => self.toggle_pause(),
            TimerCommand::Stop => self.stop(),
        }
    }

    /// Entry point for the notification's own buttons.
    pub fn handle_action(&self, action: NotificationAction) {
        match action {
            NotificationAction::TogglePause => self.toggle_pause(),
            NotificationAction::Stop => self.stop(),
            NotificationAction::OpenApp => self.emit(TimerEvent::OpenApp),
        }
    }

    pub fn start(&self, state: NotificationState) {
        let mut slot = self.lock_slot();
        if !slot.channel_ready {
            match self.notifier.create_channel(&timer_channel()) {
                Ok(()) => slot.channel_ready = true,
                Err(e) => warn!("Failed to create timer channel: {e}"),
            }
        }
        slot.state = state;
        slot.active = true;
        self.post(&slot.state);
        info!("Timer notification started ({})", slot.state.session_type);
    }

    /// Re-render in place. Ignored when the notification is not up.
    pub fn update(&self, state: NotificationState) {
        let mut slot = self.lock_slot();
        if !slot.active {
            debug!("Timer update ignored, notification not started");
            return;
        }
        slot.state = state;
        self.post(&slot.state);
    }

    pub fn toggle_pause(&self) {
        let running = {
            let mut slot = self.lock_slot();
            if !slot.active {
                return;
            }
            slot.state.running = !slot.state.running;
            self.post(&slot.state);
            slot.state.running
        };
        self.emit(TimerEvent::PauseToggled { running });
    }

    pub fn stop(&self) {
        {
            let mut slot = self.lock_slot();
            if !slot.active {
                return;
            }
            slot.active = false;
            if let Err(e) = self.notifier.cancel(TIMER_NOTIFICATION_ID) {
                debug!("Failed to remove timer notification: {e}");
            }
        }
        info!("Timer notification stopped");
        self.emit(TimerEvent::Stopped);
    }

    pub fn state(&self) -> Option<NotificationState> {
        let slot = self.lock_slot();
        slot.active.then(|| slot.state.clone())
    }

    fn post(&self, state: &NotificationState) {
        if let Err(e) = self.notifier.post(TIMER_NOTIFICATION_ID, &render(state)) {
            warn!("Failed to post timer notification: {e}");
        }
    }
}
