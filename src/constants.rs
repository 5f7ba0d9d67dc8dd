// src/constants.rs

use std::time::Duration;

/// Session Monitor tick cadence.
pub const MONITOR_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Enforcement Service poll cadence. Deliberately not a multiple of the monitor tick.
pub const ENFORCEMENT_POLL_INTERVAL: Duration = Duration::from_millis(700);

/// Delay before the Enforcement Service reverses a visible overlay.
pub const HIDE_DEBOUNCE: Duration = Duration::from_millis(600);

/// Trailing usage-log window inspected per foreground sample.
pub const USAGE_WINDOW: Duration = Duration::from_millis(2000);

/// Longest bounded session. Longer requests are clamped so they stay bounded.
pub const MAX_SESSION_DURATION: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Session length used when the caller does not pass one.
pub const DEFAULT_SESSION_MINUTES: i64 = 25;

pub const DEFAULT_HOST_IDENTIFIER: &str = "focus-shield";

pub const DEFAULT_SYSTEM_UI_IDENTIFIER: &str = "gnome-shell";

/// Notification id of the timer status notification.
pub const TIMER_NOTIFICATION_ID: u32 = 1;

/// Notification id of the focus-mode keep-alive indicator.
pub const FOCUS_INDICATOR_ID: u32 = 2;

pub const TIMER_CHANNEL_ID: &str = "focus_shield_timer";

pub const FOCUS_CHANNEL_ID: &str = "focus_shield_focus_mode";

/// Maximum protocol message size (1 MiB), matching browser native messaging.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
