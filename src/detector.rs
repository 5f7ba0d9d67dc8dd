use crate::models::ForegroundSample;
use crate::platform::{UsageEventKind, UsageEventLog};
use log::debug;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Which usage-event kinds count as evidence of the foreground application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Resumed, paused and stopped activities.
    Transitions,
    /// Resumed activities only.
    ResumedOnly,
}

impl EventFilter {
    fn accepts(self, kind: UsageEventKind) -> bool {
        match self {
            EventFilter::Transitions => matches!(
                kind,
                UsageEventKind::Resumed | UsageEventKind::Paused | UsageEventKind::Stopped
            ),
            EventFilter::ResumedOnly => kind == UsageEventKind::Resumed,
        }
    }
}

/// Reduces the trailing window of the usage log to "current foreground
/// application, or unknown".
pub struct ForegroundDetector {
    log: Arc<dyn UsageEventLog>,
    window: Duration,
    filter: EventFilter,
}

impl ForegroundDetector {
    pub fn new(log: Arc<dyn UsageEventLog>, window: Duration, filter: EventFilter) -> Self {
        Self { log, window, filter }
    }

    /// Identifier from the last qualifying event in `[now - window, now]`.
    ///
    /// Query failures and empty windows both resolve to unknown.
    pub fn current_foreground(&self, now: SystemTime) -> ForegroundSample {
        let begin = now.checked_sub(self.window).unwrap_or(UNIX_EPOCH);

        let mut events = match self.log.query_events(begin, now) {
            Ok(events) => events,
            Err(e) => {
                debug!("Usage log query failed, foreground unknown: {e}");
                return ForegroundSample::unknown(now);
            }
        };

        // Delivery order is not guaranteed; the stable sort keeps arrival order for ties.
        events.sort_by_key(|e| e.timestamp);

        let application = events
            .into_iter()
            .rev()
            .find(|e| {
                e.timestamp >= begin
                    && e.timestamp <= now
                    && self.filter.accepts(e.kind)
                    && !e.application.is_empty()
            })
            .map(|e| e.application);

        ForegroundSample {
            application,
            sampled_at: now,
        }
    }
}
