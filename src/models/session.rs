use crate::constants::MAX_SESSION_DURATION;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub started_at: Instant,
    /// `None` means the session runs until stopped.
    pub duration: Option<Duration>,
}

impl Session {
    pub fn start(duration: Option<Duration>, now: Instant) -> Self {
        Self {
            started_at: now,
            duration: duration
                .filter(|d| !d.is_zero())
                .map(|d| d.min(MAX_SESSION_DURATION)),
        }
    }

    /// Session length for a minute count; zero or negative means unbounded.
    pub fn duration_from_minutes(minutes: i64) -> Option<Duration> {
        u64::try_from(minutes)
            .ok()
            .filter(|m| *m > 0)
            .map(|m| Duration::from_secs(m.saturating_mul(60)))
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.duration.and_then(|d| self.started_at.checked_add(d))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|end| now >= end)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at().map(|end| end.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_to_duration() {
        assert_eq!(Session::duration_from_minutes(25), Some(Duration::from_secs(1500)));
        assert_eq!(Session::duration_from_minutes(0), None);
        assert_eq!(Session::duration_from_minutes(-5), None);
    }

    #[test]
    fn test_unbounded_session_never_expires() {
        let now = Instant::now();
        let session = Session::start(None, now);
        assert!(session.expires_at().is_none());
        assert!(!session.is_expired(now + Duration::from_secs(86_400)));
        assert!(session.remaining(now).is_none());
    }

    #[test]
    fn test_huge_duration_clamped_and_still_bounded() {
        let now = Instant::now();
        let session = Session::start(Session::duration_from_minutes(i64::MAX), now);

        assert_eq!(session.duration, Some(MAX_SESSION_DURATION));
        assert!(session.expires_at().is_some());
        assert_eq!(session.remaining(now), Some(MAX_SESSION_DURATION));
    }

    #[test]
    fn test_zero_duration_is_unbounded() {
        let session = Session::start(Some(Duration::ZERO), Instant::now());
        assert!(session.duration.is_none());
    }

    #[test]
    fn test_bounded_session_expires_at_boundary() {
        let now = Instant::now();
        let session = Session::start(Some(Duration::from_secs(60)), now);

        assert!(!session.is_expired(now + Duration::from_secs(59)));
        assert!(session.is_expired(now + Duration::from_secs(60)));
        assert_eq!(
            session.remaining(now + Duration::from_secs(45)),
            Some(Duration::from_secs(15))
        );
        assert_eq!(session.remaining(now + Duration::from_secs(90)), Some(Duration::ZERO));
    }
}
