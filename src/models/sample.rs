use std::time::SystemTime;

/// One foreground observation. Recomputed every poll, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundSample {
    pub application: Option<String>,
    pub sampled_at: SystemTime,
}

impl ForegroundSample {
    pub fn unknown(sampled_at: SystemTime) -> Self {
        Self {
            application: None,
            sampled_at,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.application.is_none()
    }

    pub fn application(&self) -> Option<&str> {
        self.application.as_deref()
    }
}
