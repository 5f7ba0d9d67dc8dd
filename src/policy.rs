use crate::allowlist::Allowlist;
use crate::models::ForegroundSample;
use crate::platform::PackageRegistry;
use log::debug;
use std::sync::Arc;

/// Outcome of a block decision, with the reason when the app is spared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Unknown,
    HostApp,
    Allowlisted,
    SystemApp,
    Block,
}

impl Verdict {
    pub fn blocks(self) -> bool {
        self == Verdict::Block
    }
}

/// The one block/allow decision consulted by both enforcement loops.
pub struct DecisionPolicy {
    host_identifier: String,
    allowlist: Arc<Allowlist>,
    registry: Arc<dyn PackageRegistry>,
    exempt_system_apps: bool,
}

impl DecisionPolicy {
    pub fn new(
        host_identifier: &str,
        allowlist: Arc<Allowlist>,
        registry: Arc<dyn PackageRegistry>,
        exempt_system_apps: bool,
    ) -> Self {
        Self {
            host_identifier: host_identifier.to_string(),
            allowlist,
            registry,
            exempt_system_apps,
        }
    }

    pub fn evaluate(&self, sample: &ForegroundSample) -> Verdict {
        self.evaluate_app(sample.application())
    }

    pub fn evaluate_app(&self, application: Option<&str>) -> Verdict {
        let Some(app) = application else {
            return Verdict::Unknown;
        };
        if app == self.host_identifier {
            return Verdict::HostApp;
        }
        if self.allowlist.contains(app) {
            return Verdict::Allowlisted;
        }
        if self.exempt_system_apps && !self.is_user_app(app) {
            return Verdict::SystemApp;
        }
        Verdict::Block
    }

    /// Registry failures count as "not a user app" so the user is never trapped.
    fn is_user_app(&self, app: &str) -> bool {
        match self.registry.lookup(app) {
            Ok(info) => !info.is_system_app,
            Err(e) => {
                debug!("Package lookup for {app} failed, not blocking: {e}");
                false
            }
        }
    }
}
