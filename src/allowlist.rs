use log::{debug, warn};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Application identifiers that are never blocked.
///
/// Readers take a snapshot of the whole set; `replace` swaps in a new set
/// wholesale, so a concurrent poll sees either the old or the new set.
#[derive(Debug, Default)]
pub struct Allowlist {
    packages: RwLock<Arc<HashSet<String>>>,
}

impl Allowlist {
    pub fn new<I>(packages: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            packages: RwLock::new(Arc::new(packages.into_iter().collect())),
        }
    }

    pub fn snapshot(&self) -> Arc<HashSet<String>> {
        match self.packages.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => {
                warn!("Allowlist lock was poisoned, recovering");
                Arc::clone(&poisoned.into_inner())
            }
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.snapshot().contains(identifier)
    }

    pub fn replace(&self, packages: HashSet<String>) {
        debug!("Allowlist replaced ({} entries)", packages.len());
        let packages = Arc::new(packages);
        match self.packages.write() {
            Ok(mut guard) => *guard = packages,
            Err(poisoned) => {
                warn!("Allowlist lock was poisoned, recovering");
                *poisoned.into_inner() = packages;
            }
        }
    }
}

/// The set every session starts from: the host app, the current home
/// screen (when one could be resolved) and the system UI.
pub fn seed_packages(host: &str, home: Option<&str>, system_ui: &str) -> HashSet<String> {
    let mut packages = HashSet::new();
    packages.insert(host.to_string());
    if let Some(home) = home {
        packages.insert(home.to_string());
    }
    packages.insert(system_ui.to_string());
    packages
}
