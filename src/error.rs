use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a host collaborator (usage log, overlay surface,
/// package registry, notifications, settings).
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{capability} is unavailable: {reason}")]
    Unavailable {
        capability: &'static str,
        reason: String,
    },

    #[error("package '{0}' not found")]
    PackageNotFound(String),

    #[error("{0}")]
    Host(String),
}

impl PlatformError {
    pub fn unavailable(capability: &'static str, reason: impl ToString) -> Self {
        Self::Unavailable {
            capability,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a focus session is already running")]
    AlreadyRunning,
}

/// The only failure the bridge hands back to its caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("method '{0}' is not implemented")]
    NotImplemented(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine project directories")]
    NoProjectDirs,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
