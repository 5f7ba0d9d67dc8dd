pub mod allowlist;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod detector;
pub mod enforcement;
pub mod error;
pub mod focus;
pub mod models;
pub mod native_host;
pub mod notification;
pub mod overlay;
pub mod platform;
pub mod policy;
pub mod scheduler;
#[cfg(test)]
mod test_utils;

pub use bridge::{Bridge, MethodCall};
pub use config::FocusConfig;
pub use error::{BridgeError, ConfigError, PlatformError, SessionError};
pub use platform::Host;
