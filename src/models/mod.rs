pub mod sample;
pub mod session;

pub use sample::ForegroundSample;
pub use session::Session;
