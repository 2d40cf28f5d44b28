pub mod app;
pub mod audio;
pub mod biometrics;
pub mod config;
mod lock;
pub mod session;

pub use app::{content_logging_enabled, init_logging, log_file_path, log_panic};
pub(crate) use lock::lock_or_recover;
