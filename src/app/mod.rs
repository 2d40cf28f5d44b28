//! Process-level plumbing shared by the library and the binary.

mod logging;

pub use logging::{content_logging_enabled, init_logging, log_file_path, log_panic, LogSettings};
