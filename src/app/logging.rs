//! File logging for calibration runs and turns.
//!
//! One JSON-lines `tracing` subscriber carries everything: lifecycle events,
//! calibration and turn records, and panics. Nothing is written unless
//! `--logs` is set, and `--no-logs` always wins. Values derived from what the
//! player said or how they said it only reach the file with `--log-content`.

use crate::config::AppConfig;
use std::{
    env, fs,
    path::{Path, PathBuf},
    panic::PanicHookInfo,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, OnceLock,
    },
};
use tracing::Level;
use tracing_subscriber::fmt::time::UtcTime;

/// Log file is truncated at startup once it grows past this.
const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;

static CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static SUBSCRIBER_INIT: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Which parts of logging a run asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    pub content: bool,
}

impl From<&AppConfig> for LogSettings {
    fn from(config: &AppConfig) -> Self {
        let enabled = config.logs && !config.no_logs;
        Self {
            enabled,
            content: enabled && config.log_content,
        }
    }
}

/// `UNDER_PRESSURE_LOG_FILE`, or `under_pressure.jsonl` in the temp dir.
pub fn log_file_path() -> PathBuf {
    env::var_os("UNDER_PRESSURE_LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("under_pressure.jsonl"))
}

/// Install the file subscriber. Returns the log path when logging is active.
///
/// Only the first enabled call installs anything; later calls report the
/// path chosen then.
pub fn init_logging(config: &AppConfig) -> Option<PathBuf> {
    let settings = LogSettings::from(config);
    CONTENT_ENABLED.store(settings.content, Ordering::Relaxed);
    if !settings.enabled {
        return None;
    }
    SUBSCRIBER_INIT
        .get_or_init(|| {
            let path = log_file_path();
            let file = open_log_file(&path, LOG_MAX_BYTES)?;
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_max_level(Level::DEBUG)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(Mutex::new(file))
                .with_current_span(false)
                .with_span_list(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber).ok()?;
            Some(path)
        })
        .clone()
}

/// Whether signal values and transcript text may be logged.
pub fn content_logging_enabled() -> bool {
    CONTENT_ENABLED.load(Ordering::Relaxed)
}

fn open_log_file(path: &Path, max_bytes: u64) -> Option<fs::File> {
    let oversized = fs::metadata(path).map(|m| m.len() > max_bytes).unwrap_or(false);
    fs::OpenOptions::new()
        .create(true)
        .append(!oversized)
        .write(true)
        .truncate(oversized)
        .open(path)
        .ok()
}

/// Record a panic through the log subscriber. The payload is kept only when
/// content logging is on.
pub fn log_panic(info: &PanicHookInfo<'_>) {
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned());
    tracing::error!(
        location = %location,
        payload = %panic_payload(payload.as_deref(), content_logging_enabled()),
        version = env!("CARGO_PKG_VERSION"),
        "panic"
    );
}

fn panic_payload(payload: Option<&str>, include: bool) -> &str {
    match (include, payload) {
        (false, _) => "omitted (log-content disabled)",
        (true, Some(text)) => text,
        (true, None) => "non-string panic payload",
    }
}
