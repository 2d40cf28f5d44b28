//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use crate::audio::AnalysisConfig;
use crate::biometrics::{CalibrationTiming, ClassifierTuning};
use clap::Parser;
use std::path::PathBuf;

pub use defaults::{
    DEFAULT_ANALYSIS_WINDOW_SAMPLES, DEFAULT_CALIBRATION_ATTEMPTS, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_SILENCE_PHASE_MS, DEFAULT_VOICE_PHASE_MS,
};

/// CLI options for the under-pressure voice biometrics tool.
#[derive(Debug, Parser, Clone)]
#[command(about = "Under Pressure voice biometrics", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long, env = "UNDER_PRESSURE_INPUT_DEVICE")]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Print the calibration profile as JSON instead of a summary line
    #[arg(long = "profile-json", default_value_t = false)]
    pub profile_json: bool,

    /// Calibrate again, up to this many runs in total, while the profile is degenerate
    #[arg(long = "calibration-attempts", default_value_t = DEFAULT_CALIBRATION_ATTEMPTS)]
    pub calibration_attempts: u32,

    /// After calibration, print live biometric signals for this long (milliseconds)
    #[arg(long = "monitor-ms")]
    pub monitor_ms: Option<u64>,

    /// After calibration, record one utterance of this length (milliseconds)
    #[arg(long = "record-ms")]
    pub record_ms: Option<u64>,

    /// Write the recorded utterance to this WAV file
    #[arg(long, requires = "record_ms")]
    pub output: Option<PathBuf>,

    /// Emit monitor and turn output as JSON lines
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Samples per analysis window at the device rate
    #[arg(long = "analysis-window-samples", default_value_t = DEFAULT_ANALYSIS_WINDOW_SAMPLES)]
    pub analysis_window_samples: usize,

    /// Event channel capacity between the audio callback and the analysis thread
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Length of the silent calibration phase (milliseconds)
    #[arg(long = "silence-phase-ms", default_value_t = DEFAULT_SILENCE_PHASE_MS)]
    pub silence_phase_ms: u64,

    /// Length of the voice calibration phase (milliseconds)
    #[arg(long = "voice-phase-ms", default_value_t = DEFAULT_VOICE_PHASE_MS)]
    pub voice_phase_ms: u64,

    /// YAML file overriding classifier tuning constants
    #[arg(long = "tuning-file", env = "UNDER_PRESSURE_TUNING_FILE")]
    pub tuning_file: Option<PathBuf>,

    /// Sliding window length for live scoring (milliseconds); overrides the tuning file
    #[arg(long = "biometrics-window-ms")]
    pub biometrics_window_ms: Option<u64>,

    /// Stammer variance divisor; overrides the tuning file
    #[arg(long = "stammer-scale")]
    pub stammer_scale: Option<f32>,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "UNDER_PRESSURE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "UNDER_PRESSURE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging transcript snippets and signal values (debug log only)
    #[arg(
        long = "log-content",
        env = "UNDER_PRESSURE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}

/// Validated tunables handed to the library layer.
#[derive(Debug, Clone, PartialEq)]
pub struct BiometricsConfig {
    pub analysis: AnalysisConfig,
    pub timing: CalibrationTiming,
    pub tuning: ClassifierTuning,
}

impl Default for BiometricsConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            timing: CalibrationTiming::default(),
            tuning: ClassifierTuning::default(),
        }
    }
}
