use crate::audio::ANALYSIS_WINDOW_SAMPLES;
use crate::biometrics::{SILENCE_PHASE_MS, VOICE_PHASE_MS};

pub const DEFAULT_ANALYSIS_WINDOW_SAMPLES: usize = ANALYSIS_WINDOW_SAMPLES;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_SILENCE_PHASE_MS: u64 = SILENCE_PHASE_MS;
pub const DEFAULT_VOICE_PHASE_MS: u64 = VOICE_PHASE_MS;
pub const DEFAULT_CALIBRATION_ATTEMPTS: u32 = 1;

pub(super) const MIN_ANALYSIS_WINDOW_SAMPLES: usize = 256;
pub(super) const MAX_ANALYSIS_WINDOW_SAMPLES: usize = 16_384;
pub(super) const MIN_PHASE_MS: u64 = 500;
pub(super) const MAX_PHASE_MS: u64 = 30_000;
pub(super) const MAX_CALIBRATION_ATTEMPTS: u32 = 5;
pub(super) const MAX_MONITOR_MS: u64 = 10 * 60 * 1_000;
pub(super) const MIN_RECORD_MS: u64 = 100;
pub(super) const MAX_RECORD_MS: u64 = 60_000;
pub(super) const MAX_TUNING_FILE_BYTES: u64 = 64 * 1024;
pub(super) const MAX_DEVICE_NAME_LEN: usize = 256;
