//! Microphone capture, per-window acoustic analysis, and payload encoding.
//!
//! Audio is captured via CPAL and split two ways on the device callback: fixed
//! 2048-sample analysis windows become [`AcousticFrame`]s for whichever
//! consumer is active, and raw mono chunks accumulate for the current
//! utterance. On stop, chunks are resampled to 16 kHz and wrapped as WAV.

/// Payload sample rate expected by the dialogue model.
pub const TARGET_RATE: u32 = 16_000;

/// Payload channel count.
pub const TARGET_CHANNELS: u16 = 1;

/// Samples per analysis window at the source rate.
pub const ANALYSIS_WINDOW_SAMPLES: usize = 2048;

/// Reported source rate before a device has been opened.
pub const DEFAULT_SOURCE_RATE: u32 = 16_000;

mod dispatch;
mod engine;
mod error;
mod frame;
mod meter;
mod pipeline;
mod resample;
#[cfg(test)]
mod tests;
mod wav;

pub use engine::{AudioEngine, InputProcessing};
pub use error::{CaptureError, EncodeError};
pub use frame::{rms, zero_crossing_rate, AcousticFrame};
pub use meter::{WaveformTap, TAP_SAMPLES};
pub use pipeline::{
    AnalysisCallback, AnalysisConfig, AnalysisMode, AnalysisPipeline, CaptureSource, InputHandle,
};
pub use resample::{resample_linear, resample_to_target_rate};
pub use wav::{encode_wav, float_to_pcm16, wav_to_base64, WavEncoder, WAV_HEADER_LEN};
