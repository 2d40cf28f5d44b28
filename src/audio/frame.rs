//! Per-window acoustic measurements.
//!
//! Each analysis window yields one [`AcousticFrame`]: RMS amplitude as a volume
//! proxy and zero-crossing rate as a proxy for high-frequency (sibilant) content.
//! No smoothing happens here; the classifier's sliding window does that.

use serde::{Deserialize, Serialize};

/// One periodic measurement of the live input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcousticFrame {
    pub rms: f32,
    pub zcr: f32,
    /// Audio-clock time in milliseconds at the end of the window.
    pub timestamp: u64,
}

impl AcousticFrame {
    pub fn new(rms: f32, zcr: f32, timestamp: u64) -> Self {
        Self {
            rms: rms.max(0.0),
            zcr: zcr.max(0.0),
            timestamp,
        }
    }

    /// Measure a full analysis window.
    pub fn analyze(samples: &[f32], timestamp: u64) -> Self {
        Self::new(rms(samples), zero_crossing_rate(samples), timestamp)
    }
}

/// `sqrt(mean(sample^2))`, zero for an empty window.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    energy.sqrt()
}

/// Sign changes between consecutive samples divided by the window length.
///
/// Zero counts as positive, so a run of exact zeros never crosses.
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / samples.len() as f32
}

/// Audio-clock timestamp for the end of a window, derived from samples seen.
pub(crate) fn timestamp_ms(samples_seen: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples_seen.saturating_mul(1000) / u64::from(sample_rate)
}
