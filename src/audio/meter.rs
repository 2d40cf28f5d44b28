use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

const DEFAULT_METER_DB: f32 = -60.0;

/// Number of recent samples kept for waveform drawing.
pub const TAP_SAMPLES: usize = 256;

/// Cosmetic live view of the input: level in dBFS plus the most recent samples.
///
/// Written from the audio callback with relaxed atomics only, so readers can
/// never stall the analysis path. Snapshots may tear across a write; that is
/// fine for drawing.
#[derive(Clone, Debug)]
pub struct WaveformTap {
    inner: Arc<TapInner>,
}

#[derive(Debug)]
struct TapInner {
    level_bits: AtomicU32,
    samples: Box<[AtomicU32]>,
    cursor: AtomicUsize,
}

impl WaveformTap {
    pub fn new() -> Self {
        let samples = (0..TAP_SAMPLES)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            inner: Arc::new(TapInner {
                level_bits: AtomicU32::new(DEFAULT_METER_DB.to_bits()),
                samples,
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.inner.level_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_db(&self, db: f32) {
        self.inner.level_bits.store(db.to_bits(), Ordering::Relaxed);
    }

    /// Record the tail of an incoming block and refresh the level.
    pub(crate) fn publish(&self, block: &[f32]) {
        if block.is_empty() {
            return;
        }
        self.set_db(rms_db(block));
        let tail = &block[block.len().saturating_sub(TAP_SAMPLES)..];
        let mut cursor = self.inner.cursor.load(Ordering::Relaxed);
        for sample in tail {
            self.inner.samples[cursor].store(sample.to_bits(), Ordering::Relaxed);
            cursor = (cursor + 1) % TAP_SAMPLES;
        }
        self.inner.cursor.store(cursor, Ordering::Relaxed);
    }

    /// Recent samples, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        let start = self.inner.cursor.load(Ordering::Relaxed);
        (0..TAP_SAMPLES)
            .map(|offset| {
                let idx = (start + offset) % TAP_SAMPLES;
                f32::from_bits(self.inner.samples[idx].load(Ordering::Relaxed))
            })
            .collect()
    }

    pub(crate) fn reset(&self) {
        self.set_db(DEFAULT_METER_DB);
    }
}

impl Default for WaveformTap {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return DEFAULT_METER_DB;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = energy.sqrt().max(1e-6);
    20.0 * rms.log10()
}
