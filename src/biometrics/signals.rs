//! Pure scoring: a frame window plus a profile in, four confidences out.

use super::profile::CalibrationProfile;
use crate::audio::AcousticFrame;
use serde::{Deserialize, Serialize};

/// Four independent confidences in `[0, 1]`. Several may be high at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BiometricSignals {
    pub yelling: f32,
    pub whispering: f32,
    pub stammering: f32,
    pub hesitating: f32,
}

/// Signal names in annotation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Yelling,
    Whispering,
    Stammering,
    Hesitating,
}

impl Reaction {
    pub const ALL: [Reaction; 4] = [
        Reaction::Yelling,
        Reaction::Whispering,
        Reaction::Stammering,
        Reaction::Hesitating,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Reaction::Yelling => "Yelling",
            Reaction::Whispering => "Whispering",
            Reaction::Stammering => "Stammering",
            Reaction::Hesitating => "Hesitating",
        }
    }

    /// Score above which the presentation layer shows a reaction badge.
    pub fn activation_threshold(self) -> f32 {
        match self {
            Reaction::Yelling | Reaction::Whispering => 0.6,
            Reaction::Stammering => 0.65,
            Reaction::Hesitating => 0.7,
        }
    }
}

impl BiometricSignals {
    pub fn score(&self, reaction: Reaction) -> f32 {
        match reaction {
            Reaction::Yelling => self.yelling,
            Reaction::Whispering => self.whispering,
            Reaction::Stammering => self.stammering,
            Reaction::Hesitating => self.hesitating,
        }
    }

    /// Inline marker embedded in the text sent to the dialogue model.
    pub fn annotation(&self) -> String {
        format!(
            "[BIOMETRICS: Yelling={:.2}, Whispering={:.2}, Stammering={:.2}, Hesitating={:.2}]",
            self.yelling, self.whispering, self.stammering, self.hesitating
        )
    }

    /// Signals strictly above their activation threshold, in annotation order.
    pub fn active_reactions(&self) -> Vec<Reaction> {
        Reaction::ALL
            .into_iter()
            .filter(|reaction| self.score(*reaction) > reaction.activation_threshold())
            .collect()
    }

    fn clamped(self) -> Self {
        Self {
            yelling: unit(self.yelling),
            whispering: unit(self.whispering),
            stammering: unit(self.stammering),
            hesitating: unit(self.hesitating),
        }
    }
}

/// Empirical constants behind the four detectors.
///
/// Defaults reproduce the shipped behaviour; a YAML tuning file can override
/// any subset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierTuning {
    pub window_ms: u64,
    pub history_len: usize,
    /// Frame is speech when corrected RMS exceeds `noise_rms * speech_factor`.
    pub speech_factor: f32,
    pub yell_start: f32,
    pub yell_full: f32,
    pub whisper_ceiling: f32,
    pub stammer_span: usize,
    pub stammer_min_history: usize,
    /// Divisor applied to the normalized delta variance. Tuned high so only
    /// pronounced stop-start patterns register.
    pub stammer_scale: f32,
    pub hesitation_floor_ms: u64,
    pub hesitation_ramp_ms: u64,
}

impl Default for ClassifierTuning {
    fn default() -> Self {
        Self {
            window_ms: 2_000,
            history_len: 100,
            speech_factor: 1.5,
            yell_start: 1.5,
            yell_full: 2.5,
            whisper_ceiling: 0.4,
            stammer_span: 50,
            stammer_min_history: 20,
            stammer_scale: 4.0,
            hesitation_floor_ms: 3_000,
            hesitation_ramp_ms: 5_000,
        }
    }
}

/// Frame RMS with the ambient noise level subtracted, never negative.
pub fn corrected_rms(frame_rms: f32, profile: &CalibrationProfile) -> f32 {
    (frame_rms - profile.noise_rms()).max(0.0)
}

/// Linear ramp from `yell_start * voice` to `yell_full * voice`.
pub fn yelling_score(
    avg_rms: f32,
    profile: &CalibrationProfile,
    tuning: &ClassifierTuning,
) -> f32 {
    let start = profile.voice_rms() * tuning.yell_start;
    let full = profile.voice_rms() * tuning.yell_full;
    if avg_rms <= start {
        return 0.0;
    }
    let span = full - start;
    if span <= 0.0 {
        return 1.0;
    }
    unit((avg_rms - start) / span)
}

/// Quiet and sibilant at once. Zero if either condition fails.
///
/// Near the loudness ceiling the quietness factor falls to zero while ZCR noise
/// can flip the sibilance test, so the score is not smooth there.
pub fn whispering_score(
    avg_rms: f32,
    avg_zcr: f32,
    profile: &CalibrationProfile,
    tuning: &ClassifierTuning,
) -> f32 {
    let ceiling = profile.voice_rms() * tuning.whisper_ceiling;
    let sibilance = profile.sibilance_threshold();
    let quiet = avg_rms < ceiling;
    let sibilant = avg_zcr > sibilance;
    if !quiet || !sibilant || ceiling <= 0.0 {
        return 0.0;
    }
    let quietness = 1.0 - avg_rms / ceiling;
    // A zero threshold means any crossing counts as fully sibilant.
    let sibilance_factor = if sibilance > 0.0 {
        avg_zcr / sibilance
    } else {
        1.0
    };
    unit(quietness * sibilance_factor)
}

/// Variance of consecutive corrected-RMS deltas over the most recent
/// `stammer_span` entries, normalized by `voice_rms²`.
pub fn stammering_score<'a, I>(
    history: I,
    profile: &CalibrationProfile,
    tuning: &ClassifierTuning,
) -> f32
where
    I: IntoIterator<Item = &'a f32>,
    I::IntoIter: ExactSizeIterator,
{
    let history = history.into_iter();
    let len = history.len();
    if len < tuning.stammer_min_history.max(2) {
        return 0.0;
    }
    let recent: Vec<f32> = history
        .skip(len.saturating_sub(tuning.stammer_span))
        .copied()
        .collect();
    let deltas: Vec<f32> = recent
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .collect();
    if deltas.is_empty() {
        return 0.0;
    }
    let count = deltas.len() as f32;
    let mean = deltas.iter().sum::<f32>() / count;
    let variance = deltas.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / count;
    let voice = profile.voice_rms();
    let normalized = variance / (voice * voice);
    if tuning.stammer_scale <= 0.0 {
        return if normalized > 0.0 { 1.0 } else { 0.0 };
    }
    unit(normalized / tuning.stammer_scale)
}

/// Zero below the floor, then a linear ramp that saturates after `hesitation_ramp_ms`.
pub fn hesitation_score(silence_ms: u64, tuning: &ClassifierTuning) -> f32 {
    if silence_ms <= tuning.hesitation_floor_ms {
        return 0.0;
    }
    if tuning.hesitation_ramp_ms == 0 {
        return 1.0;
    }
    let over = (silence_ms - tuning.hesitation_floor_ms) as f32;
    unit(over / tuning.hesitation_ramp_ms as f32)
}

/// Score one window. An empty window scores zero everywhere.
pub fn compute_signals<'a, W, H>(
    window: W,
    rms_history: H,
    silence_ms: Option<u64>,
    profile: &CalibrationProfile,
    tuning: &ClassifierTuning,
) -> BiometricSignals
where
    W: IntoIterator<Item = &'a AcousticFrame>,
    H: IntoIterator<Item = &'a f32>,
    H::IntoIter: ExactSizeIterator,
{
    let mut count = 0usize;
    let mut rms_sum = 0.0f32;
    let mut zcr_sum = 0.0f32;
    for frame in window {
        count += 1;
        rms_sum += corrected_rms(frame.rms, profile);
        zcr_sum += frame.zcr;
    }
    if count == 0 {
        return BiometricSignals::default();
    }
    let avg_rms = rms_sum / count as f32;
    let avg_zcr = zcr_sum / count as f32;

    BiometricSignals {
        yelling: yelling_score(avg_rms, profile, tuning),
        whispering: whispering_score(avg_rms, avg_zcr, profile, tuning),
        stammering: stammering_score(rms_history, profile, tuning),
        hesitating: silence_ms.map_or(0.0, |ms| hesitation_score(ms, tuning)),
    }
    .clamped()
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
