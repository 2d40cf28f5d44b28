//! Voice-delivery biometrics: per-session calibration and live scoring.
//!
//! Calibration turns a silence phase and a voice phase into a
//! [`CalibrationProfile`]. The [`BiometricClassifier`] then scores a trailing
//! window of frames against that profile for yelling, whispering, stammering,
//! and hesitation.

mod calibration;
mod classifier;
mod profile;
mod signals;

pub use calibration::{
    CalibrationController, CalibrationPhase, CalibrationState, CalibrationTiming,
    SILENCE_PHASE_MS, VOICE_PHASE_MS,
};
pub use classifier::BiometricClassifier;
pub use profile::{CalibrationProfile, SIBILANCE_FACTOR, VOICE_RMS_FLOOR};
pub use signals::{
    compute_signals, corrected_rms, hesitation_score, stammering_score, whispering_score,
    yelling_score, BiometricSignals, ClassifierTuning, Reaction,
};
