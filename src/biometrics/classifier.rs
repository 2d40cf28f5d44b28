//! Stateful side of scoring: the trailing frame window, the corrected-RMS
//! history, and silence tracking.

use super::profile::CalibrationProfile;
use super::signals::{compute_signals, corrected_rms, BiometricSignals, ClassifierTuning};
use crate::audio::AcousticFrame;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct BiometricClassifier {
    profile: Arc<CalibrationProfile>,
    tuning: ClassifierTuning,
    window: VecDeque<AcousticFrame>,
    rms_history: VecDeque<f32>,
    silent_since: Option<u64>,
    last_speech_at: Option<u64>,
}

impl BiometricClassifier {
    pub fn new(profile: Arc<CalibrationProfile>) -> Self {
        Self::with_tuning(profile, ClassifierTuning::default())
    }

    pub fn with_tuning(profile: Arc<CalibrationProfile>, tuning: ClassifierTuning) -> Self {
        Self {
            profile,
            tuning,
            window: VecDeque::new(),
            rms_history: VecDeque::with_capacity(tuning.history_len),
            silent_since: None,
            last_speech_at: None,
        }
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    pub fn tuning(&self) -> &ClassifierTuning {
        &self.tuning
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn history_len(&self) -> usize {
        self.rms_history.len()
    }

    pub fn last_speech_at(&self) -> Option<u64> {
        self.last_speech_at
    }

    pub fn push_frame(&mut self, frame: AcousticFrame) {
        self.window.push_back(frame);
        let cutoff = frame.timestamp.saturating_sub(self.tuning.window_ms);
        while self
            .window
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            self.window.pop_front();
        }

        let effective = corrected_rms(frame.rms, &self.profile);
        self.rms_history.push_back(effective);
        while self.rms_history.len() > self.tuning.history_len {
            self.rms_history.pop_front();
        }

        let is_speech = effective > self.profile.noise_rms() * self.tuning.speech_factor;
        if is_speech {
            self.silent_since = None;
            self.last_speech_at = Some(frame.timestamp);
        } else if self.silent_since.is_none() {
            self.silent_since = Some(frame.timestamp);
        }
    }

    /// Silence measured up to the newest frame in the window.
    fn silence_ms(&self) -> Option<u64> {
        let start = self.silent_since?;
        let now = self.window.back()?.timestamp;
        Some(now.saturating_sub(start))
    }

    pub fn signals(&self) -> BiometricSignals {
        compute_signals(
            &self.window,
            &self.rms_history,
            self.silence_ms(),
            &self.profile,
            &self.tuning,
        )
    }

    /// Forget everything from the previous turn.
    pub fn reset(&mut self) {
        self.window.clear();
        self.rms_history.clear();
        self.silent_since = None;
        self.last_speech_at = None;
    }
}
