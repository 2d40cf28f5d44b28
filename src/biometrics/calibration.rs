//! Two-phase calibration: ambient silence, then the player's normal voice.
//!
//! The controller never advances on its own. The caller starts each phase,
//! feeds frames until [`CalibrationController::push_frame`] returns `true`, and
//! then moves on. Phase time is measured on the frames' audio clock, anchored
//! at the first frame of the phase.

use super::profile::CalibrationProfile;
use crate::audio::AcousticFrame;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SILENCE_PHASE_MS: u64 = 2_000;
pub const VOICE_PHASE_MS: u64 = 3_000;

/// Fixed phase lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationTiming {
    pub silence_ms: u64,
    pub voice_ms: u64,
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            silence_ms: SILENCE_PHASE_MS,
            voice_ms: VOICE_PHASE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalibrationPhase {
    Idle,
    MeasuringSilence,
    MeasuringVoice,
    Complete,
}

impl CalibrationPhase {
    pub fn label(self) -> &'static str {
        match self {
            CalibrationPhase::Idle => "idle",
            CalibrationPhase::MeasuringSilence => "measuring-silence",
            CalibrationPhase::MeasuringVoice => "measuring-voice",
            CalibrationPhase::Complete => "complete",
        }
    }

    pub fn status_message(self) -> &'static str {
        match self {
            CalibrationPhase::Idle => "STANDBY...",
            CalibrationPhase::MeasuringSilence => {
                "ESTABLISHING SECURE LINE... Please remain SILENT"
            }
            CalibrationPhase::MeasuringVoice => {
                "VOICE PRINT REQUIRED... Please SPEAK now - say anything"
            }
            CalibrationPhase::Complete => "CALIBRATION COMPLETE",
        }
    }
}

/// Snapshot pushed to the presentation layer on every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationState {
    pub phase: CalibrationPhase,
    pub progress: f32,
    #[serde(rename = "message")]
    pub status_message: String,
}

impl CalibrationState {
    fn new(phase: CalibrationPhase, progress: f32) -> Self {
        Self {
            phase,
            progress: progress.clamp(0.0, 1.0),
            status_message: phase.status_message().to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PhaseClock {
    started_at: Option<u64>,
    elapsed_ms: u64,
    finished: bool,
}

impl PhaseClock {
    fn tick(&mut self, timestamp: u64) -> u64 {
        let start = *self.started_at.get_or_insert(timestamp);
        self.elapsed_ms = timestamp.saturating_sub(start);
        self.elapsed_ms
    }
}

pub struct CalibrationController {
    timing: CalibrationTiming,
    phase: CalibrationPhase,
    clock: PhaseClock,
    silence_frames: Vec<AcousticFrame>,
    voice_frames: Vec<AcousticFrame>,
    profile: Option<Arc<CalibrationProfile>>,
    listener: Option<Sender<CalibrationState>>,
}

impl Default for CalibrationController {
    fn default() -> Self {
        Self::new(CalibrationTiming::default())
    }
}

impl CalibrationController {
    pub fn new(timing: CalibrationTiming) -> Self {
        Self {
            timing,
            phase: CalibrationPhase::Idle,
            clock: PhaseClock::default(),
            silence_frames: Vec::new(),
            voice_frames: Vec::new(),
            profile: None,
            listener: None,
        }
    }

    /// Route state changes to the presentation layer. Sends never block; a
    /// full or closed channel just misses the update.
    pub fn set_listener(&mut self, listener: Sender<CalibrationState>) {
        self.listener = Some(listener);
    }

    /// Stop sending updates; drops the sender so the receiver sees disconnect.
    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub fn timing(&self) -> CalibrationTiming {
        self.timing
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn state(&self) -> CalibrationState {
        CalibrationState::new(self.phase, self.progress())
    }

    pub fn profile(&self) -> Option<Arc<CalibrationProfile>> {
        self.profile.clone()
    }

    pub fn silence_frame_count(&self) -> usize {
        self.silence_frames.len()
    }

    pub fn voice_frame_count(&self) -> usize {
        self.voice_frames.len()
    }

    pub fn start_silence_phase(&mut self) {
        self.silence_frames.clear();
        self.enter(CalibrationPhase::MeasuringSilence);
    }

    pub fn start_voice_phase(&mut self) {
        self.voice_frames.clear();
        self.enter(CalibrationPhase::MeasuringVoice);
    }

    fn enter(&mut self, phase: CalibrationPhase) {
        self.phase = phase;
        self.clock = PhaseClock::default();
        self.emit(0.0);
    }

    fn phase_duration(&self) -> Option<u64> {
        match self.phase {
            CalibrationPhase::MeasuringSilence => Some(self.timing.silence_ms),
            CalibrationPhase::MeasuringVoice => Some(self.timing.voice_ms),
            CalibrationPhase::Idle | CalibrationPhase::Complete => None,
        }
    }

    fn progress(&self) -> f32 {
        match self.phase {
            CalibrationPhase::Complete => 1.0,
            CalibrationPhase::Idle => 0.0,
            _ => match self.phase_duration() {
                Some(0) => 1.0,
                Some(duration) => (self.clock.elapsed_ms as f32 / duration as f32).min(1.0),
                None => 0.0,
            },
        }
    }

    /// Record a frame for the active phase.
    ///
    /// Returns `true` exactly once, on the frame where phase time first reaches
    /// the phase duration. Frames arriving while idle, complete, or after the
    /// phase has finished are ignored.
    pub fn push_frame(&mut self, frame: AcousticFrame) -> bool {
        let Some(duration) = self.phase_duration() else {
            return false;
        };
        if self.clock.finished {
            return false;
        }

        match self.phase {
            CalibrationPhase::MeasuringSilence => self.silence_frames.push(frame),
            CalibrationPhase::MeasuringVoice => self.voice_frames.push(frame),
            CalibrationPhase::Idle | CalibrationPhase::Complete => return false,
        }

        let elapsed = self.clock.tick(frame.timestamp);
        let finished = elapsed >= duration;
        self.clock.finished = finished;
        self.emit(self.progress());
        finished
    }

    /// Reduce the collected frames into the session baseline.
    ///
    /// Empty phases average to zero, which yields a degenerate but valid
    /// profile; retrying is the caller's decision.
    pub fn compute_profile(&mut self) -> Arc<CalibrationProfile> {
        let (noise_rms, noise_zcr) = means(&self.silence_frames);
        let (voice_rms, voice_zcr) = means(&self.voice_frames);
        let profile = Arc::new(CalibrationProfile::from_measurements(
            noise_rms, noise_zcr, voice_rms, voice_zcr,
        ));
        self.profile = Some(profile.clone());
        self.phase = CalibrationPhase::Complete;
        self.emit(1.0);
        profile
    }

    /// Discard everything and return to idle, e.g. for a player-requested retry.
    pub fn reset(&mut self) {
        self.silence_frames.clear();
        self.voice_frames.clear();
        self.clock = PhaseClock::default();
        self.phase = CalibrationPhase::Idle;
        self.profile = None;
        self.emit(0.0);
    }

    fn emit(&self, progress: f32) {
        if let Some(listener) = &self.listener {
            let _ = listener.try_send(CalibrationState::new(self.phase, progress));
        }
    }
}

fn means(frames: &[AcousticFrame]) -> (f32, f32) {
    if frames.is_empty() {
        return (0.0, 0.0);
    }
    let count = frames.len() as f32;
    let rms = frames.iter().map(|f| f.rms).sum::<f32>() / count;
    let zcr = frames.iter().map(|f| f.zcr).sum::<f32>() / count;
    (rms, zcr)
}
