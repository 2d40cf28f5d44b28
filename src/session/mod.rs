//! One negotiation session: calibrate once, then record and score turns.
//!
//! Frames reach the calibration controller or the classifier through the
//! capture source's single analysis slot. Both live behind mutexes because the
//! callbacks run on the analysis thread while the session drives phases from
//! the caller's thread.

mod turn;

pub use turn::{
    transcript, BiometricHistory, ConversationEntry, HistoryEntry, Role, TurnOutcome,
    TurnSubmission, TRANSMITTING_PLACEHOLDER,
};

use crate::audio::{AnalysisMode, CaptureSource, WavEncoder, TARGET_RATE};
use crate::biometrics::{
    BiometricClassifier, BiometricSignals, CalibrationController, CalibrationPhase,
    CalibrationProfile, CalibrationState,
};
use crate::config::BiometricsConfig;
use crate::{content_logging_enabled, lock_or_recover};
use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Slack on top of a phase's own length before calibration gives up waiting.
const PHASE_GRACE: Duration = Duration::from_secs(5);

pub struct NegotiationSession<S: CaptureSource> {
    source: S,
    config: BiometricsConfig,
    calibration: Arc<Mutex<CalibrationController>>,
    classifier: Option<Arc<Mutex<BiometricClassifier>>>,
    biometric_log: BiometricHistory,
    conversation: Vec<ConversationEntry>,
    recording: bool,
}

impl<S: CaptureSource> NegotiationSession<S> {
    pub fn new(source: S, config: BiometricsConfig) -> Self {
        let controller = CalibrationController::new(config.timing);
        Self {
            source,
            config,
            calibration: Arc::new(Mutex::new(controller)),
            classifier: None,
            biometric_log: BiometricHistory::default(),
            conversation: Vec::new(),
            recording: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    pub fn config(&self) -> &BiometricsConfig {
        &self.config
    }

    pub fn calibration_state(&self) -> CalibrationState {
        lock_or_recover(&self.calibration, "calibration").state()
    }

    pub fn profile(&self) -> Option<Arc<CalibrationProfile>> {
        lock_or_recover(&self.calibration, "calibration").profile()
    }

    pub fn is_calibrated(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Run both calibration phases, then switch the frame stream to live scoring.
    ///
    /// Blocks for roughly the two phase lengths. `listener` receives every
    /// state change of this run, including per-frame progress, and is dropped
    /// when the run ends.
    pub fn calibrate(
        &mut self,
        listener: Option<Sender<CalibrationState>>,
    ) -> Result<Arc<CalibrationProfile>> {
        {
            let mut controller = lock_or_recover(&self.calibration, "calibration");
            controller.reset();
            if let Some(listener) = listener {
                controller.set_listener(listener);
            }
        }
        let result = self.run_calibration();
        lock_or_recover(&self.calibration, "calibration").clear_listener();
        result
    }

    fn run_calibration(&mut self) -> Result<Arc<CalibrationProfile>> {
        self.source
            .resume()
            .context("failed to resume audio input")?;
        self.source.clear_analysis_callback();
        self.classifier = None;

        let timing = self.config.timing;
        let mut outcome = self.run_phase(CalibrationPhase::MeasuringSilence, timing.silence_ms);
        if outcome.is_ok() {
            outcome = self.run_phase(CalibrationPhase::MeasuringVoice, timing.voice_ms);
        }
        self.source.clear_analysis_callback();
        outcome?;

        let profile = lock_or_recover(&self.calibration, "calibration").compute_profile();
        tracing::info!(
            noise_rms = profile.noise_rms(),
            noise_zcr = profile.noise_zcr(),
            voice_rms = profile.voice_rms(),
            voice_zcr = profile.voice_zcr(),
            sibilance_threshold = profile.sibilance_threshold(),
            degenerate = profile.is_degenerate(),
            "calibration complete"
        );
        if profile.is_degenerate() {
            tracing::warn!("calibration produced a degenerate profile; offer a retry");
        }
        self.go_live(profile.clone())?;
        Ok(profile)
    }

    /// Discard the current profile and calibrate again.
    pub fn retry_calibration(
        &mut self,
        listener: Option<Sender<CalibrationState>>,
    ) -> Result<Arc<CalibrationProfile>> {
        if self.recording {
            let _ = self.source.stop_capture();
            self.recording = false;
        }
        tracing::info!("calibration retry requested");
        self.calibrate(listener)
    }

    /// Calibrate, then retry while the profile is degenerate, for at most
    /// `attempts` runs in total. `listener` is asked for a fresh progress
    /// sender before each run, with the 1-based attempt number.
    ///
    /// Returns the last profile even if it is still degenerate.
    pub fn calibrate_with_retries<F>(
        &mut self,
        attempts: u32,
        mut listener: F,
    ) -> Result<Arc<CalibrationProfile>>
    where
        F: FnMut(u32) -> Option<Sender<CalibrationState>>,
    {
        let attempts = attempts.max(1);
        let mut profile = self.calibrate(listener(1))?;
        for attempt in 2..=attempts {
            if !profile.is_degenerate() {
                break;
            }
            tracing::info!(attempt, attempts, "retrying degenerate calibration");
            profile = self.retry_calibration(listener(attempt))?;
        }
        Ok(profile)
    }

    fn run_phase(&mut self, phase: CalibrationPhase, duration_ms: u64) -> Result<()> {
        {
            let mut controller = lock_or_recover(&self.calibration, "calibration");
            match phase {
                CalibrationPhase::MeasuringSilence => controller.start_silence_phase(),
                CalibrationPhase::MeasuringVoice => controller.start_voice_phase(),
                CalibrationPhase::Idle | CalibrationPhase::Complete => {
                    bail!("'{}' is not a measuring phase", phase.label())
                }
            }
        }

        let (done_tx, done_rx) = bounded::<()>(1);
        let controller = self.calibration.clone();
        self.source.set_analysis_callback(
            AnalysisMode::Calibration,
            Box::new(move |frame| {
                if lock_or_recover(&controller, "calibration").push_frame(frame) {
                    let _ = done_tx.try_send(());
                }
            }),
        )?;

        let timeout = Duration::from_millis(duration_ms) + PHASE_GRACE;
        match done_rx.recv_timeout(timeout) {
            Ok(()) => {
                tracing::debug!(phase = phase.label(), "calibration phase complete");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(anyhow!(
                "calibration phase '{}' timed out after {} ms; is the microphone delivering audio?",
                phase.label(),
                timeout.as_millis()
            )),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!(
                "calibration phase '{}' lost its frame source",
                phase.label()
            )),
        }
    }

    fn go_live(&mut self, profile: Arc<CalibrationProfile>) -> Result<()> {
        let classifier = Arc::new(Mutex::new(BiometricClassifier::with_tuning(
            profile,
            self.config.tuning,
        )));
        let sink = classifier.clone();
        self.source.set_analysis_callback(
            AnalysisMode::Live,
            Box::new(move |frame| lock_or_recover(&sink, "classifier").push_frame(frame)),
        )?;
        self.classifier = Some(classifier);
        Ok(())
    }

    /// Live read of the classifier; zeros before calibration.
    pub fn current_signals(&self) -> BiometricSignals {
        self.classifier
            .as_ref()
            .map(|c| lock_or_recover(c, "classifier").signals())
            .unwrap_or_default()
    }

    /// Begin an utterance: fresh classifier state, empty PCM buffer.
    pub fn start_turn(&mut self) -> Result<()> {
        let Some(classifier) = &self.classifier else {
            bail!("calibrate before recording a turn");
        };
        if self.recording {
            bail!("a turn is already being recorded");
        }
        self.source
            .resume()
            .context("failed to resume audio input")?;
        lock_or_recover(classifier, "classifier").reset();
        self.source.start_capture()?;
        self.recording = true;
        Ok(())
    }

    /// End the utterance and build the submission.
    ///
    /// An empty capture returns [`TurnOutcome::NothingToSend`] and leaves the
    /// biometric log and conversation untouched.
    pub fn stop_turn(&mut self) -> Result<TurnOutcome> {
        if !self.recording {
            bail!("no turn is being recorded");
        }
        self.recording = false;
        let chunks = self.source.stop_capture()?;
        let signals = self.current_signals();

        let sample_count: usize = chunks.iter().map(Vec::len).sum();
        if sample_count == 0 {
            tracing::info!("turn captured no audio; nothing to send");
            return Ok(TurnOutcome::NothingToSend { signals });
        }

        let audio_wav = WavEncoder::with_target_rate(TARGET_RATE)
            .encode(&chunks, self.source.sample_rate())
            .context("failed to encode turn audio")?;
        self.biometric_log.push(signals);

        let history = self.conversation.iter().map(HistoryEntry::from).collect();
        self.conversation.push(ConversationEntry {
            role: Role::Negotiator,
            text: TRANSMITTING_PLACEHOLDER.to_string(),
            biometrics: Some(signals),
            timestamp: now_ms(),
        });

        tracing::info!(
            turn = self.biometric_log.len(),
            chunks = chunks.len(),
            samples = sample_count,
            wav_bytes = audio_wav.len(),
            "turn captured"
        );
        if content_logging_enabled() {
            tracing::debug!(
                turn = self.biometric_log.len(),
                yelling = signals.yelling,
                whispering = signals.whispering,
                stammering = signals.stammering,
                hesitating = signals.hesitating,
                "turn signals"
            );
        }

        Ok(TurnOutcome::Submit(TurnSubmission {
            audio_wav,
            biometrics: signals,
            history,
        }))
    }

    /// Append the model's reply to the conversation.
    pub fn record_reply(&mut self, text: impl Into<String>) {
        self.conversation.push(ConversationEntry {
            role: Role::Suspect,
            text: text.into(),
            biometrics: None,
            timestamp: now_ms(),
        });
    }

    /// Replace the newest entry for `role`, e.g. once a transcription arrives.
    /// Returns false when there is no such entry.
    pub fn update_last_entry(&mut self, role: Role, text: impl Into<String>) -> bool {
        match self.conversation.iter_mut().rev().find(|e| e.role == role) {
            Some(entry) => {
                entry.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn conversation(&self) -> &[ConversationEntry] {
        &self.conversation
    }

    pub fn biometric_history(&self) -> &BiometricHistory {
        &self.biometric_log
    }

    /// Transcript plus biometric averages for the end-of-session debrief.
    pub fn debrief(&self) -> String {
        format!(
            "## Transcript\n{}\n\n## Biometric Summary\n{}",
            transcript(&self.conversation),
            self.biometric_log.summary()
        )
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests;
