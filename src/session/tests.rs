use super::{NegotiationSession, Role, TurnOutcome, TRANSMITTING_PLACEHOLDER};
use crate::audio::{
    AnalysisConfig, AnalysisMode, AnalysisPipeline, InputHandle, WaveformTap, WAV_HEADER_LEN,
};
use crate::biometrics::{
    BiometricSignals, CalibrationPhase, CalibrationProfile, CalibrationState, CalibrationTiming,
};
use crate::config::BiometricsConfig;
use crossbeam_channel::{unbounded, Receiver};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const RATE: u32 = 16_000;
const WINDOW: usize = 160;

fn test_config() -> BiometricsConfig {
    BiometricsConfig {
        analysis: AnalysisConfig {
            window_samples: WINDOW,
            channel_capacity: 1024,
        },
        timing: CalibrationTiming {
            silence_ms: 200,
            voice_ms: 300,
        },
        ..BiometricsConfig::default()
    }
}

fn offline_session() -> (NegotiationSession<AnalysisPipeline>, InputHandle) {
    let config = test_config();
    let pipeline = AnalysisPipeline::new(config.analysis, RATE, WaveformTap::new());
    let input = pipeline.input();
    (NegotiationSession::new(pipeline, config), input)
}

fn tone(freq: f32, amplitude: f32, start: usize, len: usize) -> Vec<f32> {
    (start..start + len)
        .map(|n| amplitude * (2.0 * PI * freq * n as f32 / RATE as f32).sin())
        .collect()
}

const ROOM_AMPLITUDE: f32 = 0.01;
const VOICE_AMPLITUDE: f32 = 0.2;

fn spawn_performer(
    input: InputHandle,
    states: Receiver<CalibrationState>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    spawn_speaker(input, states, stop, VOICE_AMPLITUDE)
}

/// Plays quiet room tone until the voice phase starts, then a tone at
/// `voice_amplitude`, until calibration completes or `stop` is set.
fn spawn_speaker(
    input: InputHandle,
    states: Receiver<CalibrationState>,
    stop: Arc<AtomicBool>,
    voice_amplitude: f32,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut phase = CalibrationPhase::Idle;
        let mut offset = 0usize;
        for _ in 0..5_000 {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            for state in states.try_iter() {
                phase = state.phase;
            }
            if phase == CalibrationPhase::Complete {
                break;
            }
            let block = match phase {
                CalibrationPhase::MeasuringVoice => tone(220.0, voice_amplitude, offset, WINDOW),
                _ => tone(1_000.0, ROOM_AMPLITUDE, offset, WINDOW),
            };
            input.push_f32(&block);
            offset += WINDOW;
            thread::sleep(Duration::from_millis(1));
        }
    })
}

fn calibrated_session() -> (NegotiationSession<AnalysisPipeline>, InputHandle) {
    let (mut session, input) = offline_session();
    let (tx, rx) = unbounded();
    let stop = Arc::new(AtomicBool::new(false));
    let performer = spawn_performer(input.clone(), rx, stop.clone());
    let result = session.calibrate(Some(tx));
    stop.store(true, Ordering::Relaxed);
    performer.join().unwrap();
    result.unwrap();
    // Let trailing performer frames drain before a test starts its own turn.
    assert!(session.source().flush(Duration::from_secs(2)));
    (session, input)
}

#[test]
fn calibration_produces_a_usable_profile_and_goes_live() {
    let (session, _input) = calibrated_session();
    let profile = session.profile().unwrap();
    assert!(profile.noise_rms() > 0.0 && profile.noise_rms() < 0.02);
    assert!(profile.voice_rms() > 0.05);
    assert!(profile.voice_zcr() < profile.noise_zcr());
    assert!(!profile.is_degenerate());
    assert!(session.is_calibrated());
    assert_eq!(session.calibration_state().phase, CalibrationPhase::Complete);
    assert_eq!(session.source().mode(), AnalysisMode::Live);
}

#[test]
fn loud_turn_is_submitted_with_yelling_signal() {
    let (mut session, input) = calibrated_session();
    session.record_reply("Who is this?");

    session.start_turn().unwrap();
    let loud = tone(220.0, 0.9, 0, WINDOW * 20);
    for block in loud.chunks(WINDOW) {
        input.push_f32(block);
    }
    let outcome = session.stop_turn().unwrap();

    let TurnOutcome::Submit(submission) = outcome else {
        panic!("expected a submission");
    };
    assert_eq!(submission.audio_wav.len(), WAV_HEADER_LEN + 2 * loud.len());
    assert_eq!(submission.biometrics.yelling, 1.0);
    assert_eq!(submission.history.len(), 1);
    assert_eq!(submission.history[0].role, Role::Suspect);

    assert_eq!(session.biometric_history().len(), 1);
    let last = session.conversation().last().unwrap();
    assert_eq!(last.role, Role::Negotiator);
    assert_eq!(last.text, TRANSMITTING_PLACEHOLDER);
    assert_eq!(last.biometrics, Some(submission.biometrics));
}

#[test]
fn empty_turn_is_skipped() {
    let (mut session, _input) = calibrated_session();
    session.start_turn().unwrap();
    let outcome = session.stop_turn().unwrap();
    assert!(matches!(outcome, TurnOutcome::NothingToSend { .. }));
    assert!(outcome.submission().is_none());
    assert!(session.biometric_history().is_empty());
    assert!(session.conversation().is_empty());
}

#[test]
fn turns_require_calibration() {
    let (mut session, _input) = offline_session();
    assert!(session.start_turn().is_err());
    assert!(session.stop_turn().is_err());
    assert_eq!(session.current_signals(), BiometricSignals::default());
}

#[test]
fn start_turn_twice_is_rejected() {
    let (mut session, _input) = calibrated_session();
    session.start_turn().unwrap();
    assert!(session.start_turn().is_err());
    assert!(session.is_recording());
}

#[test]
fn transcription_replaces_placeholder() {
    let (mut session, input) = calibrated_session();
    session.start_turn().unwrap();
    input.push_f32(&tone(220.0, 0.2, 0, WINDOW * 4));
    assert!(session.stop_turn().unwrap().submission().is_some());

    assert!(session.update_last_entry(Role::Negotiator, "Put the gun down."));
    assert!(!session.update_last_entry(Role::Suspect, "no reply yet"));
    assert_eq!(session.conversation()[0].text, "Put the gun down.");

    let debrief = session.debrief();
    assert!(debrief.contains("[Turn 1] NEGOTIATOR: Put the gun down. [Voice: Yell="));
    assert!(debrief.contains("Total turns: 1"));
}

#[test]
fn retry_calibration_replaces_the_profile() {
    let (mut session, input) = calibrated_session();
    let first = session.profile().unwrap();

    let (tx, rx) = unbounded();
    let stop = Arc::new(AtomicBool::new(false));
    let performer = spawn_performer(input, rx, stop.clone());
    let second = session.retry_calibration(Some(tx));
    stop.store(true, Ordering::Relaxed);
    performer.join().unwrap();

    let second = second.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(session.source().mode(), AnalysisMode::Live);
}

fn calibrate_with_speaker(
    session: &mut NegotiationSession<AnalysisPipeline>,
    input: &InputHandle,
    attempts: u32,
    voice_amplitude: f32,
) -> (Arc<CalibrationProfile>, u32) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut speakers = Vec::new();
    let mut runs = 0;
    let result = session.calibrate_with_retries(attempts, |attempt| {
        runs = attempt;
        let (tx, rx) = unbounded();
        speakers.push(spawn_speaker(
            input.clone(),
            rx,
            stop.clone(),
            voice_amplitude,
        ));
        Some(tx)
    });
    stop.store(true, Ordering::Relaxed);
    for speaker in speakers {
        speaker.join().unwrap();
    }
    (result.unwrap(), runs)
}

#[test]
fn silent_voice_phase_is_retried_until_attempts_run_out() {
    let (mut session, input) = offline_session();
    let (profile, runs) = calibrate_with_speaker(&mut session, &input, 2, ROOM_AMPLITUDE);
    assert_eq!(runs, 2);
    assert!(profile.is_degenerate());
    assert!(session.is_calibrated());
    assert_eq!(session.source().mode(), AnalysisMode::Live);
}

#[test]
fn usable_calibration_is_not_retried() {
    let (mut session, input) = offline_session();
    let (profile, runs) = calibrate_with_speaker(&mut session, &input, 3, VOICE_AMPLITUDE);
    assert_eq!(runs, 1);
    assert!(!profile.is_degenerate());
}
