//! Under Pressure command-line entrypoint.
//!
//! Opens the microphone, runs the two-phase voice calibration, and then
//! optionally streams live signal readings or records a single turn.
//!
//! # Threads
//!
//! - cpal callback: downmixes and forwards samples, never blocks
//! - Analysis worker: frames, calibration, and classification
//! - Progress printer: renders calibration state updates
//! - Main thread: drives phases, monitoring, and turn capture

mod cli_utils;
mod display;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver};
use std::io::{self, Write};
use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use under_pressure::audio::AudioEngine;
use under_pressure::biometrics::{CalibrationPhase, CalibrationProfile, CalibrationState};
use under_pressure::config::AppConfig;
use under_pressure::session::{NegotiationSession, TurnOutcome};
use under_pressure::{init_logging, log_panic};

use crate::cli_utils::{list_input_devices, write_wav};
use crate::display::{format_calibration_line, format_session_summary, format_signals_line};

/// Max pending calibration updates before the controller starts dropping them.
const PROGRESS_CHANNEL_CAPACITY: usize = 256;

const MONITOR_INTERVAL: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    let mut config = AppConfig::parse();
    if config.list_input_devices {
        list_input_devices()?;
        return Ok(());
    }

    config.validate()?;
    let log_path = init_logging(&config);
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        default_hook(info);
    }));
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = ?log_path,
        "under-pressure started"
    );

    let biometrics = config.biometrics_config()?;
    let mut engine = AudioEngine::new(config.input_device.clone(), biometrics.analysis);
    engine
        .initialize()
        .context("microphone unavailable; check the input device and permissions")?;
    println!(
        "Input: {} ({} Hz, {:?})",
        engine.device_name().unwrap_or("unknown"),
        engine.sample_rate(),
        engine.processing()
    );

    let mut session = NegotiationSession::new(engine, biometrics);
    let profile = run_calibration(&mut session, config.calibration_attempts)?;
    report_profile(&profile, config.json || config.profile_json)?;

    if let Some(ms) = config.monitor_ms {
        monitor(&session, Duration::from_millis(ms), config.json)?;
    }
    if let Some(ms) = config.record_ms {
        record_turn(&mut session, &config, Duration::from_millis(ms))?;
        if !config.json {
            println!("{}", format_session_summary(session.biometric_history()));
        }
    }

    tracing::info!(
        dropped_frames = session.source().dropped_events(),
        turns = session.biometric_history().len(),
        "under-pressure exiting"
    );
    session.into_source().teardown();
    Ok(())
}

fn run_calibration(
    session: &mut NegotiationSession<AudioEngine>,
    attempts: u32,
) -> Result<Arc<CalibrationProfile>> {
    let mut printers = Vec::new();
    let result = session.calibrate_with_retries(attempts, |attempt| {
        if attempt > 1 {
            println!("Voice barely registered; calibrating again ({attempt}/{attempts}).");
        }
        let (state_tx, state_rx) = bounded::<CalibrationState>(PROGRESS_CHANNEL_CAPACITY);
        printers.push(spawn_progress_printer(state_rx));
        Some(state_tx)
    });
    for printer in printers {
        let _ = printer.join();
    }
    result
}

fn spawn_progress_printer(state_rx: Receiver<CalibrationState>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut stdout = io::stdout();
        let mut last_phase = CalibrationPhase::Idle;
        // Ends when the session drops the sender after the run.
        for state in state_rx.iter() {
            if state.phase != last_phase && last_phase != CalibrationPhase::Idle {
                let _ = writeln!(stdout);
            }
            last_phase = state.phase;
            let _ = write!(stdout, "\r{}", format_calibration_line(&state));
            let _ = stdout.flush();
        }
        let _ = writeln!(stdout);
    })
}

fn report_profile(profile: &CalibrationProfile, print_json: bool) -> Result<()> {
    if print_json {
        println!("{}", serde_json::to_string(profile)?);
    } else {
        println!(
            "Calibrated: noise rms {:.4}, voice rms {:.4}, sibilance zcr {:.3}",
            profile.noise_rms(),
            profile.voice_rms(),
            profile.sibilance_threshold()
        );
    }
    if profile.is_degenerate() {
        eprintln!(
            "Warning: your voice barely rose above the room noise. \
             Speak at a normal volume, or raise --calibration-attempts."
        );
    }
    Ok(())
}

fn monitor(
    session: &NegotiationSession<AudioEngine>,
    duration: Duration,
    json: bool,
) -> Result<()> {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        thread::sleep(MONITOR_INTERVAL);
        if let Some(fault) = session.source().fault() {
            anyhow::bail!("audio stream failed: {fault}");
        }
        let signals = session.current_signals();
        if json {
            println!("{}", serde_json::to_string(&signals)?);
        } else {
            println!("{}", format_signals_line(&signals));
        }
    }
    Ok(())
}

fn record_turn(
    session: &mut NegotiationSession<AudioEngine>,
    config: &AppConfig,
    duration: Duration,
) -> Result<()> {
    if !config.json {
        println!("Recording for {:.1}s, speak now...", duration.as_secs_f32());
    }
    session.start_turn()?;
    thread::sleep(duration);
    match session.stop_turn()? {
        TurnOutcome::NothingToSend { .. } => {
            println!("No audio captured; nothing to send.");
        }
        TurnOutcome::Submit(submission) => {
            if let Some(path) = &config.output {
                write_wav(path, &submission.audio_wav)?;
                if !config.json {
                    println!(
                        "Wrote {} bytes to {}",
                        submission.audio_wav.len(),
                        path.display()
                    );
                }
            }
            if config.json {
                println!("{}", serde_json::to_string(&submission.to_json())?);
            } else {
                println!("{}", submission.annotation());
                println!("{}", format_signals_line(&submission.biometrics));
            }
        }
    }
    Ok(())
}
