use super::defaults::{
    MAX_ANALYSIS_WINDOW_SAMPLES, MAX_CALIBRATION_ATTEMPTS, MAX_DEVICE_NAME_LEN, MAX_MONITOR_MS,
    MAX_PHASE_MS, MAX_RECORD_MS, MAX_TUNING_FILE_BYTES, MIN_ANALYSIS_WINDOW_SAMPLES,
    MIN_PHASE_MS, MIN_RECORD_MS,
};
use super::{AppConfig, BiometricsConfig};
use crate::audio::AnalysisConfig;
use crate::biometrics::{CalibrationTiming, ClassifierTuning};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::{fs, path::Path};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_ANALYSIS_WINDOW_SAMPLES..=MAX_ANALYSIS_WINDOW_SAMPLES)
            .contains(&self.analysis_window_samples)
            || !self.analysis_window_samples.is_power_of_two()
        {
            bail!(
                "--analysis-window-samples must be a power of two between {MIN_ANALYSIS_WINDOW_SAMPLES} and {MAX_ANALYSIS_WINDOW_SAMPLES}, got {}",
                self.analysis_window_samples
            );
        }
        if !(8..=4096).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 8 and 4096, got {}",
                self.channel_capacity
            );
        }
        if !(1..=MAX_CALIBRATION_ATTEMPTS).contains(&self.calibration_attempts) {
            bail!(
                "--calibration-attempts must be between 1 and {MAX_CALIBRATION_ATTEMPTS}, got {}",
                self.calibration_attempts
            );
        }
        if !(MIN_PHASE_MS..=MAX_PHASE_MS).contains(&self.silence_phase_ms) {
            bail!(
                "--silence-phase-ms must be between {MIN_PHASE_MS} and {MAX_PHASE_MS}, got {}",
                self.silence_phase_ms
            );
        }
        if !(MIN_PHASE_MS..=MAX_PHASE_MS).contains(&self.voice_phase_ms) {
            bail!(
                "--voice-phase-ms must be between {MIN_PHASE_MS} and {MAX_PHASE_MS}, got {}",
                self.voice_phase_ms
            );
        }
        if let Some(ms) = self.monitor_ms {
            if ms == 0 || ms > MAX_MONITOR_MS {
                bail!("--monitor-ms must be between 1 and {MAX_MONITOR_MS}, got {ms}");
            }
        }
        if let Some(ms) = self.record_ms {
            if !(MIN_RECORD_MS..=MAX_RECORD_MS).contains(&ms) {
                bail!("--record-ms must be between {MIN_RECORD_MS} and {MAX_RECORD_MS}, got {ms}");
            }
        }

        if let Some(output) = &self.output {
            if output.as_os_str().is_empty() {
                bail!("--output cannot be empty");
            }
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                if !parent.is_dir() {
                    bail!("--output directory '{}' does not exist", parent.display());
                }
            }
        }

        if let Some(device) = &self.input_device {
            let trimmed = device.trim();
            if trimmed.is_empty()
                || trimmed.len() > MAX_DEVICE_NAME_LEN
                || trimmed.chars().any(char::is_control)
            {
                bail!(
                    "--input-device must be 1-{MAX_DEVICE_NAME_LEN} characters with no control characters"
                );
            }
            self.input_device = Some(trimmed.to_string());
        }

        if let Some(path) = &mut self.tuning_file {
            // Store a canonical path so logs point at the file actually read.
            *path = path
                .canonicalize()
                .with_context(|| format!("failed to canonicalize tuning file '{}'", path.display()))?;
        }

        // Surface tuning errors at startup rather than after calibration.
        self.biometrics_config()?;
        Ok(())
    }

    /// Merge the tuning file with CLI overrides into the library-facing config.
    pub fn biometrics_config(&self) -> Result<BiometricsConfig> {
        let mut tuning = match &self.tuning_file {
            Some(path) => load_tuning_file(path)?,
            None => ClassifierTuning::default(),
        };
        if let Some(window_ms) = self.biometrics_window_ms {
            tuning.window_ms = window_ms;
        }
        if let Some(scale) = self.stammer_scale {
            tuning.stammer_scale = scale;
        }
        validate_tuning(&tuning)?;

        Ok(BiometricsConfig {
            analysis: AnalysisConfig::from(self),
            timing: CalibrationTiming {
                silence_ms: self.silence_phase_ms,
                voice_ms: self.voice_phase_ms,
            },
            tuning,
        })
    }
}

/// Read classifier overrides from YAML. Missing keys keep their defaults.
pub(super) fn load_tuning_file(path: &Path) -> Result<ClassifierTuning> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect tuning file '{}'", path.display()))?;
    if !metadata.is_file() {
        bail!("tuning file '{}' is not a file", path.display());
    }
    if metadata.len() > MAX_TUNING_FILE_BYTES {
        bail!(
            "tuning file '{}' exceeds {MAX_TUNING_FILE_BYTES} bytes",
            path.display()
        );
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read tuning file '{}'", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(ClassifierTuning::default());
    }
    serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse tuning file '{}'", path.display()))
}

pub(super) fn validate_tuning(tuning: &ClassifierTuning) -> Result<()> {
    if !(250..=10_000).contains(&tuning.window_ms) {
        bail!(
            "biometrics window must be between 250 and 10000 ms, got {}",
            tuning.window_ms
        );
    }
    if !(20..=1_000).contains(&tuning.history_len) {
        bail!(
            "history_len must be between 20 and 1000, got {}",
            tuning.history_len
        );
    }
    if tuning.stammer_span < 2 || tuning.stammer_span > tuning.history_len {
        bail!(
            "stammer_span must be between 2 and history_len ({}), got {}",
            tuning.history_len,
            tuning.stammer_span
        );
    }
    if tuning.stammer_min_history > tuning.history_len {
        bail!(
            "stammer_min_history ({}) cannot exceed history_len ({})",
            tuning.stammer_min_history,
            tuning.history_len
        );
    }
    for (name, value) in [
        ("speech_factor", tuning.speech_factor),
        ("yell_start", tuning.yell_start),
        ("whisper_ceiling", tuning.whisper_ceiling),
        ("stammer_scale", tuning.stammer_scale),
    ] {
        if !value.is_finite() || value <= 0.0 || value > 100.0 {
            bail!("{name} must be greater than 0 and at most 100, got {value}");
        }
    }
    if !tuning.yell_full.is_finite() || tuning.yell_full <= tuning.yell_start {
        bail!(
            "yell_full ({}) must be greater than yell_start ({})",
            tuning.yell_full,
            tuning.yell_start
        );
    }
    if tuning.hesitation_ramp_ms == 0 || tuning.hesitation_ramp_ms > 60_000 {
        bail!(
            "hesitation_ramp_ms must be between 1 and 60000, got {}",
            tuning.hesitation_ramp_ms
        );
    }
    if tuning.hesitation_floor_ms > 60_000 {
        bail!(
            "hesitation_floor_ms must be at most 60000, got {}",
            tuning.hesitation_floor_ms
        );
    }
    Ok(())
}
