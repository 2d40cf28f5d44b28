//! Live microphone input via CPAL.
//!
//! Owns the device stream and the analysis pipeline behind it. The stream's
//! data callback only converts, downmixes, and forwards; all analysis consumers
//! run on the pipeline's router thread.

use super::error::CaptureError;
use super::meter::WaveformTap;
use super::pipeline::{
    AnalysisCallback, AnalysisConfig, AnalysisMode, AnalysisPipeline, CaptureSource, InputHandle,
};
use super::DEFAULT_SOURCE_RATE;
use crate::lock_or_recover;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::{Arc, Mutex};

/// Input processing the biometrics need: echo cancellation on, but no automatic
/// gain or noise suppression so relative levels stay untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputProcessing {
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    pub noise_suppression: bool,
}

impl Default for InputProcessing {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            auto_gain_control: false,
            noise_suppression: false,
        }
    }
}

struct ActiveInput {
    device_name: String,
    stream: cpal::Stream,
    pipeline: AnalysisPipeline,
    fault: Arc<Mutex<Option<String>>>,
}

enum EngineState {
    Uninitialized,
    Running(Box<ActiveInput>),
    TornDown,
}

/// Microphone capture engine: one device, one analysis consumer at a time.
pub struct AudioEngine {
    preferred_device: Option<String>,
    analysis: AnalysisConfig,
    processing: InputProcessing,
    tap: WaveformTap,
    state: EngineState,
}

impl AudioEngine {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|err| CaptureError::DeviceUnavailable {
                reason: err.to_string(),
            })?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }

    pub fn new(preferred_device: Option<String>, analysis: AnalysisConfig) -> Self {
        Self {
            preferred_device,
            analysis,
            processing: InputProcessing::default(),
            tap: WaveformTap::new(),
            state: EngineState::Uninitialized,
        }
    }

    pub fn processing(&self) -> InputProcessing {
        self.processing
    }

    /// Open the device and start streaming. A second call while running is a no-op.
    pub fn initialize(&mut self) -> Result<(), CaptureError> {
        match self.state {
            EngineState::Running(_) => return Ok(()),
            EngineState::TornDown => return Err(CaptureError::TornDown),
            EngineState::Uninitialized => {}
        }

        let device = open_device(self.preferred_device.as_deref())?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "unknown input device".to_string());
        let default_config =
            device
                .default_input_config()
                .map_err(|err| CaptureError::DeviceUnavailable {
                    reason: format!("{err}. {}", mic_permission_hint()),
                })?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let sample_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));

        // CPAL hands us the raw device signal; there is no host-side AGC or
        // noise suppression to disable, and no echo canceller to enable.
        tracing::debug!(
            device = %device_name,
            format = ?format,
            sample_rate,
            channels,
            processing = ?self.processing,
            "opening input stream"
        );

        let pipeline = AnalysisPipeline::new(self.analysis, sample_rate, self.tap.clone());
        let fault = Arc::new(Mutex::new(None));
        let stream = build_stream(
            &device,
            &device_config,
            format,
            channels,
            pipeline.input(),
            fault.clone(),
        )?;
        stream.play().map_err(|err| CaptureError::StreamPlay {
            message: err.to_string(),
        })?;

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels,
            "audio input initialized"
        );
        self.state = EngineState::Running(Box::new(ActiveInput {
            device_name,
            stream,
            pipeline,
            fault,
        }));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, EngineState::Running(_))
    }

    pub fn device_name(&self) -> Option<&str> {
        match &self.state {
            EngineState::Running(active) => Some(&active.device_name),
            _ => None,
        }
    }

    /// Source rate of captured chunks; 16 kHz until a device is open.
    pub fn sample_rate(&self) -> u32 {
        match &self.state {
            EngineState::Running(active) => active.pipeline.sample_rate(),
            _ => DEFAULT_SOURCE_RATE,
        }
    }

    /// Cosmetic live view; never touches the analysis path.
    pub fn waveform_tap(&self) -> WaveformTap {
        self.tap.clone()
    }

    pub fn dropped_events(&self) -> usize {
        match &self.state {
            EngineState::Running(active) => active.pipeline.dropped_events(),
            _ => 0,
        }
    }

    /// Last error reported by the device stream, if any.
    pub fn fault(&self) -> Option<String> {
        match &self.state {
            EngineState::Running(active) => lock_or_recover(&active.fault, "stream fault").clone(),
            _ => None,
        }
    }

    fn active(&self) -> Result<&ActiveInput, CaptureError> {
        match &self.state {
            EngineState::Running(active) => Ok(active),
            EngineState::Uninitialized => Err(CaptureError::NotInitialized),
            EngineState::TornDown => Err(CaptureError::TornDown),
        }
    }

    /// Release the device and stop the router. Safe to call repeatedly; the
    /// engine cannot be reused afterwards.
    pub fn teardown(&mut self) {
        let previous = std::mem::replace(&mut self.state, EngineState::TornDown);
        if let EngineState::Running(active) = previous {
            let ActiveInput {
                device_name,
                stream,
                mut pipeline,
                ..
            } = *active;
            if let Err(err) = stream.pause() {
                tracing::warn!(error = %err, "failed to pause audio stream");
            }
            drop(stream);
            pipeline.shutdown();
            self.tap.reset();
            tracing::info!(device = %device_name, "audio input released");
        }
    }
}

impl CaptureSource for AudioEngine {
    /// Make sure the stream is running; harmless when it already is.
    fn resume(&mut self) -> Result<(), CaptureError> {
        let active = self.active()?;
        active.stream.play().map_err(|err| CaptureError::StreamPlay {
            message: err.to_string(),
        })
    }

    fn set_analysis_callback(
        &mut self,
        mode: AnalysisMode,
        callback: AnalysisCallback,
    ) -> Result<AnalysisMode, CaptureError> {
        let active = self.active()?;
        Ok(active.pipeline.set_analysis_callback(mode, callback))
    }

    fn clear_analysis_callback(&mut self) -> AnalysisMode {
        match &self.state {
            EngineState::Running(active) => active.pipeline.clear_analysis_callback(),
            _ => AnalysisMode::Detached,
        }
    }

    fn start_capture(&mut self) -> Result<(), CaptureError> {
        self.active()?.pipeline.start_capture();
        Ok(())
    }

    /// An uninitialized engine has nothing to return, which is not an error.
    fn stop_capture(&mut self) -> Result<Vec<Vec<f32>>, CaptureError> {
        let EngineState::Running(active) = &self.state else {
            return Ok(Vec::new());
        };
        let chunks = active.pipeline.stop_capture();
        if let Some(message) = lock_or_recover(&active.fault, "stream fault").take() {
            return Err(CaptureError::StreamFault { message });
        }
        Ok(chunks)
    }

    fn sample_rate(&self) -> u32 {
        AudioEngine::sample_rate(self)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn open_device(preferred: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match preferred {
        Some(name) => {
            let mut devices =
                host.input_devices()
                    .map_err(|err| CaptureError::DeviceUnavailable {
                        reason: format!("{err}. {}", mic_permission_hint()),
                    })?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceUnavailable {
                    reason: format!("input device '{name}' not found"),
                })
        }
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable {
                reason: format!("no default input device. {}", mic_permission_hint()),
            }),
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    channels: usize,
    input: InputHandle,
    fault: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, CaptureError> {
    // Error callback runs off the real-time path; record the fault for the
    // next stop_capture and mirror it into the log.
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!(error = %err, "audio stream error");
        *lock_or_recover(&fault, "stream fault") = Some(err.to_string());
    };

    // Convert every supported sample type to f32 up front so the rest of the
    // pipeline can stay format-agnostic.
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _| input.push(data, channels, |sample| sample),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _| input.push(data, channels, |sample| sample as f32 / 32_768.0),
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            config,
            move |data: &[u16], _| {
                input.push(data, channels, |sample| (sample as f32 - 32_768.0) / 32_768.0)
            },
            err_fn,
            None,
        ),
        other => {
            return Err(CaptureError::UnsupportedFormat {
                format: format!("{other:?}"),
            })
        }
    };
    stream.map_err(|err| CaptureError::StreamBuild {
        message: err.to_string(),
    })
}

fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
