//! Application side of the capture pipeline.
//!
//! A router thread drains the real-time channels in order, hands each frame to
//! the single active analysis consumer, and appends raw chunks to the current
//! utterance buffer. Raw chunks are drained before every control event, so a
//! flush barrier sees all audio pushed before it.

use super::dispatch::{AnalysisEvent, CaptureGate, FrameDispatcher, PcmChunk};
use super::error::CaptureError;
use super::frame::AcousticFrame;
use super::meter::WaveformTap;
use super::{ANALYSIS_WINDOW_SAMPLES, DEFAULT_SOURCE_RATE};
use crate::config::AppConfig;
use crate::lock_or_recover;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the application side waits for in-flight chunks when a capture stops.
const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Sizing for the real-time side of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub window_samples: usize,
    pub channel_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_samples: ANALYSIS_WINDOW_SAMPLES,
            channel_capacity: 256,
        }
    }
}

impl From<&AppConfig> for AnalysisConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            window_samples: cfg.analysis_window_samples,
            channel_capacity: cfg.channel_capacity,
        }
    }
}

/// Frame consumer installed with [`AnalysisPipeline::set_analysis_callback`].
pub type AnalysisCallback = Box<dyn FnMut(AcousticFrame) + Send + 'static>;

/// Which consumer currently owns the frame stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Detached,
    Calibration,
    Live,
}

struct ConsumerSlot {
    mode: AnalysisMode,
    callback: Option<AnalysisCallback>,
}

#[derive(Default)]
struct UtteranceBuffer {
    utterance: Option<u64>,
    chunks: Vec<Vec<f32>>,
}

/// Operations the session needs from a frame/PCM producer.
///
/// Implemented by the live [`AudioEngine`](super::AudioEngine) and by
/// [`AnalysisPipeline`] itself for offline input.
pub trait CaptureSource {
    fn resume(&mut self) -> Result<(), CaptureError>;
    fn set_analysis_callback(
        &mut self,
        mode: AnalysisMode,
        callback: AnalysisCallback,
    ) -> Result<AnalysisMode, CaptureError>;
    fn clear_analysis_callback(&mut self) -> AnalysisMode;
    fn start_capture(&mut self) -> Result<(), CaptureError>;
    fn stop_capture(&mut self) -> Result<Vec<Vec<f32>>, CaptureError>;
    fn sample_rate(&self) -> u32;
}

/// Cloneable handle the device callback pushes samples through.
///
/// Pushes never wait on the router. The dispatcher lock is only contended by
/// another producer's push.
#[derive(Clone)]
pub struct InputHandle {
    dispatcher: Arc<Mutex<FrameDispatcher>>,
    dropped: Arc<AtomicUsize>,
}

impl InputHandle {
    pub fn push<T, F>(&self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        lock_or_recover(&self.dispatcher, "frame dispatcher").push(data, channels, convert);
    }

    pub fn push_f32(&self, data: &[f32]) {
        self.push(data, 1, |sample| sample);
    }
}

/// Dispatcher, router thread, consumer slot, and utterance buffer wired together.
pub struct AnalysisPipeline {
    input: InputHandle,
    control: Sender<AnalysisEvent>,
    gate: Arc<CaptureGate>,
    slot: Arc<Mutex<ConsumerSlot>>,
    buffer: Arc<Mutex<UtteranceBuffer>>,
    frames_routed: Arc<AtomicU64>,
    tap: WaveformTap,
    sample_rate: u32,
    router: Option<JoinHandle<()>>,
}

impl AnalysisPipeline {
    pub fn new(cfg: AnalysisConfig, sample_rate: u32, tap: WaveformTap) -> Self {
        let sample_rate = if sample_rate == 0 {
            DEFAULT_SOURCE_RATE
        } else {
            sample_rate
        };
        let (sender, receiver) = bounded::<AnalysisEvent>(cfg.channel_capacity.max(1));
        let (pcm_tx, pcm_rx) = unbounded::<PcmChunk>();
        let gate = Arc::new(CaptureGate::default());
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = FrameDispatcher::new(
            cfg.window_samples,
            sample_rate,
            sender.clone(),
            pcm_tx,
            gate.clone(),
            tap.clone(),
            dropped.clone(),
        );
        let slot = Arc::new(Mutex::new(ConsumerSlot {
            mode: AnalysisMode::Detached,
            callback: None,
        }));
        let buffer = Arc::new(Mutex::new(UtteranceBuffer::default()));
        let frames_routed = Arc::new(AtomicU64::new(0));

        let router = spawn_router(
            receiver,
            pcm_rx,
            slot.clone(),
            buffer.clone(),
            frames_routed.clone(),
        );

        Self {
            input: InputHandle {
                dispatcher: Arc::new(Mutex::new(dispatcher)),
                dropped,
            },
            control: sender,
            gate,
            slot,
            buffer,
            frames_routed,
            tap,
            sample_rate,
            router: Some(router),
        }
    }

    pub fn input(&self) -> InputHandle {
        self.input.clone()
    }

    pub fn tap(&self) -> WaveformTap {
        self.tap.clone()
    }

    pub fn mode(&self) -> AnalysisMode {
        lock_or_recover(&self.slot, "analysis slot").mode
    }

    /// Analysis frames skipped because the router fell behind. Utterance
    /// audio is never dropped.
    pub fn dropped_events(&self) -> usize {
        self.input.dropped.load(Ordering::Relaxed)
    }

    pub fn frames_routed(&self) -> u64 {
        self.frames_routed.load(Ordering::Relaxed)
    }

    /// Replace the active consumer. The swap happens under the same lock the
    /// router holds while delivering, so no frame reaches two consumers.
    /// Returns the mode that was active before.
    ///
    /// Must not be called from inside a callback.
    pub fn set_analysis_callback(
        &self,
        mode: AnalysisMode,
        callback: AnalysisCallback,
    ) -> AnalysisMode {
        let mut slot = lock_or_recover(&self.slot, "analysis slot");
        let previous = slot.mode;
        slot.mode = mode;
        slot.callback = Some(callback);
        previous
    }

    pub fn clear_analysis_callback(&self) -> AnalysisMode {
        let mut slot = lock_or_recover(&self.slot, "analysis slot");
        let previous = slot.mode;
        slot.mode = AnalysisMode::Detached;
        slot.callback = None;
        previous
    }

    /// Clear the utterance buffer and start appending incoming chunks.
    pub fn start_capture(&self) {
        let mut buffer = lock_or_recover(&self.buffer, "utterance buffer");
        buffer.chunks.clear();
        buffer.utterance = Some(self.gate.open());
    }

    /// Stop appending and return every chunk since the matching start, in
    /// arrival order. Empty when nothing arrived.
    pub fn stop_capture(&self) -> Vec<Vec<f32>> {
        self.gate.close();
        self.flush(FLUSH_TIMEOUT);
        let mut buffer = lock_or_recover(&self.buffer, "utterance buffer");
        buffer.utterance = None;
        std::mem::take(&mut buffer.chunks)
    }

    /// Wait until the router has handled everything queued so far.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        if self
            .control
            .send_timeout(AnalysisEvent::Barrier(ack_tx), timeout)
            .is_err()
        {
            tracing::debug!("analysis flush: channel busy or closed");
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn shutdown(&mut self) {
        let Some(router) = self.router.take() else {
            return;
        };
        self.gate.close();
        if self
            .control
            .send_timeout(AnalysisEvent::Shutdown, FLUSH_TIMEOUT)
            .is_err()
        {
            tracing::warn!("analysis router did not accept shutdown; detaching");
            return;
        }
        if router.join().is_err() {
            tracing::warn!("analysis router panicked");
        }
        self.clear_analysis_callback();
    }
}

impl Drop for AnalysisPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl CaptureSource for AnalysisPipeline {
    fn resume(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn set_analysis_callback(
        &mut self,
        mode: AnalysisMode,
        callback: AnalysisCallback,
    ) -> Result<AnalysisMode, CaptureError> {
        Ok(AnalysisPipeline::set_analysis_callback(self, mode, callback))
    }

    fn clear_analysis_callback(&mut self) -> AnalysisMode {
        AnalysisPipeline::clear_analysis_callback(self)
    }

    fn start_capture(&mut self) -> Result<(), CaptureError> {
        AnalysisPipeline::start_capture(self);
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<Vec<Vec<f32>>, CaptureError> {
        Ok(AnalysisPipeline::stop_capture(self))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn spawn_router(
    receiver: Receiver<AnalysisEvent>,
    pcm: Receiver<PcmChunk>,
    slot: Arc<Mutex<ConsumerSlot>>,
    buffer: Arc<Mutex<UtteranceBuffer>>,
    frames_routed: Arc<AtomicU64>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for event in receiver.iter() {
            let pending: Vec<PcmChunk> = pcm.try_iter().collect();
            if !pending.is_empty() {
                let mut buffer = lock_or_recover(&buffer, "utterance buffer");
                for chunk in pending {
                    if buffer.utterance == Some(chunk.utterance) {
                        buffer.chunks.push(chunk.samples);
                    }
                }
            }
            match event {
                AnalysisEvent::Frame(frame) => {
                    let mut slot = lock_or_recover(&slot, "analysis slot");
                    if let Some(callback) = slot.callback.as_mut() {
                        callback(frame);
                        frames_routed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                AnalysisEvent::Barrier(ack) => {
                    let _ = ack.send(());
                }
                AnalysisEvent::Shutdown => break,
            }
        }
    })
}
