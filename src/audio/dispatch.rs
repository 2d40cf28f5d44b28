//! Real-time side of the capture pipeline.
//!
//! Runs inside the device callback: downmixes, fills fixed-size analysis
//! windows, and hands both across to the router without waiting. Frames go
//! over a bounded channel with `try_send` and are counted when it is full.
//! Raw utterance chunks go over an unbounded channel so none are lost.

use super::frame::{timestamp_ms, AcousticFrame};
use super::meter::WaveformTap;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Downmix multi-channel input to mono while applying the provided converter so
/// analysis always sees a single channel regardless of the microphone layout.
pub(crate) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    // Average each interleaved frame to produce a mono representation.
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

/// Messages crossing from the audio callback to the application side.
pub(crate) enum AnalysisEvent {
    Frame(AcousticFrame),
    /// Acknowledged once every earlier event has been handled.
    Barrier(Sender<()>),
    Shutdown,
}

/// Raw mono samples for the utterance that was open when they arrived.
#[derive(Debug)]
pub(crate) struct PcmChunk {
    pub(crate) utterance: u64,
    pub(crate) samples: Vec<f32>,
}

/// Tells the callback whether raw chunks should be forwarded, and for which
/// utterance. Chunks are tagged so late arrivals from a finished utterance can
/// never land in the next one.
#[derive(Debug, Default)]
pub(crate) struct CaptureGate {
    open: AtomicBool,
    utterance: AtomicU64,
}

impl CaptureGate {
    pub(crate) fn open(&self) -> u64 {
        let id = self.utterance.fetch_add(1, Ordering::AcqRel) + 1;
        self.open.store(true, Ordering::Release);
        id
    }

    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub(crate) fn current(&self) -> Option<u64> {
        if self.open.load(Ordering::Acquire) {
            Some(self.utterance.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

pub(crate) struct FrameDispatcher {
    window_samples: usize,
    sample_rate: u32,
    samples_seen: u64,
    pending: Vec<f32>,
    scratch: Vec<f32>,
    frames: Sender<AnalysisEvent>,
    pcm: Sender<PcmChunk>,
    gate: Arc<CaptureGate>,
    tap: WaveformTap,
    dropped: Arc<AtomicUsize>,
}

impl FrameDispatcher {
    pub(crate) fn new(
        window_samples: usize,
        sample_rate: u32,
        frames: Sender<AnalysisEvent>,
        pcm: Sender<PcmChunk>,
        gate: Arc<CaptureGate>,
        tap: WaveformTap,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        let window_samples = window_samples.max(1);
        Self {
            window_samples,
            sample_rate,
            samples_seen: 0,
            pending: Vec::with_capacity(window_samples),
            scratch: Vec::new(),
            frames,
            pcm,
            gate,
            tap,
            dropped,
        }
    }

    pub(crate) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);
        if self.scratch.is_empty() {
            return;
        }
        self.tap.publish(&self.scratch);

        if let Some(utterance) = self.gate.current() {
            let chunk = PcmChunk {
                utterance,
                samples: self.scratch.clone(),
            };
            if self.pcm.send(chunk).is_err() {
                return;
            }
        }

        self.pending.extend_from_slice(&self.scratch);
        while self.pending.len() >= self.window_samples {
            let frame = {
                let window = &self.pending[..self.window_samples];
                self.samples_seen += self.window_samples as u64;
                AcousticFrame::analyze(window, timestamp_ms(self.samples_seen, self.sample_rate))
            };
            self.pending.drain(..self.window_samples);
            if !self.send_frame(frame) {
                break;
            }
        }
    }

    /// Returns false once the application side has gone away.
    fn send_frame(&self, frame: AcousticFrame) -> bool {
        match self.frames.try_send(AnalysisEvent::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
