use super::dispatch::{
    append_downmixed_samples, AnalysisEvent, CaptureGate, FrameDispatcher, PcmChunk,
};
use super::{
    AcousticFrame, AnalysisConfig, AnalysisMode, AnalysisPipeline, WaveformTap,
    ANALYSIS_WINDOW_SAMPLES,
};
use crossbeam_channel::{bounded, unbounded};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FLUSH: Duration = Duration::from_secs(2);

fn small_pipeline(window: usize, rate: u32) -> AnalysisPipeline {
    AnalysisPipeline::new(
        AnalysisConfig {
            window_samples: window,
            channel_capacity: 1024,
        },
        rate,
        WaveformTap::new(),
    )
}

fn collector() -> (Arc<Mutex<Vec<AcousticFrame>>>, super::AnalysisCallback) {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = frames.clone();
    let callback: super::AnalysisCallback = Box::new(move |frame| {
        sink.lock().unwrap().push(frame);
    });
    (frames, callback)
}

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    let samples = [1.0f32, -1.0, 0.5, 0.5];
    append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf, vec![0.0, 0.5]);
}

#[test]
fn preserves_single_channel_audio() {
    let mut buf = Vec::new();
    let samples = [0.1f32, 0.2, 0.3];
    append_downmixed_samples(&mut buf, &samples, 1, |sample| sample);
    assert_eq!(buf, samples);
}

#[test]
fn dispatcher_emits_one_frame_per_full_window() {
    let (tx, rx) = unbounded();
    let (pcm_tx, _pcm_rx) = unbounded();
    let gate = Arc::new(CaptureGate::default());
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(
        4,
        1_000,
        tx,
        pcm_tx,
        gate,
        WaveformTap::new(),
        dropped.clone(),
    );

    dispatcher.push(&[0.5f32, -0.5, 0.5], 1, |s| s);
    assert!(rx.try_recv().is_err(), "partial window must not emit");

    dispatcher.push(&[-0.5f32, 0.0, 0.0, 0.0, 0.0, 1.0], 1, |s| s);
    let frames: Vec<AcousticFrame> = rx
        .try_iter()
        .filter_map(|event| match event {
            AnalysisEvent::Frame(frame) => Some(frame),
            _ => None,
        })
        .collect();
    assert_eq!(frames.len(), 2);
    assert!((frames[0].rms - 0.5).abs() < 1e-6);
    assert!((frames[0].zcr - 0.75).abs() < 1e-6);
    assert_eq!(frames[0].timestamp, 4);
    assert_eq!(frames[1].rms, 0.0);
    assert_eq!(frames[1].timestamp, 8);
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn dispatcher_forwards_pcm_only_while_gate_is_open() {
    let (tx, _rx) = unbounded();
    let (pcm_tx, rx) = unbounded::<PcmChunk>();
    let gate = Arc::new(CaptureGate::default());
    let mut dispatcher = FrameDispatcher::new(
        1024,
        16_000,
        tx,
        pcm_tx,
        gate.clone(),
        WaveformTap::new(),
        Arc::new(AtomicUsize::new(0)),
    );

    dispatcher.push(&[0.1f32; 8], 1, |s| s);
    assert!(rx.try_recv().is_err());

    let id = gate.open();
    dispatcher.push(&[0.2f32; 8], 1, |s| s);
    let chunk = rx.try_recv().expect("expected a pcm chunk");
    assert_eq!(chunk.utterance, id);
    assert_eq!(chunk.samples, vec![0.2; 8]);

    gate.close();
    dispatcher.push(&[0.3f32; 8], 1, |s| s);
    assert!(rx.try_recv().is_err());
}

#[test]
fn dispatcher_counts_frame_drops_but_keeps_every_pcm_chunk() {
    let (tx, _rx) = bounded(1);
    let (pcm_tx, pcm_rx) = unbounded::<PcmChunk>();
    let gate = Arc::new(CaptureGate::default());
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(
        2,
        16_000,
        tx,
        pcm_tx,
        gate.clone(),
        WaveformTap::new(),
        dropped.clone(),
    );
    gate.open();
    for _ in 0..4 {
        dispatcher.push(&[0.0f32; 8], 1, |s| s);
    }
    assert_eq!(dropped.load(Ordering::Relaxed), 15);
    let pcm_samples: usize = pcm_rx.try_iter().map(|chunk| chunk.samples.len()).sum();
    assert_eq!(pcm_samples, 32);
}

#[test]
fn slow_consumer_loses_frames_but_not_utterance_audio() {
    let pipeline = AnalysisPipeline::new(
        AnalysisConfig {
            window_samples: 160,
            channel_capacity: 8,
        },
        16_000,
        WaveformTap::new(),
    );
    pipeline.set_analysis_callback(
        AnalysisMode::Live,
        Box::new(|_frame| std::thread::sleep(Duration::from_millis(5))),
    );
    let input = pipeline.input();

    pipeline.start_capture();
    for block in 0..100 {
        input.push_f32(&[0.01 * (block % 7) as f32; 160]);
    }
    let chunks = pipeline.stop_capture();

    let captured: usize = chunks.iter().map(Vec::len).sum();
    assert_eq!(captured, 16_000);
    assert_eq!(chunks.len(), 100);
    assert!(pipeline.flush(FLUSH));
    assert_eq!(
        pipeline.frames_routed() as usize + pipeline.dropped_events(),
        100
    );
}

#[test]
fn capture_gate_issues_fresh_utterance_ids() {
    let gate = CaptureGate::default();
    assert_eq!(gate.current(), None);
    let first = gate.open();
    assert_eq!(gate.current(), Some(first));
    gate.close();
    let second = gate.open();
    assert!(second > first);
}

#[test]
fn pipeline_routes_frames_to_active_consumer_in_order() {
    let pipeline = small_pipeline(ANALYSIS_WINDOW_SAMPLES, 48_000);
    let (frames, callback) = collector();
    assert_eq!(
        pipeline.set_analysis_callback(AnalysisMode::Live, callback),
        AnalysisMode::Detached
    );

    let input = pipeline.input();
    let tone: Vec<f32> = (0..ANALYSIS_WINDOW_SAMPLES * 5)
        .map(|n| 0.3 * (2.0 * PI * 440.0 * n as f32 / 48_000.0).sin())
        .collect();
    for block in tone.chunks(128) {
        input.push_f32(block);
    }
    assert!(pipeline.flush(FLUSH));

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 5);
    assert!(frames.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(frames.iter().all(|f| f.rms > 0.2 && f.zcr > 0.0));
    assert_eq!(pipeline.frames_routed(), 5);
}

#[test]
fn replacing_the_consumer_stops_delivery_to_the_old_one() {
    let pipeline = small_pipeline(4, 1_000);
    let (first, first_cb) = collector();
    let (second, second_cb) = collector();
    let input = pipeline.input();

    pipeline.set_analysis_callback(AnalysisMode::Calibration, first_cb);
    input.push_f32(&[0.1; 8]);
    assert!(pipeline.flush(FLUSH));

    let previous = pipeline.set_analysis_callback(AnalysisMode::Live, second_cb);
    assert_eq!(previous, AnalysisMode::Calibration);
    assert_eq!(pipeline.mode(), AnalysisMode::Live);
    input.push_f32(&[0.1; 12]);
    assert!(pipeline.flush(FLUSH));

    assert_eq!(first.lock().unwrap().len(), 2);
    assert_eq!(second.lock().unwrap().len(), 3);
}

#[test]
fn detached_pipeline_drops_frames_silently() {
    let pipeline = small_pipeline(4, 1_000);
    pipeline.input().push_f32(&[0.5; 16]);
    assert!(pipeline.flush(FLUSH));
    assert_eq!(pipeline.frames_routed(), 0);
    assert_eq!(pipeline.mode(), AnalysisMode::Detached);
}

#[test]
fn capture_returns_chunks_in_arrival_order() {
    let pipeline = small_pipeline(ANALYSIS_WINDOW_SAMPLES, 16_000);
    let input = pipeline.input();

    input.push_f32(&[9.0; 4]);
    pipeline.start_capture();
    input.push_f32(&[0.1, 0.2]);
    input.push_f32(&[0.3]);
    input.push_f32(&[0.4, 0.5, 0.6]);
    let chunks = pipeline.stop_capture();
    assert_eq!(
        chunks,
        vec![vec![0.1, 0.2], vec![0.3], vec![0.4, 0.5, 0.6]]
    );

    input.push_f32(&[7.0; 4]);
    assert!(pipeline.stop_capture().is_empty());
}

#[test]
fn stop_without_start_is_empty() {
    let pipeline = small_pipeline(ANALYSIS_WINDOW_SAMPLES, 16_000);
    pipeline.input().push_f32(&[0.5; 32]);
    assert!(pipeline.stop_capture().is_empty());
}

#[test]
fn start_capture_clears_previous_utterance() {
    let pipeline = small_pipeline(ANALYSIS_WINDOW_SAMPLES, 16_000);
    let input = pipeline.input();
    pipeline.start_capture();
    input.push_f32(&[0.1; 4]);
    assert!(pipeline.flush(FLUSH));
    pipeline.start_capture();
    input.push_f32(&[0.2; 2]);
    assert_eq!(pipeline.stop_capture(), vec![vec![0.2; 2]]);
}

#[test]
fn tap_sees_audio_without_a_consumer() {
    let tap = WaveformTap::new();
    let pipeline = AnalysisPipeline::new(AnalysisConfig::default(), 16_000, tap.clone());
    let floor = tap.level_db();
    pipeline.input().push_f32(&[0.5; 64]);
    assert!(tap.level_db() > floor);
    assert_eq!(tap.snapshot().last().copied(), Some(0.5));
}

#[test]
fn shutdown_is_idempotent() {
    let mut pipeline = small_pipeline(4, 1_000);
    pipeline.shutdown();
    pipeline.shutdown();
    assert_eq!(pipeline.mode(), AnalysisMode::Detached);
}
