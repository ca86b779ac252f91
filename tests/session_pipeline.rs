use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use proctor_monitor::detect::{
    DetectorOutput, Emotion, EyeDirection, EyeResult, Label, MouthResult, ScriptStep,
    ScriptedBackend,
};
use proctor_monitor::ingest::{FrameSource, SourceStats};
use proctor_monitor::{
    DetectionCapability, DetectorRegistry, Frame, Monitor, MonitorConfig, StreamEnd,
};

/// Source that hands out `frames` solid frames, then fails, and records release.
struct CountingSource {
    frames: u64,
    produced: u64,
    size: (u32, u32),
    released: Arc<AtomicBool>,
    release_calls: Arc<AtomicU64>,
}

impl CountingSource {
    fn new(frames: u64) -> Self {
        Self {
            frames,
            produced: 0,
            size: (32, 24),
            released: Arc::new(AtomicBool::new(false)),
            release_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    fn sized(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }
}

impl FrameSource for CountingSource {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.released.load(Ordering::SeqCst) {
            return Err(anyhow!("read after release"));
        }
        if self.produced >= self.frames {
            return Err(anyhow!("failed to grab frame"));
        }
        self.produced += 1;
        let (width, height) = self.size;
        Ok(Frame::filled(width, height, [20, 20, 20], self.produced))
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
        self.release_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.produced,
            device: "test://counting".to_string(),
        }
    }
}

fn monitor_with(
    registry: DetectorRegistry,
    configure: impl FnOnce(&mut MonitorConfig),
) -> Monitor {
    let mut config = MonitorConfig::default();
    configure(&mut config);
    Monitor::new(config, registry)
}

fn drain(driver: &mut impl Iterator<Item = Vec<u8>>) -> (usize, usize) {
    let mut parts = 0;
    let mut empty = 0;
    for chunk in driver {
        if chunk.is_empty() {
            empty += 1;
        } else {
            parts += 1;
        }
    }
    (parts, empty)
}

#[test]
fn three_frame_scenario() -> Result<()> {
    let mut registry = DetectorRegistry::new();
    registry.register(ScriptedBackend::new(
        DetectionCapability::Emotion,
        vec![ScriptStep::Emit(DetectorOutput::Emotion(Some(Emotion::Happy)))],
    ));
    registry.register(ScriptedBackend::new(
        DetectionCapability::Mouth,
        vec![
            ScriptStep::Emit(DetectorOutput::Mouth(None)),
            ScriptStep::Emit(DetectorOutput::Mouth(Some(MouthResult::open(0.9)))),
        ],
    ));
    registry.register(ScriptedBackend::new(
        DetectionCapability::Gaze,
        vec![
            ScriptStep::Emit(DetectorOutput::Eye(None)),
            ScriptStep::Emit(DetectorOutput::Eye(None)),
            ScriptStep::Emit(DetectorOutput::Eye(Some(EyeResult::looking(
                EyeDirection::Left,
            )))),
        ],
    ));
    let monitor = monitor_with(registry, |_| {});

    let mut driver = monitor.stream_from(Box::new(CountingSource::new(3)));
    let (parts, empty) = drain(&mut driver);
    assert_eq!((parts, empty), (3, 1));

    let counts = monitor.detection_counts()?;
    assert_eq!(counts.total_frames, 3);
    assert_eq!(counts.emotion_counts.get(Emotion::Happy), 1);
    assert!(counts.mouth_open_count >= 1);
    assert_eq!(counts.eye_movement_counts.get(EyeDirection::Left), 1);
    assert_eq!(counts.detection_history.len(), 3);
    assert_eq!(
        counts
            .detection_history
            .iter()
            .map(|event| event.frame)
            .collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    Ok(())
}

#[test]
fn failing_detector_still_counts_the_frame_and_records_the_event() -> Result<()> {
    let mut registry = DetectorRegistry::new();
    registry.register(ScriptedBackend::new(
        DetectionCapability::PhonePerson,
        vec![ScriptStep::Panic("phone model crashed".into())],
    ));
    registry.register(ScriptedBackend::new(
        DetectionCapability::Gaze,
        vec![ScriptStep::Fail("no face".into())],
    ));
    registry.register(ScriptedBackend::new(
        DetectionCapability::Emotion,
        vec![ScriptStep::Emit(DetectorOutput::Emotion(Some(Emotion::Sad)))],
    ));
    let monitor = monitor_with(registry, |_| {});

    let mut driver = monitor.stream_from(Box::new(CountingSource::new(1)));
    drain(&mut driver);

    let counts = monitor.detection_counts()?;
    assert_eq!(counts.total_frames, 1);
    assert_eq!(counts.phone_detected_count, 0);
    assert_eq!(counts.eye_movement_counts.total(), 0);
    assert_eq!(counts.detection_history.len(), 1);
    assert_eq!(counts.detection_history[0].current_emotion, Some(Emotion::Sad));
    Ok(())
}

#[test]
fn total_frames_matches_frames_processed() -> Result<()> {
    let monitor = monitor_with(DetectorRegistry::synthetic(3), |_| {});
    let mut driver = monitor.stream_from(Box::new(CountingSource::new(40)));
    let (parts, _) = drain(&mut driver);
    assert_eq!(parts, 40);

    let counts = monitor.detection_counts()?;
    assert_eq!(counts.total_frames, 40);
    assert!(counts.eye_movement_counts.total() <= 40);
    assert!(counts.head_pose_counts.total() <= 40);
    assert!(counts.emotion_counts.total() <= 40);
    for direction in EyeDirection::ALL {
        assert!(counts.eye_movement_counts.get(*direction) <= 40);
    }
    Ok(())
}

#[test]
fn exposed_history_never_exceeds_the_window() -> Result<()> {
    let mut registry = DetectorRegistry::new();
    registry.register(ScriptedBackend::new(
        DetectionCapability::Emotion,
        (0..1000)
            .map(|_| ScriptStep::Emit(DetectorOutput::Emotion(Some(Emotion::Neutral))))
            .collect(),
    ));
    let monitor = monitor_with(registry, |cfg| {
        cfg.stream.timestamp_overlay = false;
    });
    let mut driver = monitor.stream_from(Box::new(CountingSource::new(1000)));
    drain(&mut driver);

    let counts = monitor.detection_counts()?;
    assert_eq!(counts.total_frames, 1000);
    assert_eq!(counts.detection_history.len(), 10);
    assert_eq!(counts.detection_history[9].frame, 1000);
    assert_eq!(monitor.session().history_len()?, 1000);
    Ok(())
}

#[test]
fn empty_session_report_has_zero_percentages() -> Result<()> {
    let monitor = monitor_with(DetectorRegistry::synthetic(0), |_| {});
    let report = monitor.end_session()?;
    assert_eq!(report.total_frames, 0);
    assert_eq!(report.phone_detection.percentage, 0.0);
    assert_eq!(report.mouth_movements.percentage, 0.0);
    assert_eq!(report.session_duration, 0.0);
    for emotion in Emotion::ALL {
        assert_eq!(report.emotions.percentages.get(*emotion), 0.0);
    }
    Ok(())
}

#[test]
fn end_session_resets_counts_and_keeps_history() -> Result<()> {
    let mut registry = DetectorRegistry::new();
    registry.register(ScriptedBackend::new(
        DetectionCapability::Mouth,
        vec![ScriptStep::Emit(DetectorOutput::Mouth(Some(MouthResult::open(0.8))))],
    ));
    let monitor = monitor_with(registry, |_| {});
    let mut driver = monitor.stream_from(Box::new(CountingSource::new(2)));
    drain(&mut driver);

    let report = monitor.end_session()?;
    assert_eq!(report.total_frames, 2);
    assert_eq!(report.mouth_movements.total_open_count, 1);
    assert_eq!(report.mouth_movements.percentage, 50.0);

    let counts = monitor.detection_counts()?;
    assert_eq!(counts.total_frames, 0);
    assert_eq!(counts.mouth_open_count, 0);
    assert_eq!(counts.detection_history.len(), 1);
    Ok(())
}

#[test]
fn end_session_can_clear_history() -> Result<()> {
    let mut registry = DetectorRegistry::new();
    registry.register(ScriptedBackend::new(
        DetectionCapability::Emotion,
        vec![ScriptStep::Emit(DetectorOutput::Emotion(Some(Emotion::Fear)))],
    ));
    let monitor = monitor_with(registry, |cfg| {
        cfg.session.clear_history_on_end = true;
    });
    let mut driver = monitor.stream_from(Box::new(CountingSource::new(1)));
    drain(&mut driver);

    monitor.end_session()?;
    assert!(monitor.detection_counts()?.detection_history.is_empty());
    Ok(())
}

#[test]
fn camera_failing_on_first_read_yields_empty_chunk_and_releases() -> Result<()> {
    let monitor = monitor_with(DetectorRegistry::synthetic(0), |_| {});
    let source = CountingSource::new(0);
    let released = source.released.clone();
    let release_calls = source.release_calls.clone();

    let mut driver = monitor.stream_from(Box::new(source));
    assert_eq!(driver.next(), Some(Vec::new()));
    assert!(released.load(Ordering::SeqCst));
    assert!(matches!(driver.ended(), Some(StreamEnd::CameraFailed(_))));
    assert_eq!(driver.next(), None);
    drop(driver);

    assert_eq!(release_calls.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.session().total_frames()?, 0);
    Ok(())
}

#[test]
fn encoding_failure_yields_empty_chunk_and_ends_the_stream() -> Result<()> {
    let monitor = monitor_with(DetectorRegistry::new(), |cfg| {
        cfg.stream.timestamp_overlay = false;
    });
    // JPEG cannot encode a dimension above 65535.
    let source = CountingSource::new(5).sized(70_000, 1);
    let released = source.released.clone();

    let mut driver = monitor.stream_from(Box::new(source));
    assert_eq!(driver.next(), Some(Vec::new()));
    assert!(matches!(driver.ended(), Some(StreamEnd::EncodingFailed(_))));
    assert_eq!(driver.next(), None);
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(driver.frames_streamed(), 0);
    assert_eq!(driver.source_stats().frames_captured, 1);
    // The frame was processed before encoding failed.
    assert_eq!(monitor.session().total_frames()?, 1);
    Ok(())
}

#[test]
fn source_stats_survive_release() {
    let monitor = monitor_with(DetectorRegistry::synthetic(0), |_| {});
    let mut driver = monitor.stream_from(Box::new(CountingSource::new(3)));
    drain(&mut driver);
    let stats = driver.source_stats();
    assert_eq!(stats.frames_captured, 3);
    assert_eq!(stats.device, "test://counting");
}

#[test]
fn stub_camera_failing_on_first_read_through_open_stream() -> Result<()> {
    let monitor = monitor_with(DetectorRegistry::synthetic(0), |cfg| {
        cfg.camera.device = "stub://camera?frames=0".to_string();
        cfg.camera.width = 32;
        cfg.camera.height = 24;
    });
    let mut driver = monitor.open_stream()?;
    assert_eq!(driver.next(), Some(Vec::new()));
    assert_eq!(driver.next(), None);
    assert_eq!(monitor.session().total_frames()?, 0);
    Ok(())
}

#[test]
fn cancellation_stops_the_stream_and_releases() -> Result<()> {
    let monitor = monitor_with(DetectorRegistry::synthetic(0), |_| {});
    let source = CountingSource::new(u64::MAX);
    let released = source.released.clone();

    let mut driver = monitor.stream_from(Box::new(source));
    assert!(driver.next().is_some_and(|chunk| !chunk.is_empty()));
    assert!(driver.next().is_some_and(|chunk| !chunk.is_empty()));

    monitor.shutdown();
    assert_eq!(driver.next(), None);
    assert_eq!(driver.ended(), Some(&StreamEnd::Cancelled));
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(monitor.session().total_frames()?, 2);
    Ok(())
}

#[test]
fn dropping_a_live_stream_releases_the_source() {
    let monitor = monitor_with(DetectorRegistry::synthetic(0), |_| {});
    let source = CountingSource::new(10);
    let released = source.released.clone();

    let mut driver = monitor.stream_from(Box::new(source));
    assert!(driver.next().is_some());
    drop(driver);
    assert!(released.load(Ordering::SeqCst));
}
