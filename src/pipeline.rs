//! Frame processor.
//!
//! Drives one frame through the five detectors in `PIPELINE_ORDER`. Each call is
//! isolated: an error, a panic, a wrong output variant or a resized frame all
//! count as that detector failing. A failed stage contributes an absent result
//! (closed mouth for the mouth detector), the previous stage's annotated frame
//! carries forward, and the remaining detectors still run.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::detect::{
    Detected, DetectionCapability, DetectorBackend, DetectorRegistry, FrameDetections,
};
use crate::error::MonitorError;
use crate::frame::Frame;

pub const DEFAULT_SLOW_DETECTOR: Duration = Duration::from_millis(250);

/// Output of one pass through the pipeline.
#[derive(Debug)]
pub struct ProcessedFrame {
    /// Annotated frame from the last detector that succeeded.
    pub frame: Frame,
    pub detections: FrameDetections,
    /// Detector failures recovered during this frame.
    pub failures: Vec<MonitorError>,
}

pub struct FrameProcessor {
    registry: Arc<DetectorRegistry>,
    slow_detector: Duration,
}

impl FrameProcessor {
    pub fn new(registry: Arc<DetectorRegistry>) -> Self {
        Self {
            registry,
            slow_detector: DEFAULT_SLOW_DETECTOR,
        }
    }

    /// Detector calls slower than this are logged at warn.
    pub fn with_slow_detector_threshold(mut self, threshold: Duration) -> Self {
        self.slow_detector = threshold;
        self
    }

    pub fn process(&self, frame: Frame) -> ProcessedFrame {
        let sequence = frame.sequence();
        let mut current = frame;
        let mut detections = FrameDetections::default();
        let mut failures = Vec::new();

        for capability in DetectionCapability::PIPELINE_ORDER {
            let Some(backend) = self.registry.get(capability) else {
                continue;
            };
            let started = Instant::now();
            match attempt(capability, &backend, &current) {
                Ok(detected) => {
                    current = detected.frame;
                    detections.absorb(detected.output);
                }
                Err(err) => {
                    log::error!("frame {}: {}", sequence, err);
                    failures.push(err);
                }
            }
            let elapsed = started.elapsed();
            if elapsed > self.slow_detector {
                log::warn!(
                    "frame {}: {} detector took {} ms",
                    sequence,
                    capability,
                    elapsed.as_millis()
                );
            } else {
                log::debug!(
                    "frame {}: {} detector took {} us",
                    sequence,
                    capability,
                    elapsed.as_micros()
                );
            }
        }

        ProcessedFrame {
            frame: current,
            detections,
            failures,
        }
    }
}

/// Run one detector on `frame`, converting every failure mode into
/// `MonitorError::DetectorFailure`.
pub fn attempt(
    capability: DetectionCapability,
    backend: &Mutex<dyn DetectorBackend>,
    frame: &Frame,
) -> Result<Detected, MonitorError> {
    let failure = |reason: String| MonitorError::DetectorFailure {
        detector: capability,
        reason,
    };

    let mut guard = match backend.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{} backend lock poisoned; continuing with it", capability);
            poisoned.into_inner()
        }
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| guard.detect(frame)));
    drop(guard);

    let detected = match outcome {
        Ok(Ok(detected)) => detected,
        Ok(Err(err)) => return Err(failure(format!("{:#}", err))),
        Err(payload) => return Err(failure(format!("panicked: {}", panic_message(&*payload)))),
    };

    if detected.output.capability() != capability {
        return Err(failure(format!(
            "returned {} output",
            detected.output.capability()
        )));
    }
    if !detected.frame.same_shape(frame) {
        return Err(failure(format!(
            "returned a {}x{} frame for a {}x{} input",
            detected.frame.width(),
            detected.frame.height(),
            frame.width(),
            frame.height()
        )));
    }
    Ok(detected)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::SCRIPTED_MARK;
    use crate::detect::{
        DetectorOutput, Emotion, EyeDirection, EyeResult, MouthResult, PhoneResult, ScriptStep,
        ScriptedBackend,
    };
    use std::sync::atomic::Ordering;

    fn frame(sequence: u64) -> Frame {
        Frame::filled(16, 8, [0, 0, 0], sequence)
    }

    fn marked(frame: &Frame, capability: DetectionCapability) -> bool {
        *frame.image().get_pixel(capability.slot() as u32, 0) == SCRIPTED_MARK
    }

    #[test]
    fn all_detectors_run_in_order_and_results_merge() {
        let mut registry = DetectorRegistry::new();
        registry.register(ScriptedBackend::new(
            DetectionCapability::PhonePerson,
            vec![ScriptStep::Emit(DetectorOutput::Phone(Some(PhoneResult {
                phone_detected: true,
                person_count: 1,
            })))],
        ));
        registry.register(ScriptedBackend::new(
            DetectionCapability::Gaze,
            vec![ScriptStep::Emit(DetectorOutput::Eye(Some(EyeResult::looking(
                EyeDirection::Up,
            ))))],
        ));
        registry.register(ScriptedBackend::new(
            DetectionCapability::Emotion,
            vec![ScriptStep::Emit(DetectorOutput::Emotion(Some(Emotion::Sad)))],
        ));
        let processor = FrameProcessor::new(Arc::new(registry));

        let processed = processor.process(frame(1));
        assert!(processed.failures.is_empty());
        assert!(processed.detections.phone.unwrap().phone_detected);
        assert_eq!(
            processed.detections.eye.unwrap().direction(),
            Some(EyeDirection::Up)
        );
        assert_eq!(processed.detections.emotion, Some(Emotion::Sad));
        assert_eq!(processed.detections.mouth, MouthResult::default());
        assert!(marked(&processed.frame, DetectionCapability::PhonePerson));
        assert!(marked(&processed.frame, DetectionCapability::Gaze));
        assert!(marked(&processed.frame, DetectionCapability::Emotion));
    }

    #[test]
    fn failing_detector_is_isolated_and_later_detectors_still_run() {
        let mouth = ScriptedBackend::new(
            DetectionCapability::Mouth,
            vec![ScriptStep::Fail("landmarks unavailable".into())],
        );
        let emotion = ScriptedBackend::new(
            DetectionCapability::Emotion,
            vec![ScriptStep::Emit(DetectorOutput::Emotion(Some(Emotion::Happy)))],
        );
        let emotion_calls = emotion.calls();
        let mut registry = DetectorRegistry::new();
        registry.register(mouth);
        registry.register(emotion);
        let processor = FrameProcessor::new(Arc::new(registry));

        let processed = processor.process(frame(1));
        assert_eq!(processed.failures.len(), 1);
        assert!(matches!(
            processed.failures[0],
            MonitorError::DetectorFailure {
                detector: DetectionCapability::Mouth,
                ..
            }
        ));
        assert_eq!(processed.detections.mouth, MouthResult::default());
        assert_eq!(processed.detections.emotion, Some(Emotion::Happy));
        assert_eq!(emotion_calls.load(Ordering::SeqCst), 1);
        assert!(!marked(&processed.frame, DetectionCapability::Mouth));
        assert!(marked(&processed.frame, DetectionCapability::Emotion));
    }

    #[test]
    fn panicking_detector_is_recovered_and_usable_next_frame() {
        let mut registry = DetectorRegistry::new();
        registry.register(ScriptedBackend::new(
            DetectionCapability::Gaze,
            vec![
                ScriptStep::Panic("gaze model crashed".into()),
                ScriptStep::Emit(DetectorOutput::Eye(Some(EyeResult::looking(
                    EyeDirection::Left,
                )))),
            ],
        ));
        let processor = FrameProcessor::new(Arc::new(registry));

        let first = processor.process(frame(1));
        assert_eq!(first.failures.len(), 1);
        assert!(first.failures[0].to_string().contains("gaze model crashed"));
        assert!(first.detections.eye.is_none());

        let second = processor.process(frame(2));
        assert!(second.failures.is_empty());
        assert_eq!(
            second.detections.eye.unwrap().direction(),
            Some(EyeDirection::Left)
        );
    }

    #[test]
    fn contract_violations_count_as_failures() {
        let mut registry = DetectorRegistry::new();
        registry.register(ScriptedBackend::new(
            DetectionCapability::HeadPose,
            vec![ScriptStep::Reshape {
                width: 4,
                height: 4,
            }],
        ));
        registry.register(ScriptedBackend::new(
            DetectionCapability::Emotion,
            vec![ScriptStep::Emit(DetectorOutput::Mouth(Some(MouthResult::open(
                0.9,
            ))))],
        ));
        let processor = FrameProcessor::new(Arc::new(registry));

        let processed = processor.process(frame(1));
        assert_eq!(processed.failures.len(), 2);
        assert_eq!(processed.frame.width(), 16);
        assert!(!processed.detections.mouth.mouth_open);
        assert!(!processed.detections.any_fired());
    }

    #[test]
    fn empty_registry_passes_frame_through() {
        let processor = FrameProcessor::new(Arc::new(DetectorRegistry::new()));
        let processed = processor.process(frame(5));
        assert_eq!(processed.frame.sequence(), 5);
        assert!(processed.failures.is_empty());
        assert_eq!(processed.detections, FrameDetections::default());
    }
}
