use std::fmt;

use anyhow::Result;
use serde::Serialize;

use crate::detect::result::DetectorOutput;
use crate::frame::Frame;

/// The five per-frame detection capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionCapability {
    PhonePerson,
    Gaze,
    Mouth,
    HeadPose,
    Emotion,
}

impl DetectionCapability {
    /// Order in which the frame processor runs detectors.
    pub const PIPELINE_ORDER: [DetectionCapability; 5] = [
        DetectionCapability::PhonePerson,
        DetectionCapability::Gaze,
        DetectionCapability::Mouth,
        DetectionCapability::HeadPose,
        DetectionCapability::Emotion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DetectionCapability::PhonePerson => "phone",
            DetectionCapability::Gaze => "eye",
            DetectionCapability::Mouth => "mouth",
            DetectionCapability::HeadPose => "head_pose",
            DetectionCapability::Emotion => "emotion",
        }
    }

    /// Position in `PIPELINE_ORDER`.
    pub fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DetectionCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a detector hands back: its annotated copy of the frame and its result.
#[derive(Clone, Debug)]
pub struct Detected {
    pub frame: Frame,
    pub output: DetectorOutput,
}

impl Detected {
    pub fn new(frame: Frame, output: DetectorOutput) -> Self {
        Self { frame, output }
    }
}

/// Detector adapter trait.
///
/// Adapters wrap the vision models (gaze estimator, mouth landmarks, head-pose
/// solver, emotion classifier, phone/person detector). Each is consumed as a
/// black box:
/// - `detect` returns a frame with the same dimensions as its input, annotated
///   or passed through unchanged
/// - the output variant matches `capability()`
/// - "nothing detected" is `Ok` with an absent output, not an error
///
/// The frame processor still treats every call as fallible and recovers from
/// errors, panics and contract violations alike.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// The single capability this backend provides.
    fn capability(&self) -> DetectionCapability;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Detected>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
