mod backend;
pub mod backends;
mod registry;
mod result;

pub use backend::{Detected, DetectionCapability, DetectorBackend};
pub use backends::{ScriptStep, ScriptedBackend, SyntheticBackend};
pub use registry::DetectorRegistry;
pub use result::{
    parse_label, DetectorOutput, Emotion, EyeDirection, EyeResult, FrameDetections,
    HeadPoseDirection, HeadPoseResult, Label, MouthResult, PhoneResult, UnknownLabel,
};
