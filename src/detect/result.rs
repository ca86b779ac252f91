use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::backend::DetectionCapability;

/// A closed set of labels a detector can report.
///
/// `ALL` is in declaration order; `index` is the position in `ALL`. Session
/// counters are laid out by this index and serialize in this order.
pub trait Label: Copy + Eq + fmt::Debug + 'static {
    const ALL: &'static [Self];

    fn key(self) -> &'static str;

    fn index(self) -> usize;
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} label '{label}'")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub label: String,
}

macro_rules! closed_label {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $key:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl Label for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn key(self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }

            fn index(self) -> usize {
                self as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.key())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            /// Case-insensitive match against the wire key.
            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let trimmed = value.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|label| label.key().eq_ignore_ascii_case(trimmed))
                    .ok_or_else(|| UnknownLabel {
                        kind: $kind,
                        label: value.to_string(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.key())
            }
        }
    };
}

closed_label!(
    /// Gaze direction, in first-match precedence order.
    EyeDirection, "eye direction" {
        Left => "looking_left",
        Right => "looking_right",
        Up => "looking_up",
        Normal => "looking_normal",
    }
);

closed_label!(
    HeadPoseDirection, "head pose" {
        Up => "Head up",
        Down => "Head down",
        Left => "Head left",
        Right => "Head right",
        Normal => "Normal",
    }
);

closed_label!(
    Emotion, "emotion" {
        Angry => "angry",
        Disgust => "disgust",
        Fear => "fear",
        Happy => "happy",
        Sad => "sad",
        Surprise => "surprise",
        Neutral => "neutral",
    }
);

/// Parse a label reported by a detector model.
///
/// An unknown label is logged and treated as no result, so unexpected model
/// output can never create a counter key outside the closed set.
pub fn parse_label<L>(capability: DetectionCapability, raw: &str) -> Option<L>
where
    L: Label + FromStr<Err = UnknownLabel>,
{
    match raw.parse::<L>() {
        Ok(label) => Some(label),
        Err(err) => {
            log::warn!("{} detector: {}; result dropped", capability, err);
            None
        }
    }
}

/// Phone/person detector output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PhoneResult {
    pub phone_detected: bool,
    pub person_count: u32,
}

/// Raw gaze flags as reported by the eye tracker.
///
/// More than one flag may be set; `direction` resolves them with
/// left > right > up > normal precedence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EyeResult {
    pub looking_left: bool,
    pub looking_right: bool,
    pub looking_up: bool,
    pub looking_normal: bool,
}

impl EyeResult {
    pub fn looking(direction: EyeDirection) -> Self {
        let mut result = Self::default();
        match direction {
            EyeDirection::Left => result.looking_left = true,
            EyeDirection::Right => result.looking_right = true,
            EyeDirection::Up => result.looking_up = true,
            EyeDirection::Normal => result.looking_normal = true,
        }
        result
    }

    pub fn direction(&self) -> Option<EyeDirection> {
        [
            (self.looking_left, EyeDirection::Left),
            (self.looking_right, EyeDirection::Right),
            (self.looking_up, EyeDirection::Up),
            (self.looking_normal, EyeDirection::Normal),
        ]
        .into_iter()
        .find_map(|(flag, direction)| flag.then_some(direction))
    }
}

/// Mouth-open estimate. Defaults to closed with zero confidence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MouthResult {
    pub mouth_open: bool,
    pub confidence: f32,
}

impl MouthResult {
    pub fn open(confidence: f32) -> Self {
        Self {
            mouth_open: true,
            confidence,
        }
    }
}

/// Head pose output. A present result may still lack a direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HeadPoseResult {
    pub direction: Option<HeadPoseDirection>,
}

impl HeadPoseResult {
    pub fn facing(direction: HeadPoseDirection) -> Self {
        Self {
            direction: Some(direction),
        }
    }

    /// Result for a raw solver label; an unknown label gives no result at all.
    pub fn from_label(raw: &str) -> Option<Self> {
        parse_label(DetectionCapability::HeadPose, raw).map(Self::facing)
    }
}

/// One detector's output for one frame. `None` means the detector produced nothing.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectorOutput {
    Phone(Option<PhoneResult>),
    Eye(Option<EyeResult>),
    Mouth(Option<MouthResult>),
    HeadPose(Option<HeadPoseResult>),
    Emotion(Option<Emotion>),
}

impl DetectorOutput {
    pub fn absent(capability: DetectionCapability) -> Self {
        match capability {
            DetectionCapability::PhonePerson => DetectorOutput::Phone(None),
            DetectionCapability::Gaze => DetectorOutput::Eye(None),
            DetectionCapability::Mouth => DetectorOutput::Mouth(None),
            DetectionCapability::HeadPose => DetectorOutput::HeadPose(None),
            DetectionCapability::Emotion => DetectorOutput::Emotion(None),
        }
    }

    pub fn capability(&self) -> DetectionCapability {
        match self {
            DetectorOutput::Phone(_) => DetectionCapability::PhonePerson,
            DetectorOutput::Eye(_) => DetectionCapability::Gaze,
            DetectorOutput::Mouth(_) => DetectionCapability::Mouth,
            DetectorOutput::HeadPose(_) => DetectionCapability::HeadPose,
            DetectorOutput::Emotion(_) => DetectionCapability::Emotion,
        }
    }
}

/// Merged detector results for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDetections {
    pub phone: Option<PhoneResult>,
    pub eye: Option<EyeResult>,
    pub mouth: MouthResult,
    pub head_pose: Option<HeadPoseResult>,
    pub emotion: Option<Emotion>,
}

impl FrameDetections {
    /// Slot a detector output into the bundle. An absent mouth result becomes
    /// the closed default.
    pub fn absorb(&mut self, output: DetectorOutput) {
        match output {
            DetectorOutput::Phone(result) => self.phone = result,
            DetectorOutput::Eye(result) => self.eye = result,
            DetectorOutput::Mouth(result) => self.mouth = result.unwrap_or_default(),
            DetectorOutput::HeadPose(result) => self.head_pose = result,
            DetectorOutput::Emotion(result) => self.emotion = result,
        }
    }

    /// True when the frame warrants a detection event.
    ///
    /// Mouth is tested on its `mouth_open` flag; every other detector is tested
    /// on presence alone.
    pub fn any_fired(&self) -> bool {
        self.phone.is_some()
            || self.emotion.is_some()
            || self.eye.is_some()
            || self.mouth.mouth_open
            || self.head_pose.is_some()
    }

    pub fn with_phone(mut self, phone: PhoneResult) -> Self {
        self.phone = Some(phone);
        self
    }

    pub fn with_eye(mut self, eye: EyeResult) -> Self {
        self.eye = Some(eye);
        self
    }

    pub fn with_mouth(mut self, mouth: MouthResult) -> Self {
        self.mouth = mouth;
        self
    }

    pub fn with_head_pose(mut self, head_pose: HeadPoseResult) -> Self {
        self.head_pose = Some(head_pose);
        self
    }

    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion);
        self
    }
}
