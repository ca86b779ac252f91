use anyhow::Result;
use image::Rgb;
use sha2::{Digest, Sha256};

use crate::annotate;
use crate::detect::backend::{Detected, DetectionCapability, DetectorBackend};
use crate::detect::result::{
    parse_label, DetectorOutput, EyeDirection, EyeResult, HeadPoseResult, MouthResult,
    PhoneResult,
};
use crate::frame::Frame;

const PIXEL_SAMPLE_STRIDE: usize = 997;

/// Raw labels in the form a classifier head reports them.
const EMOTION_LABELS: [&str; 7] = [
    "angry", "disgust", "fear", "happy", "sad", "surprise", "neutral",
];
const HEAD_POSE_LABELS: [&str; 5] = ["Head up", "Head down", "Head left", "Head right", "Normal"];

/// Deterministic stand-in for a vision model.
///
/// Hashes a sparse pixel sample together with the frame sequence and seed, and
/// maps the digest onto a plausible result distribution: mostly "normal"
/// readings with occasional excursions. Used with `stub://` cameras and for
/// offline replays; the same frame and seed always give the same result.
pub struct SyntheticBackend {
    capability: DetectionCapability,
    seed: u64,
}

impl SyntheticBackend {
    pub fn new(capability: DetectionCapability) -> Self {
        Self {
            capability,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// One backend per capability, in pipeline order.
    pub fn full_set(seed: u64) -> Vec<Self> {
        DetectionCapability::PIPELINE_ORDER
            .iter()
            .map(|capability| Self::new(*capability).with_seed(seed))
            .collect()
    }

    fn digest(&self, frame: &Frame) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(self.capability.name().as_bytes());
        hasher.update(frame.sequence().to_le_bytes());
        for &p in frame.pixels().iter().step_by(PIXEL_SAMPLE_STRIDE) {
            hasher.update([p]);
        }
        hasher.finalize().into()
    }

    fn classify(&self, d: &[u8; 32]) -> DetectorOutput {
        match self.capability {
            DetectionCapability::PhonePerson => DetectorOutput::Phone((d[0] >= 26).then(|| {
                PhoneResult {
                    phone_detected: d[1] < 13,
                    person_count: if d[2] < 8 { 2 } else { 1 },
                }
            })),
            DetectionCapability::Gaze => DetectorOutput::Eye((d[0] >= 26).then(|| {
                let direction = match d[1] {
                    0..=25 => EyeDirection::Left,
                    26..=51 => EyeDirection::Right,
                    52..=76 => EyeDirection::Up,
                    _ => EyeDirection::Normal,
                };
                EyeResult::looking(direction)
            })),
            DetectionCapability::Mouth => {
                let confidence = 0.3 + (d[1] as f32 / 255.0) * 0.7;
                DetectorOutput::Mouth(Some(MouthResult {
                    mouth_open: d[0] < 40,
                    confidence,
                }))
            }
            DetectionCapability::HeadPose => {
                let raw = (d[0] >= 26).then(|| match d[1] {
                    0..=18 => HEAD_POSE_LABELS[0],
                    19..=37 => HEAD_POSE_LABELS[1],
                    38..=56 => HEAD_POSE_LABELS[2],
                    57..=75 => HEAD_POSE_LABELS[3],
                    _ => HEAD_POSE_LABELS[4],
                });
                DetectorOutput::HeadPose(raw.and_then(HeadPoseResult::from_label))
            }
            DetectionCapability::Emotion => DetectorOutput::Emotion(if d[0] >= 51 {
                parse_label(
                    self.capability,
                    EMOTION_LABELS[d[1] as usize % EMOTION_LABELS.len()],
                )
            } else {
                None
            }),
        }
    }
}

impl DetectorBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        match self.capability {
            DetectionCapability::PhonePerson => "synthetic-phone",
            DetectionCapability::Gaze => "synthetic-eye",
            DetectionCapability::Mouth => "synthetic-mouth",
            DetectionCapability::HeadPose => "synthetic-head-pose",
            DetectionCapability::Emotion => "synthetic-emotion",
        }
    }

    fn capability(&self) -> DetectionCapability {
        self.capability
    }

    fn detect(&mut self, frame: &Frame) -> Result<Detected> {
        let output = self.classify(&self.digest(frame));
        let mut annotated = frame.clone();
        if let Some(tag) = tag_text(&output) {
            annotate::draw_tag(
                &mut annotated,
                self.capability.slot(),
                &tag,
                Rgb([255, 255, 0]),
            );
        }
        Ok(Detected::new(annotated, output))
    }
}

fn tag_text(output: &DetectorOutput) -> Option<String> {
    match output {
        DetectorOutput::Phone(Some(phone)) => Some(format!(
            "PERSONS {} PHONE {}",
            phone.person_count,
            if phone.phone_detected { "YES" } else { "NO" }
        )),
        DetectorOutput::Eye(Some(eye)) => eye.direction().map(|d| format!("EYES {}", d)),
        DetectorOutput::Mouth(Some(mouth)) if mouth.mouth_open => {
            Some(format!("MOUTH OPEN {:.0}%", mouth.confidence * 100.0))
        }
        DetectorOutput::HeadPose(Some(HeadPoseResult {
            direction: Some(direction),
        })) => Some(format!("POSE {}", direction)),
        DetectorOutput::Emotion(Some(emotion)) => Some(format!("EMOTION {}", emotion)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_backend_is_deterministic_per_frame_and_seed() {
        let frame = Frame::filled(64, 48, [40, 80, 120], 7);
        let mut a = SyntheticBackend::new(DetectionCapability::Emotion).with_seed(3);
        let mut b = SyntheticBackend::new(DetectionCapability::Emotion).with_seed(3);
        assert_eq!(
            a.detect(&frame).unwrap().output,
            b.detect(&frame).unwrap().output
        );
    }

    #[test]
    fn synthetic_backend_preserves_frame_shape_and_capability() {
        for mut backend in SyntheticBackend::full_set(11) {
            for sequence in 0..20 {
                let frame = Frame::filled(96, 72, [0, 0, 0], sequence);
                let detected = backend.detect(&frame).unwrap();
                assert!(detected.frame.same_shape(&frame));
                assert_eq!(detected.output.capability(), backend.capability());
            }
        }
    }

    #[test]
    fn synthetic_mouth_always_reports() {
        let mut backend = SyntheticBackend::new(DetectionCapability::Mouth);
        for sequence in 0..50 {
            let frame = Frame::filled(32, 32, [9, 9, 9], sequence);
            match backend.detect(&frame).unwrap().output {
                DetectorOutput::Mouth(Some(mouth)) => {
                    assert!(mouth.confidence >= 0.3 && mouth.confidence <= 1.0 + f32::EPSILON)
                }
                other => panic!("unexpected output {:?}", other),
            }
        }
    }
}
