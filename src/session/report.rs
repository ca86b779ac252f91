use serde::Serialize;

use crate::detect::{Emotion, EyeDirection, HeadPoseDirection, Label};

use super::counts::{percentage, CountMap, PercentMap};
use super::state::AggregationState;

#[derive(Clone, Debug, Serialize)]
pub struct PhoneSummary {
    pub total_detections: u64,
    pub percentage: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LabelSummary<K: Label> {
    pub counts: CountMap<K>,
    pub percentages: PercentMap<K>,
}

impl<K: Label> LabelSummary<K> {
    fn from_counts(counts: &CountMap<K>, total_frames: u64) -> Self {
        Self {
            counts: counts.clone(),
            percentages: counts.percentages(total_frames),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MouthSummary {
    pub total_open_count: u64,
    pub percentage: f64,
}

/// Body of `/api/end-interview`.
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub total_frames: u64,
    pub phone_detection: PhoneSummary,
    pub eye_movements: LabelSummary<EyeDirection>,
    pub head_pose: LabelSummary<HeadPoseDirection>,
    pub emotions: LabelSummary<Emotion>,
    pub mouth_movements: MouthSummary,
    /// `total_frames / assumed_fps`.
    pub session_duration: f64,
    pub timestamp: String,
}

impl SessionReport {
    /// Compute the report from the current counters. Does not modify `state`.
    pub fn compute(state: &AggregationState, assumed_fps: u32, timestamp: &str) -> Self {
        let total = state.total_frames();
        let session_duration = if assumed_fps == 0 {
            0.0
        } else {
            total as f64 / f64::from(assumed_fps)
        };
        Self {
            total_frames: total,
            phone_detection: PhoneSummary {
                total_detections: state.phone_detected_count(),
                percentage: percentage(state.phone_detected_count(), total),
            },
            eye_movements: LabelSummary::from_counts(state.eye_movement_counts(), total),
            head_pose: LabelSummary::from_counts(state.head_pose_counts(), total),
            emotions: LabelSummary::from_counts(state.emotion_counts(), total),
            mouth_movements: MouthSummary {
                total_open_count: state.mouth_open_count(),
                percentage: percentage(state.mouth_open_count(), total),
            },
            session_duration,
            timestamp: timestamp.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{FrameDetections, MouthResult, PhoneResult};
    use crate::session::state::CountingRules;

    const TS: &str = "2024-05-01 10:00:00";

    #[test]
    fn empty_session_reports_zero_everywhere() {
        let state = AggregationState::new(CountingRules::default(), 10);
        let report = SessionReport::compute(&state, 30, TS);
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["total_frames"], 0);
        assert_eq!(json["phone_detection"]["percentage"], 0.0);
        assert_eq!(json["mouth_movements"]["percentage"], 0.0);
        assert_eq!(json["session_duration"], 0.0);
        for section in ["eye_movements", "head_pose", "emotions"] {
            let percentages = json[section]["percentages"].as_object().expect("object");
            assert!(!percentages.is_empty());
            assert!(percentages.values().all(|v| v.as_f64() == Some(0.0)));
        }
    }

    #[test]
    fn percentages_and_duration_follow_frame_total() {
        let mut state = AggregationState::new(CountingRules::default(), 10);
        let phone = FrameDetections::default().with_phone(PhoneResult {
            phone_detected: true,
            person_count: 1,
        });
        state.apply(&phone, TS);
        state.apply(
            &FrameDetections::default()
                .with_emotion(Emotion::Happy)
                .with_mouth(MouthResult::open(0.8)),
            TS,
        );
        for _ in 0..58 {
            state.apply(&FrameDetections::default(), TS);
        }

        let report = SessionReport::compute(&state, 30, TS);
        assert_eq!(report.total_frames, 60);
        assert_eq!(report.session_duration, 2.0);
        assert_eq!(report.phone_detection.total_detections, 1);
        assert!((report.phone_detection.percentage - 100.0 / 60.0).abs() < 1e-9);
        assert_eq!(report.emotions.counts.get(Emotion::Happy), 1);
        assert!((report.emotions.percentages.get(Emotion::Happy) - 100.0 / 60.0).abs() < 1e-9);
        assert_eq!(report.mouth_movements.total_open_count, 1);
    }
}
