use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::detect::{Emotion, EyeDirection, FrameDetections, HeadPoseDirection};

use super::counts::CountMap;
use super::history::{DetectionEvent, EventHistory};

/// How a frame with an open mouth contributes to `mouth_open_count`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouthCounting {
    /// One increment when the mouth is open with confidence above the threshold.
    #[default]
    Single,
    /// Historical behaviour: +1 when open above the threshold, then another +1
    /// whenever the mouth is open regardless of confidence.
    LegacyDouble,
}

impl MouthCounting {
    pub fn as_str(self) -> &'static str {
        match self {
            MouthCounting::Single => "single",
            MouthCounting::LegacyDouble => "legacy_double",
        }
    }
}

impl fmt::Display for MouthCounting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MouthCounting {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(MouthCounting::Single),
            "legacy_double" | "legacy-double" => Ok(MouthCounting::LegacyDouble),
            other => Err(anyhow!(
                "unknown mouth counting mode '{}' (expected single or legacy_double)",
                other
            )),
        }
    }
}

/// Counting rules applied per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CountingRules {
    pub mouth_counting: MouthCounting,
    /// Confidence must be strictly greater than this to count.
    pub mouth_confidence_threshold: f32,
}

impl Default for CountingRules {
    fn default() -> Self {
        Self {
            mouth_counting: MouthCounting::Single,
            mouth_confidence_threshold: 0.5,
        }
    }
}

/// Body of `/api/detection-counts`.
#[derive(Clone, Debug, Serialize)]
pub struct CountsSnapshot {
    pub total_frames: u64,
    pub phone_detected_count: u64,
    pub emotion_counts: CountMap<Emotion>,
    pub eye_movement_counts: CountMap<EyeDirection>,
    pub head_pose_counts: CountMap<HeadPoseDirection>,
    pub mouth_open_count: u64,
    pub detection_history: Vec<DetectionEvent>,
    pub timestamp: String,
}

/// Running session counters plus the detection-event history.
#[derive(Clone, Debug)]
pub struct AggregationState {
    rules: CountingRules,
    total_frames: u64,
    phone_detected_count: u64,
    mouth_open_count: u64,
    eye_movement_counts: CountMap<EyeDirection>,
    head_pose_counts: CountMap<HeadPoseDirection>,
    emotion_counts: CountMap<Emotion>,
    history: EventHistory,
}

impl AggregationState {
    pub fn new(rules: CountingRules, history_capacity: usize) -> Self {
        Self {
            rules,
            total_frames: 0,
            phone_detected_count: 0,
            mouth_open_count: 0,
            eye_movement_counts: CountMap::new(),
            head_pose_counts: CountMap::new(),
            emotion_counts: CountMap::new(),
            history: EventHistory::new(history_capacity),
        }
    }

    /// Fold one frame's detections into the counters.
    ///
    /// Returns the event appended to the history, if any detector fired.
    pub fn apply(
        &mut self,
        detections: &FrameDetections,
        timestamp: &str,
    ) -> Option<&DetectionEvent> {
        self.total_frames += 1;

        let phone = detections.phone.is_some_and(|p| p.phone_detected);
        if phone {
            self.phone_detected_count += 1;
        }

        if let Some(direction) = detections.eye.and_then(|eye| eye.direction()) {
            self.eye_movement_counts.increment(direction);
        }

        self.mouth_open_count += self.mouth_increment(detections);

        if let Some(direction) = detections.head_pose.and_then(|pose| pose.direction) {
            self.head_pose_counts.increment(direction);
        }

        if let Some(emotion) = detections.emotion {
            self.emotion_counts.increment(emotion);
        }

        if !detections.any_fired() {
            return None;
        }
        let event = DetectionEvent {
            timestamp: timestamp.to_string(),
            frame: self.total_frames,
            phone_detected_count: self.phone_detected_count,
            mouth_open_count: self.mouth_open_count,
            emotion_counts: self.emotion_counts.clone(),
            eye_movement_counts: self.eye_movement_counts.clone(),
            head_pose_counts: self.head_pose_counts.clone(),
            current_emotion: detections.emotion,
            eye_tracking: detections.eye,
            mouth_open: detections.mouth.mouth_open,
            mouth_confidence: detections.mouth.confidence,
            head_pose: detections.head_pose,
            phone,
        };
        Some(self.history.push(event))
    }

    fn mouth_increment(&self, detections: &FrameDetections) -> u64 {
        let mouth = detections.mouth;
        if !mouth.mouth_open {
            return 0;
        }
        let confident = mouth.confidence > self.rules.mouth_confidence_threshold;
        match self.rules.mouth_counting {
            MouthCounting::Single => u64::from(confident),
            MouthCounting::LegacyDouble => u64::from(confident) + 1,
        }
    }

    /// Zero every counter, keeping all keys. History is untouched.
    pub fn reset_counters(&mut self) {
        self.total_frames = 0;
        self.phone_detected_count = 0;
        self.mouth_open_count = 0;
        self.eye_movement_counts.reset();
        self.head_pose_counts.reset();
        self.emotion_counts.reset();
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn phone_detected_count(&self) -> u64 {
        self.phone_detected_count
    }

    pub fn mouth_open_count(&self) -> u64 {
        self.mouth_open_count
    }

    pub fn eye_movement_counts(&self) -> &CountMap<EyeDirection> {
        &self.eye_movement_counts
    }

    pub fn head_pose_counts(&self) -> &CountMap<HeadPoseDirection> {
        &self.head_pose_counts
    }

    pub fn emotion_counts(&self) -> &CountMap<Emotion> {
        &self.emotion_counts
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    pub fn counts_snapshot(&self, history_window: usize, timestamp: &str) -> CountsSnapshot {
        CountsSnapshot {
            total_frames: self.total_frames,
            phone_detected_count: self.phone_detected_count,
            emotion_counts: self.emotion_counts.clone(),
            eye_movement_counts: self.eye_movement_counts.clone(),
            head_pose_counts: self.head_pose_counts.clone(),
            mouth_open_count: self.mouth_open_count,
            detection_history: self.history.recent(history_window),
            timestamp: timestamp.to_string(),
        }
    }
}
