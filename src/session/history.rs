use std::collections::VecDeque;

use serde::Serialize;

use crate::detect::{Emotion, EyeDirection, EyeResult, HeadPoseDirection, HeadPoseResult};

use super::counts::CountMap;

/// Snapshot taken on a frame where at least one detector fired.
///
/// Counter fields are owned copies; later frames never change a stored event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub timestamp: String,
    /// 1-based frame index within the current session.
    pub frame: u64,
    pub phone_detected_count: u64,
    pub mouth_open_count: u64,
    pub emotion_counts: CountMap<Emotion>,
    pub eye_movement_counts: CountMap<EyeDirection>,
    pub head_pose_counts: CountMap<HeadPoseDirection>,
    pub current_emotion: Option<Emotion>,
    pub eye_tracking: Option<EyeResult>,
    pub mouth_open: bool,
    pub mouth_confidence: f32,
    pub head_pose: Option<HeadPoseResult>,
    pub phone: bool,
}

/// Append-only event log, bounded by `capacity`; the oldest events are evicted.
#[derive(Clone, Debug)]
pub struct EventHistory {
    events: VecDeque<DetectionEvent>,
    capacity: usize,
    evicted: u64,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    pub fn push(&mut self, event: DetectionEvent) -> &DetectionEvent {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
        &self.events[self.events.len() - 1]
    }

    /// The newest `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<DetectionEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events dropped to stay under capacity since creation or the last clear.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.evicted = 0;
    }
}
