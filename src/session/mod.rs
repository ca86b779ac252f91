//! Session aggregation.
//!
//! `AggregationState` holds the running counters and event history. The process
//! shares one of them through `SharedSession`, which funnels every mutation
//! through a single mutex: a frame's counter updates and its history append
//! happen under one acquisition, and end-of-session reporting computes and
//! resets under another, so neither can observe the other half-done.

mod counts;
mod history;
mod report;
mod state;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::detect::FrameDetections;
use crate::error::MonitorError;

pub use counts::{percentage, CountMap, PercentMap};
pub use history::{DetectionEvent, EventHistory};
pub use report::{LabelSummary, MouthSummary, PhoneSummary, SessionReport};
pub use state::{AggregationState, CountingRules, CountsSnapshot, MouthCounting};

pub const DEFAULT_ASSUMED_FPS: u32 = 30;
pub const DEFAULT_HISTORY_WINDOW: usize = 10;
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub rules: CountingRules,
    pub assumed_fps: u32,
    /// Events returned by the counts endpoint.
    pub history_window: usize,
    pub history_capacity: usize,
    pub clear_history_on_end: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            rules: CountingRules::default(),
            assumed_fps: DEFAULT_ASSUMED_FPS,
            history_window: DEFAULT_HISTORY_WINDOW,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            clear_history_on_end: false,
        }
    }
}

/// Cloneable handle to the process-wide session.
#[derive(Clone)]
pub struct SharedSession {
    state: Arc<Mutex<AggregationState>>,
    settings: Arc<SessionSettings>,
}

impl SharedSession {
    pub fn new(settings: SessionSettings) -> Self {
        let state = AggregationState::new(settings.rules, settings.history_capacity);
        Self {
            state: Arc::new(Mutex::new(state)),
            settings: Arc::new(settings),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, AggregationState>, MonitorError> {
        self.state
            .lock()
            .map_err(|_| MonitorError::AggregateCompute("session state lock poisoned".into()))
    }

    /// Fold one processed frame into the session.
    pub fn record(
        &self,
        detections: &FrameDetections,
    ) -> Result<Option<DetectionEvent>, MonitorError> {
        let timestamp = crate::display_timestamp();
        let mut state = self.lock()?;
        let event = state.apply(detections, &timestamp).cloned();
        drop(state);
        if let Some(event) = &event {
            log::info!(
                "detection at frame {}: phone={} eye={:?} mouth_open={} ({:.2}) head_pose={:?} emotion={:?}",
                event.frame,
                event.phone,
                event.eye_tracking.and_then(|eye| eye.direction()),
                event.mouth_open,
                event.mouth_confidence,
                event.head_pose.and_then(|pose| pose.direction),
                event.current_emotion
            );
        }
        Ok(event)
    }

    /// Counters plus the most recent history window.
    pub fn counts(&self) -> Result<CountsSnapshot, MonitorError> {
        let timestamp = crate::display_timestamp();
        let state = self.lock()?;
        Ok(state.counts_snapshot(self.settings.history_window, &timestamp))
    }

    /// Compute the end-of-session report and reset the counters in one step.
    pub fn finalize(&self) -> Result<SessionReport, MonitorError> {
        let timestamp = crate::display_timestamp();
        let mut state = self.lock()?;
        let report = SessionReport::compute(&state, self.settings.assumed_fps, &timestamp);
        let (events, evicted) = (state.history().len(), state.history().evicted());
        state.reset_counters();
        if self.settings.clear_history_on_end {
            state.clear_history();
        }
        drop(state);
        log::info!(
            "session finalized: {} frames, {:.1}s, {} events kept in history ({} evicted){}",
            report.total_frames,
            report.session_duration,
            events,
            evicted,
            if self.settings.clear_history_on_end {
                ", history cleared"
            } else {
                ""
            }
        );
        Ok(report)
    }

    pub fn total_frames(&self) -> Result<u64, MonitorError> {
        Ok(self.lock()?.total_frames())
    }

    pub fn history_len(&self) -> Result<usize, MonitorError> {
        Ok(self.lock()?.history().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Emotion, MouthResult};
    use std::thread;

    #[test]
    fn finalize_resets_counts_but_keeps_history_by_default() {
        let session = SharedSession::new(SessionSettings::default());
        session
            .record(&FrameDetections::default().with_emotion(Emotion::Happy))
            .unwrap();
        let report = session.finalize().unwrap();
        assert_eq!(report.total_frames, 1);

        let counts = session.counts().unwrap();
        assert_eq!(counts.total_frames, 0);
        assert_eq!(counts.emotion_counts.total(), 0);
        assert_eq!(counts.detection_history.len(), 1);
    }

    #[test]
    fn finalize_clears_history_when_configured() {
        let session = SharedSession::new(SessionSettings {
            clear_history_on_end: true,
            ..SessionSettings::default()
        });
        session
            .record(&FrameDetections::default().with_mouth(MouthResult::open(0.7)))
            .unwrap();
        session.finalize().unwrap();
        assert_eq!(session.history_len().unwrap(), 0);
    }

    #[test]
    fn finalize_with_a_full_history_keeps_only_capacity() {
        let session = SharedSession::new(SessionSettings {
            history_window: 2,
            history_capacity: 3,
            ..SessionSettings::default()
        });
        for _ in 0..5 {
            session
                .record(&FrameDetections::default().with_emotion(Emotion::Sad))
                .unwrap();
        }
        let report = session.finalize().unwrap();
        assert_eq!(report.total_frames, 5);
        assert_eq!(session.history_len().unwrap(), 3);
        let window = session.counts().unwrap().detection_history;
        assert_eq!(
            window.iter().map(|event| event.frame).collect::<Vec<_>>(),
            vec![4, 5]
        );
    }

    #[test]
    fn concurrent_recording_and_finalizing_loses_no_frames() {
        let session = SharedSession::new(SessionSettings::default());
        let writer = {
            let session = session.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    session
                        .record(&FrameDetections::default().with_emotion(Emotion::Neutral))
                        .unwrap();
                }
            })
        };
        let mut reported = 0;
        for _ in 0..20 {
            let report = session.finalize().unwrap();
            assert_eq!(
                report.emotions.counts.get(Emotion::Neutral),
                report.total_frames
            );
            reported += report.total_frames;
        }
        writer.join().unwrap();
        reported += session.finalize().unwrap().total_frames;
        assert_eq!(reported, 500);
    }
}
