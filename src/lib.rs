//! Proctoring monitor.
//!
//! Watches a live camera feed during a remote interview. Every captured frame
//! runs through five independent detectors (phone/person, gaze, mouth, head pose,
//! emotion); their results are merged into running session statistics, and the
//! annotated frame is streamed as MJPEG.
//!
//! # Data flow
//!
//! ```text
//! StreamDriver -> FrameProcessor -> detectors (fan-out)
//!              -> SharedSession (counters + event history)
//!              -> timestamp overlay -> JPEG -> multipart chunk
//! ```
//!
//! # Module Structure
//!
//! - `detect`: detector capabilities, typed results, backend trait and registry
//! - `pipeline`: per-frame detector driver with failure isolation
//! - `session`: aggregation state, event history, end-of-session report
//! - `ingest`: camera sources (`stub://` synthetic, V4L2 behind `ingest-v4l2`)
//! - `stream`: capture loop as an iterator of multipart chunks
//! - `monitor`: ties registry, session and settings together for the API
//! - `api`: HTTP endpoints

pub mod annotate;
pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod pipeline;
pub mod session;
pub mod stream;

pub use api::{ApiConfig, ApiHandle, ApiServer};
pub use config::MonitorConfig;
pub use detect::{
    DetectionCapability, DetectorBackend, DetectorOutput, DetectorRegistry, FrameDetections,
};
pub use error::MonitorError;
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, FrameSource};
pub use monitor::Monitor;
pub use pipeline::{FrameProcessor, ProcessedFrame};
pub use session::{
    CountsSnapshot, DetectionEvent, MouthCounting, SessionReport, SessionSettings, SharedSession,
};
pub use stream::{CancelToken, StreamDriver, StreamEnd, StreamSettings};

/// Local wall-clock time as `YYYY-MM-DD HH:MM:SS`, used for events, reports and
/// the frame overlay.
pub fn display_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Local wall-clock time in ISO-8601 with microseconds and no offset.
pub fn iso_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_formats() {
        let display = display_timestamp();
        assert_eq!(display.len(), 19);
        assert_eq!(&display[4..5], "-");
        assert_eq!(&display[10..11], " ");

        let iso = iso_timestamp();
        assert_eq!(&iso[10..11], "T");
        assert_eq!(iso.len(), 26);
    }
}
