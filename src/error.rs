use thiserror::Error;

use crate::detect::DetectionCapability;

/// Failure classes surfaced by the monitor.
///
/// Detector failures never leave the frame processor; they are recorded on the
/// processed frame and logged. The other variants end a stream or become an
/// HTTP 500 response.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("{detector} detector failed: {reason}")]
    DetectorFailure {
        detector: DetectionCapability,
        reason: String,
    },
    #[error("frame encoding failed: {0}")]
    EncodingFailure(String),
    #[error("session aggregate unavailable: {0}")]
    AggregateCompute(String),
}
