//! Camera acquisition.
//!
//! `CameraSource` is the single owner of the capture device for one stream. It
//! dispatches to:
//! - a synthetic camera for `stub://` device strings (tests, demos, replays)
//! - a V4L2 device such as `/dev/video0` (feature: ingest-v4l2)
//!
//! Every source hands out owned RGB `Frame`s numbered from 1. `release` gives the
//! device back and is safe to call more than once.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::error::MonitorError;
use crate::frame::Frame;

pub use synthetic::{StubOptions, SyntheticCamera};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::DeviceCamera;

/// Anything the stream driver can pull frames from.
pub trait FrameSource: Send {
    /// Open the underlying device. Called once before the first `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. An error ends the stream; there is no retry.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Release the device. Idempotent.
    fn release(&mut self);

    fn stats(&self) -> SourceStats;
}

/// Capture counters, logged when a stream ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
}

/// Camera settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// `stub://name[?frames=N&fail=connect]` or a device path like `/dev/video0`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Camera chosen from the configured device string.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)?),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(DeviceCamera::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow::anyhow!(
                "camera device {} requires the ingest-v4l2 feature",
                config.device
            ))
        }
    }

    fn inner(&self) -> &dyn FrameSource {
        match &self.backend {
            CameraBackend::Synthetic(source) => source,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source,
        }
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        self.inner_mut().connect()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.inner_mut().next_frame()
    }

    fn release(&mut self) {
        self.inner_mut().release()
    }

    fn stats(&self) -> SourceStats {
        self.inner().stats()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build and connect the configured camera.
pub fn open_camera(config: &CameraConfig) -> Result<CameraSource, MonitorError> {
    let mut camera = CameraSource::new(config.clone())
        .map_err(|err| MonitorError::CameraUnavailable(format!("{:#}", err)))?;
    camera
        .connect()
        .map_err(|err| MonitorError::CameraUnavailable(format!("{:#}", err)))?;
    Ok(camera)
}

/// Open the camera and release it straight away.
pub fn probe_camera(config: &CameraConfig) -> Result<(), MonitorError> {
    let mut camera = open_camera(config)?;
    camera.release();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(device: &str) -> CameraConfig {
        CameraConfig {
            device: device.to_string(),
            width: 32,
            height: 24,
            target_fps: 30,
        }
    }

    #[test]
    fn stub_camera_opens_and_numbers_frames() -> Result<()> {
        let mut camera = open_camera(&stub("stub://desk"))?;
        let first = camera.next_frame()?;
        let second = camera.next_frame()?;
        assert_eq!((first.width(), first.height()), (32, 24));
        assert_eq!(first.sequence(), 1);
        assert_eq!(second.sequence(), 2);
        assert_eq!(camera.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn probe_reports_connect_failures_as_camera_unavailable() {
        let err = probe_camera(&stub("stub://desk?fail=connect")).unwrap_err();
        assert!(matches!(err, MonitorError::CameraUnavailable(_)));
        assert!(probe_camera(&stub("stub://desk")).is_ok());
    }

    #[test]
    fn release_is_idempotent() -> Result<()> {
        let mut camera = open_camera(&stub("stub://desk"))?;
        camera.release();
        camera.release();
        assert!(camera.next_frame().is_err());
        assert_eq!(camera.stats().frames_captured, 0);
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_paths_need_the_v4l2_feature() {
        let err = probe_camera(&stub("/dev/video0")).unwrap_err();
        assert!(err.to_string().contains("ingest-v4l2"));
    }
}
