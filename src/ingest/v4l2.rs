//! V4L2 camera.
//!
//! Opens a local device node such as `/dev/video0`, asks for RGB24 at the
//! configured size and rate, and accepts whatever the driver settles on as long
//! as it is RGB24, YUYV or MJPEG. Buffers are memory-mapped and converted to an
//! owned `Frame` before the next capture.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CameraConfig, FrameSource, SourceStats};
use crate::frame::Frame;

const MMAP_BUFFERS: u32 = 4;

/// Device and its mmap buffer queue; the queue borrows the device.
#[self_referencing]
struct Capture {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    buffers: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// What the driver actually agreed to.
#[derive(Clone, Copy, Debug)]
struct Negotiated {
    width: u32,
    height: u32,
    format: PixelFormat,
}

pub struct DeviceCamera {
    config: CameraConfig,
    capture: Option<Capture>,
    negotiated: Option<Negotiated>,
    frames: u64,
}

impl DeviceCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            capture: None,
            negotiated: None,
            frames: 0,
        }
    }

    fn negotiate(&self, device: &mut v4l::Device) -> Result<Negotiated> {
        use v4l::video::Capture as _;

        let mut wanted = device.format().context("read v4l2 format")?;
        wanted.width = self.config.width;
        wanted.height = self.config.height;
        wanted.fourcc = v4l::FourCC::new(b"RGB3");

        let granted = device.set_format(&wanted).or_else(|err| {
            log::warn!(
                "camera: {} rejected RGB24 {}x{}: {}",
                self.config.device,
                self.config.width,
                self.config.height,
                err
            );
            device.format().context("read v4l2 format after rejection")
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "camera: {} ignored {} fps request: {}",
                    self.config.device,
                    self.config.target_fps,
                    err
                );
            }
        }

        let format = PixelFormat::from_fourcc(&granted.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "{} delivers unsupported pixel format {}",
                self.config.device,
                granted.fourcc
            )
        })?;
        Ok(Negotiated {
            width: granted.width,
            height: granted.height,
            format,
        })
    }
}

impl FrameSource for DeviceCamera {
    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let negotiated = self.negotiate(&mut device)?;

        let capture = CaptureBuilder {
            device,
            buffers_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
                    .context("map v4l2 capture buffers")
            },
        }
        .try_build()?;

        log::info!(
            "camera: opened {} at {}x{} ({:?})",
            self.config.device,
            negotiated.width,
            negotiated.height,
            negotiated.format
        );
        self.capture = Some(capture);
        self.negotiated = Some(negotiated);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (Some(capture), Some(negotiated)) = (self.capture.as_mut(), self.negotiated) else {
            return Err(anyhow!("{} is not open", self.config.device));
        };
        let rgb = capture.with_mut(|fields| {
            let (raw, _meta) = fields.buffers.next().context("dequeue v4l2 buffer")?;
            normalize_to_rgb(raw, negotiated.width, negotiated.height, negotiated.format)
        })?;

        self.frames += 1;
        Frame::from_rgb(rgb, negotiated.width, negotiated.height, self.frames)
    }

    fn release(&mut self) {
        if self.capture.take().is_some() {
            log::info!(
                "camera: closed {} after {} frames",
                self.config.device,
                self.frames
            );
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames,
            device: self.config.device.clone(),
        }
    }
}
