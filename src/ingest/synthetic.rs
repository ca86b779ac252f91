use anyhow::{anyhow, Context, Result};

use super::{CameraConfig, FrameSource, SourceStats};
use crate::frame::Frame;

/// Options parsed from a `stub://name?key=value&...` device string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StubOptions {
    pub name: String,
    /// Reads fail once this many frames have been delivered.
    pub frames: Option<u64>,
    /// `connect` fails.
    pub fail_connect: bool,
}

impl StubOptions {
    pub fn parse(device: &str) -> Result<Self> {
        let rest = device
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("not a stub device: {}", device))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, query),
            None => (rest, ""),
        };
        let mut options = StubOptions {
            name: name.to_string(),
            ..StubOptions::default()
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "frames" => {
                    options.frames = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid frames value '{}'", value))?,
                    )
                }
                "fail" if value == "connect" => options.fail_connect = true,
                _ => return Err(anyhow!("unknown stub option '{}'", pair)),
            }
        }
        Ok(options)
    }
}

/// Synthetic camera for `stub://` devices.
///
/// Produces a slowly shifting gradient with a little per-frame noise, so
/// consecutive frames differ the way a live scene does.
pub struct SyntheticCamera {
    config: CameraConfig,
    options: StubOptions,
    connected: bool,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic camera needs a non-zero frame size"));
        }
        let options = StubOptions::parse(&config.device)?;
        Ok(Self {
            config,
            options,
            connected: false,
            frame_count: 0,
            scene_state: 0,
        })
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut pixels = vec![0u8; width * height * 3];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = (i % width) as u64;
            let y = (i / width) as u64;
            let shift = self.frame_count + self.scene_state as u64;
            px[0] = ((x * 255 / width as u64 + shift) % 256) as u8;
            px[1] = ((y * 255 / height as u64) % 256) as u8;
            px[2] = ((x + y + shift) % 256) as u8;
        }
        for _ in 0..16 {
            let idx = rand::random::<usize>() % pixels.len();
            pixels[idx] = rand::random();
        }
        pixels
    }
}

impl FrameSource for SyntheticCamera {
    fn connect(&mut self) -> Result<()> {
        if self.options.fail_connect {
            return Err(anyhow!("{}: device did not open", self.config.device));
        }
        self.connected = true;
        log::info!(
            "camera: connected to {} ({}x{}, synthetic)",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("{}: camera not connected", self.config.device));
        }
        if self.options.frames.is_some_and(|limit| self.frame_count >= limit) {
            return Err(anyhow!("{}: failed to grab frame", self.config.device));
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::from_rgb(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    fn release(&mut self) {
        if self.connected {
            self.connected = false;
            log::debug!(
                "camera: released {} after {} frames",
                self.config.device,
                self.frame_count
            );
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}
