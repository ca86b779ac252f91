use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::Rgb;

use crate::detect::backend::{Detected, DetectionCapability, DetectorBackend};
use crate::detect::result::DetectorOutput;
use crate::frame::Frame;

/// Marker colour a scripted backend stamps at (`slot`, 0) when it emits.
pub const SCRIPTED_MARK: Rgb<u8> = Rgb([255, 0, 255]);

/// One scripted call outcome.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// Return this output and a marked copy of the frame.
    Emit(DetectorOutput),
    /// Return an error.
    Fail(String),
    /// Panic inside `detect`.
    Panic(String),
    /// Return a frame of a different size (contract violation).
    Reshape { width: u32, height: u32 },
}

/// Backend that replays a fixed sequence of outcomes, then reports absent.
///
/// Pipeline and session tests use it to pin down exactly what each detector
/// returns on each frame.
pub struct ScriptedBackend {
    capability: DetectionCapability,
    steps: VecDeque<ScriptStep>,
    calls: Arc<AtomicU64>,
}

impl ScriptedBackend {
    pub fn new(capability: DetectionCapability, steps: Vec<ScriptStep>) -> Self {
        Self {
            capability,
            steps: steps.into(),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared call counter; stays valid after the backend moves into a registry.
    pub fn calls(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capability(&self) -> DetectionCapability {
        self.capability
    }

    fn detect(&mut self, frame: &Frame) -> Result<Detected> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .pop_front()
            .unwrap_or_else(|| ScriptStep::Emit(DetectorOutput::absent(self.capability)));
        match step {
            ScriptStep::Emit(output) => {
                let mut annotated = frame.clone();
                let x = self.capability.slot() as u32;
                if x < annotated.width() && annotated.height() > 0 {
                    annotated.image_mut().put_pixel(x, 0, SCRIPTED_MARK);
                }
                Ok(Detected::new(annotated, output))
            }
            ScriptStep::Fail(reason) => Err(anyhow!(reason)),
            ScriptStep::Panic(reason) => panic!("{}", reason),
            ScriptStep::Reshape { width, height } => Ok(Detected::new(
                Frame::filled(width, height, [0, 0, 0], frame.sequence()),
                DetectorOutput::absent(self.capability),
            )),
        }
    }
}
