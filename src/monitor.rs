//! The monitor: one detector registry, one shared session, and the settings
//! every stream and endpoint reads.

use std::sync::Arc;

use crate::config::MonitorConfig;
use crate::detect::DetectorRegistry;
use crate::error::MonitorError;
use crate::ingest::{self, FrameSource};
use crate::pipeline::FrameProcessor;
use crate::session::{CountsSnapshot, SessionReport, SharedSession};
use crate::stream::{CancelToken, StreamDriver};

pub struct Monitor {
    config: MonitorConfig,
    registry: Arc<DetectorRegistry>,
    session: SharedSession,
    shutdown: CancelToken,
}

impl Monitor {
    pub fn new(config: MonitorConfig, registry: DetectorRegistry) -> Self {
        let session = SharedSession::new(config.session.clone());
        Self {
            config,
            registry: Arc::new(registry),
            session,
            shutdown: CancelToken::new(),
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Stop every open stream at its next frame.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn processor(&self) -> FrameProcessor {
        FrameProcessor::new(self.registry.clone())
            .with_slow_detector_threshold(self.config.slow_detector)
    }

    /// Open the configured camera and start a stream on it.
    pub fn open_stream(&self) -> Result<StreamDriver, MonitorError> {
        let camera = ingest::open_camera(&self.config.camera)?;
        log::info!("stream: opened {}", self.config.camera.device);
        Ok(self.stream_from(Box::new(camera)))
    }

    /// Start a stream on an already connected source.
    pub fn stream_from(&self, source: Box<dyn FrameSource>) -> StreamDriver {
        StreamDriver::new(
            source,
            self.processor(),
            self.session.clone(),
            self.config.stream,
            self.shutdown.clone(),
        )
    }

    pub fn probe_camera(&self) -> Result<(), MonitorError> {
        ingest::probe_camera(&self.config.camera)
    }

    pub fn detection_counts(&self) -> Result<CountsSnapshot, MonitorError> {
        self.session.counts()
    }

    /// Final report for the current session; counters start again from zero.
    pub fn end_session(&self) -> Result<SessionReport, MonitorError> {
        self.session.finalize()
    }
}
