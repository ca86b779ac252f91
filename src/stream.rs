//! Stream driver.
//!
//! `StreamDriver` is the capture loop for one `/video_feed1` connection, written
//! as an iterator of multipart chunks. Each step captures a frame, runs it
//! through the detectors, records the result in the shared session, stamps the
//! time, and encodes a JPEG part.
//!
//! The stream ends on the first capture or encoding failure, yielding one empty
//! terminal chunk, or when its `CancelToken` fires. The camera is released as
//! soon as the stream ends, and on drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::annotate;
use crate::error::MonitorError;
use crate::ingest::{FrameSource, SourceStats};
use crate::pipeline::FrameProcessor;
use crate::session::SharedSession;

pub const STREAM_BOUNDARY: &str = "frame";
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Frame one JPEG as a multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--");
    part.extend_from_slice(STREAM_BOUNDARY.as_bytes());
    part.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Shared stop flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
    pub timestamp_overlay: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            timestamp_overlay: true,
        }
    }
}

/// Why a stream stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    Cancelled,
    CameraFailed(String),
    EncodingFailed(String),
    SessionFailed(String),
}

pub struct StreamDriver {
    source: Option<Box<dyn FrameSource>>,
    processor: FrameProcessor,
    session: SharedSession,
    settings: StreamSettings,
    cancel: CancelToken,
    ended: Option<StreamEnd>,
    frames_streamed: u64,
    released_stats: Option<SourceStats>,
}

impl StreamDriver {
    /// `source` must already be connected.
    pub fn new(
        source: Box<dyn FrameSource>,
        processor: FrameProcessor,
        session: SharedSession,
        settings: StreamSettings,
        cancel: CancelToken,
    ) -> Self {
        Self {
            source: Some(source),
            processor,
            session,
            settings,
            cancel,
            ended: None,
            frames_streamed: 0,
            released_stats: None,
        }
    }

    pub fn ended(&self) -> Option<&StreamEnd> {
        self.ended.as_ref()
    }

    pub fn frames_streamed(&self) -> u64 {
        self.frames_streamed
    }

    /// Capture counters of the source, kept after it is released.
    pub fn source_stats(&self) -> SourceStats {
        match &self.source {
            Some(source) => source.stats(),
            None => self.released_stats.clone().unwrap_or_default(),
        }
    }

    fn finish(&mut self, end: StreamEnd) {
        self.release_source();
        let stats = self.source_stats();
        match &end {
            StreamEnd::Cancelled => log::info!(
                "stream: {} cancelled after {} frames ({} captured)",
                stats.device,
                self.frames_streamed,
                stats.frames_captured
            ),
            StreamEnd::CameraFailed(reason)
            | StreamEnd::EncodingFailed(reason)
            | StreamEnd::SessionFailed(reason) => log::error!(
                "stream: {} stopped after {} frames ({} captured): {}",
                stats.device,
                self.frames_streamed,
                stats.frames_captured,
                reason
            ),
        }
        self.ended = Some(end);
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            self.released_stats = Some(source.stats());
        }
    }

    fn step(&mut self) -> Result<Vec<u8>, StreamEnd> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| StreamEnd::CameraFailed("camera already released".into()))?;
        let frame = source.next_frame().map_err(|err| {
            StreamEnd::CameraFailed(
                MonitorError::CameraUnavailable(format!("failed to grab frame: {:#}", err))
                    .to_string(),
            )
        })?;

        let processed = self.processor.process(frame);
        self.session
            .record(&processed.detections)
            .map_err(|err| StreamEnd::SessionFailed(err.to_string()))?;

        let mut output = processed.frame;
        if self.settings.timestamp_overlay {
            annotate::overlay_timestamp(&mut output, &crate::display_timestamp());
        }
        let jpeg = annotate::encode_jpeg(&output, self.settings.jpeg_quality)
            .map_err(|err| StreamEnd::EncodingFailed(err.to_string()))?;
        Ok(multipart_part(&jpeg))
    }
}

impl Iterator for StreamDriver {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.ended.is_some() {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finish(StreamEnd::Cancelled);
            return None;
        }
        match self.step() {
            Ok(chunk) => {
                self.frames_streamed += 1;
                Some(chunk)
            }
            Err(end) => {
                self.finish(end);
                Some(Vec::new())
            }
        }
    }
}

impl Drop for StreamDriver {
    fn drop(&mut self) {
        self.release_source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_part_framing() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            part,
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".to_vec()
        );
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
