use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::api::ApiConfig;
use crate::ingest::CameraConfig;
use crate::session::{CountingRules, MouthCounting, SessionSettings};
use crate::stream::StreamSettings;

const DEFAULT_API_ADDR: &str = "0.0.0.0:6500";
const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_SLOW_DETECTOR_MS: u64 = 250;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorConfigFile {
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    stream: Option<StreamConfigFile>,
    session: Option<SessionConfigFile>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
    allowed_origin: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    jpeg_quality: Option<u8>,
    timestamp_overlay: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SessionConfigFile {
    assumed_fps: Option<u32>,
    mouth_counting: Option<MouthCounting>,
    mouth_confidence_threshold: Option<f32>,
    history_window: Option<usize>,
    history_capacity: Option<usize>,
    clear_history_on_end: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    slow_detector_ms: Option<u64>,
}

/// Runtime configuration for the monitor daemon.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub api: ApiConfig,
    pub camera: CameraConfig,
    pub stream: StreamSettings,
    pub session: SessionSettings,
    /// Detector calls slower than this are logged at warn.
    pub slow_detector: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_file(MonitorConfigFile::default())
    }
}

impl MonitorConfig {
    /// Load from the file named by `PROCTOR_CONFIG` (if set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PROCTOR_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => MonitorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let stream = file.stream.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();

        let camera_defaults = CameraConfig::default();
        let stream_defaults = StreamSettings::default();
        let session_defaults = SessionSettings::default();
        let rules_defaults = CountingRules::default();

        Self {
            api: ApiConfig {
                addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
                allowed_origin: api
                    .allowed_origin
                    .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string()),
            },
            camera: CameraConfig {
                device: camera.device.unwrap_or(camera_defaults.device),
                width: camera.width.unwrap_or(camera_defaults.width),
                height: camera.height.unwrap_or(camera_defaults.height),
                target_fps: camera.target_fps.unwrap_or(camera_defaults.target_fps),
            },
            stream: StreamSettings {
                jpeg_quality: stream.jpeg_quality.unwrap_or(stream_defaults.jpeg_quality),
                timestamp_overlay: stream
                    .timestamp_overlay
                    .unwrap_or(stream_defaults.timestamp_overlay),
            },
            session: SessionSettings {
                rules: CountingRules {
                    mouth_counting: session
                        .mouth_counting
                        .unwrap_or(rules_defaults.mouth_counting),
                    mouth_confidence_threshold: session
                        .mouth_confidence_threshold
                        .unwrap_or(rules_defaults.mouth_confidence_threshold),
                },
                assumed_fps: session.assumed_fps.unwrap_or(session_defaults.assumed_fps),
                history_window: session
                    .history_window
                    .unwrap_or(session_defaults.history_window),
                history_capacity: session
                    .history_capacity
                    .unwrap_or(session_defaults.history_capacity),
                clear_history_on_end: session
                    .clear_history_on_end
                    .unwrap_or(session_defaults.clear_history_on_end),
            },
            slow_detector: Duration::from_millis(
                pipeline.slow_detector_ms.unwrap_or(DEFAULT_SLOW_DETECTOR_MS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("PROCTOR_API_ADDR") {
            self.api.addr = addr;
        }
        if let Some(origin) = env_value("PROCTOR_ALLOWED_ORIGIN") {
            self.api.allowed_origin = origin;
        }
        if let Some(device) = env_value("PROCTOR_CAMERA") {
            self.camera.device = device;
        }
        if let Some(quality) = env_value("PROCTOR_JPEG_QUALITY") {
            self.stream.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("PROCTOR_JPEG_QUALITY must be an integer in 1..=100"))?;
        }
        if let Some(fps) = env_value("PROCTOR_ASSUMED_FPS") {
            self.session.assumed_fps = fps
                .parse()
                .map_err(|_| anyhow!("PROCTOR_ASSUMED_FPS must be a positive integer"))?;
        }
        if let Some(mode) = env_value("PROCTOR_MOUTH_COUNTING") {
            self.session.rules.mouth_counting = mode
                .parse()
                .map_err(|err| anyhow!("PROCTOR_MOUTH_COUNTING: {}", err))?;
        }
        if let Some(capacity) = env_value("PROCTOR_HISTORY_CAPACITY") {
            self.session.history_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("PROCTOR_HISTORY_CAPACITY must be a positive integer"))?;
        }
        if let Some(clear) = env_value("PROCTOR_CLEAR_HISTORY_ON_END") {
            self.session.clear_history_on_end = parse_bool(&clear).ok_or_else(|| {
                anyhow!("PROCTOR_CLEAR_HISTORY_ON_END must be true/false (or 1/0)")
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.api.addr.trim().is_empty() {
            return Err(anyhow!("api.addr must not be empty"));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera.device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera.width and camera.height must be greater than zero"));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!("stream.jpeg_quality must be in 1..=100"));
        }
        if self.session.assumed_fps == 0 {
            return Err(anyhow!("session.assumed_fps must be greater than zero"));
        }
        let threshold = self.session.rules.mouth_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "session.mouth_confidence_threshold must be in 0..=1, got {}",
                threshold
            ));
        }
        if self.session.history_capacity == 0 {
            return Err(anyhow!("session.history_capacity must be greater than zero"));
        }
        if self.session.history_window > self.session.history_capacity {
            return Err(anyhow!(
                "session.history_window ({}) must not exceed session.history_capacity ({})",
                self.session.history_window,
                self.session.history_capacity
            ));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
