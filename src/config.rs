use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::commands::CommandSettings;
use crate::control::{LineFollowController, LineTuning};
use crate::ingest::CameraConfig;
use crate::scheduler::SchedulerConfig;
use crate::vision::{LineColorProfile, LineExtractor, LineExtractorConfig};
use crate::ServoAngles;

const DEFAULT_API_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_CAMERA_SOURCE: &str = "stub://line";
const DEFAULT_CAMERA_WIDTH: u32 = 320;
const DEFAULT_CAMERA_HEIGHT: u32 = 240;
const DEFAULT_CAMERA_FPS: u32 = 50;
const DEFAULT_TICK_MS: u64 = 20;
const DEFAULT_CAPTURE_BACKOFF_MS: u64 = 100;
const DEFAULT_IDLE_BACKOFF_MS: u64 = 100;
const DEFAULT_CAPTURE_RETRIES: u32 = 5;
const DEFAULT_LINE_COLOR: &str = "black";
const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Deserialize, Default)]
struct RoverdConfigFile {
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    face: Option<FaceConfigFile>,
    control: Option<ControlConfigFile>,
    line: Option<LineConfigFile>,
    stream: Option<StreamConfigFile>,
    servo: Option<ServoConfigFile>,
    sequence: Option<SequenceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    mirror: Option<bool>,
    failure_rate: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct FaceConfigFile {
    model_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlConfigFile {
    tick_interval_ms: Option<u64>,
    capture_backoff_ms: Option<u64>,
    idle_backoff_ms: Option<u64>,
    capture_retries: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LineConfigFile {
    color: Option<String>,
    band_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct ServoConfigFile {
    pan: Option<u8>,
    tilt: Option<u8>,
    pan_channel: Option<u8>,
    tilt_channel: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct SequenceConfigFile {
    speed: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RoverdConfig {
    pub api_addr: String,
    pub camera: CameraConfig,
    pub mirror: bool,
    /// `None` disables face tracking. `stub://centre` selects a fixed locator.
    pub face_model: Option<String>,
    pub tick_interval: Duration,
    pub capture_backoff: Duration,
    pub idle_backoff: Duration,
    pub capture_retries: u32,
    pub line_color: LineColorProfile,
    pub line_band: LineExtractorConfig,
    pub jpeg_quality: u8,
    pub servo: ServoAngles,
    pub pan_channel: u8,
    pub tilt_channel: u8,
    pub sequence_speed: u32,
}

impl RoverdConfig {
    /// Load from the file named by `ROVER_CONFIG` (if set), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROVER_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RoverdConfigFile) -> Result<Self> {
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            source: camera_file
                .source
                .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string()),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            failure_rate: camera_file.failure_rate.unwrap_or(0.0),
        };

        let control = file.control.unwrap_or_default();
        let servo_file = file.servo.unwrap_or_default();
        let defaults = CommandSettings::default();
        let start = ServoAngles::default();

        let line_file = file.line.unwrap_or_default();
        let color_name = line_file
            .color
            .unwrap_or_else(|| DEFAULT_LINE_COLOR.to_string());
        let band_defaults = LineExtractorConfig::default();

        Ok(Self {
            api_addr,
            camera,
            mirror: camera_file.mirror.unwrap_or(true),
            face_model: file.face.and_then(|face| face.model_path),
            tick_interval: Duration::from_millis(
                control.tick_interval_ms.unwrap_or(DEFAULT_TICK_MS),
            ),
            capture_backoff: Duration::from_millis(
                control
                    .capture_backoff_ms
                    .unwrap_or(DEFAULT_CAPTURE_BACKOFF_MS),
            ),
            idle_backoff: Duration::from_millis(
                control.idle_backoff_ms.unwrap_or(DEFAULT_IDLE_BACKOFF_MS),
            ),
            capture_retries: control.capture_retries.unwrap_or(DEFAULT_CAPTURE_RETRIES),
            line_color: resolve_color(&color_name)?,
            line_band: LineExtractorConfig {
                band_height: line_file.band_height.unwrap_or(band_defaults.band_height),
                ..band_defaults
            },
            jpeg_quality: file
                .stream
                .and_then(|stream| stream.jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            servo: ServoAngles::new(
                servo_file.pan.unwrap_or(start.pan),
                servo_file.tilt.unwrap_or(start.tilt),
            ),
            pan_channel: servo_file.pan_channel.unwrap_or(defaults.pan_channel),
            tilt_channel: servo_file.tilt_channel.unwrap_or(defaults.tilt_channel),
            sequence_speed: file
                .sequence
                .and_then(|sequence| sequence.speed)
                .unwrap_or(defaults.sequence_speed),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("ROVER_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(camera) = std::env::var("ROVER_CAMERA") {
            if !camera.trim().is_empty() {
                self.camera.source = camera;
            }
        }
        if let Ok(model) = std::env::var("ROVER_FACE_MODEL") {
            if !model.trim().is_empty() {
                self.face_model = Some(model);
            }
        }
        if let Ok(tick) = std::env::var("ROVER_TICK_MS") {
            let millis: u64 = tick
                .parse()
                .map_err(|_| anyhow!("ROVER_TICK_MS must be an integer number of milliseconds"))?;
            self.tick_interval = Duration::from_millis(millis);
        }
        if let Ok(color) = std::env::var("ROVER_LINE_COLOR") {
            if !color.trim().is_empty() {
                self.line_color = resolve_color(&color)?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be non-zero"));
        }
        let band = self.line_band.band_height;
        if band == 0 {
            return Err(anyhow!("line.band_height must be at least 1"));
        }
        if self.camera.height < band {
            return Err(anyhow!(
                "camera height {} is smaller than the line band ({} rows)",
                self.camera.height,
                band
            ));
        }
        if !(0.0..=1.0).contains(&self.camera.failure_rate) {
            return Err(anyhow!("camera.failure_rate must be within 0.0..=1.0"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("stream.jpeg_quality must be within 1..=100"));
        }
        if self.capture_retries == 0 {
            return Err(anyhow!("control.capture_retries must be at least 1"));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: self.tick_interval,
            capture_backoff: self.capture_backoff,
            capture_retries: self.capture_retries,
            idle_backoff: self.idle_backoff,
            mirror: self.mirror,
            jpeg_quality: self.jpeg_quality,
            ..SchedulerConfig::default()
        }
    }

    pub fn line_follower(&self) -> LineFollowController {
        LineFollowController::new(LineExtractor::new(self.line_band), LineTuning::default())
    }

    pub fn command_settings(&self) -> CommandSettings {
        CommandSettings {
            sequence_speed: self.sequence_speed,
            pan_channel: self.pan_channel,
            tilt_channel: self.tilt_channel,
            ..CommandSettings::default()
        }
    }
}

fn resolve_color(name: &str) -> Result<LineColorProfile> {
    LineColorProfile::preset(name).ok_or_else(|| anyhow!("unknown line color '{}'", name.trim()))
}

fn read_config_file(path: &Path) -> Result<RoverdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
