//! Synthetic frame source (`stub://<scene>`).
//!
//! Renders a light floor seen from a downward-tilted camera:
//! - `line`: one dark line swaying left and right over time
//! - `junction`: a fork, two dark branches visible in the lower band
//! - `blank`: floor only
//!
//! Frames carry a sprinkle of dark speckle so the morphology stage has work
//! to do. A configurable failure rate injects transient capture errors.

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{CameraConfig, FrameSource, SourceStats};
use crate::frame::Frame;

const FLOOR: [u8; 3] = [196, 192, 184];
const TAPE: [u8; 3] = [18, 18, 22];
const LINE_HALF_WIDTH: i32 = 12;
const SPECKLE_COUNT: usize = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scene {
    Line,
    Junction,
    Blank,
}

impl Scene {
    fn parse(url: &str) -> Result<Self> {
        match url.trim_start_matches("stub://") {
            "" | "line" => Ok(Scene::Line),
            "junction" => Ok(Scene::Junction),
            "blank" => Ok(Scene::Blank),
            other => Err(anyhow!("unknown synthetic scene '{}'", other)),
        }
    }
}

pub struct SyntheticSource {
    config: CameraConfig,
    scene: Scene,
    frame_count: u64,
    failures: u64,
    stopped: bool,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source needs non-zero dimensions"));
        }
        if !(0.0..=1.0).contains(&config.failure_rate) {
            return Err(anyhow!("failure_rate must be within 0.0..=1.0"));
        }
        let scene = Scene::parse(&config.source)?;
        Ok(Self {
            config,
            scene,
            frame_count: 0,
            failures: 0,
            stopped: false,
        })
    }

    pub fn scene(&self) -> Scene {
        self.scene
    }

    fn render(&self) -> Frame {
        let w = self.config.width as i32;
        let h = self.config.height as i32;
        let mut frame = Frame::filled(self.config.width, self.config.height, FLOOR);

        match self.scene {
            Scene::Line => {
                let phase = self.frame_count as f64 / 25.0;
                let center = w / 2 + ((w / 6) as f64 * phase.sin()) as i32;
                frame.fill_rect(
                    center - LINE_HALF_WIDTH,
                    0,
                    center + LINE_HALF_WIDTH,
                    h - 1,
                    TAPE,
                );
            }
            Scene::Junction => {
                let left = w / 2 - w / 5;
                let right = w / 2 + w / 4;
                frame.fill_rect(
                    left - LINE_HALF_WIDTH,
                    h / 2,
                    left + LINE_HALF_WIDTH,
                    h - 1,
                    TAPE,
                );
                frame.fill_rect(
                    right - LINE_HALF_WIDTH,
                    h / 2,
                    right + LINE_HALF_WIDTH,
                    h - 1,
                    TAPE,
                );
            }
            Scene::Blank => {}
        }

        let mut rng = rand::thread_rng();
        for _ in 0..SPECKLE_COUNT {
            let x = rng.gen_range(0..w);
            let y = rng.gen_range(0..h);
            frame.set_pixel(x, y, TAPE);
        }
        frame
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.source
    }

    fn capture_frame(&mut self) -> Result<Frame> {
        if self.stopped {
            return Err(anyhow!("synthetic source {} is stopped", self.config.source));
        }
        if self.config.failure_rate > 0.0 && rand::random::<f64>() < self.config.failure_rate {
            self.failures += 1;
            return Err(anyhow!("synthetic capture glitch"));
        }
        self.frame_count += 1;
        Ok(self.render())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.stopped {
            log::info!("synthetic source {} stopped", self.config.source);
        }
        self.stopped = true;
        Ok(())
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            capture_failures: self.failures,
            source: self.config.source.clone(),
        }
    }
}
