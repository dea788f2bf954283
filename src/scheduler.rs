//! The control loop.
//!
//! One scheduler thread owns the frame source and runs ticks until its stop
//! flag is raised. A tick is strictly ordered:
//! 1. capture a frame (bounded retry with backoff)
//! 2. read the mode once
//! 3. plan with the mode's controller
//! 4. actuate the plan and apply any self-transition
//! 5. annotate, encode and publish the frame
//!
//! Every controller or actuator error, and any panic raised while planning or
//! actuating, is collapsed at the tick boundary into a Stop plus a log line.
//! Operator writes land in [`SharedState`] and take effect on the next tick.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::actuator::SharedActuator;
use crate::control::{FaceTrackController, LineFollowController, Sequencer, TickPlan};
use crate::detect::FaceLocator;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::overlay::{self, WHITE};
use crate::state::SharedState;
use crate::Mode;

/// Loop cadence and per-tick policies.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Pause after every tick.
    pub tick_interval: Duration,
    pub capture_backoff: Duration,
    /// Capture attempts per tick before the tick is abandoned.
    pub capture_retries: u32,
    /// Pause after each IDLE tick.
    pub idle_backoff: Duration,
    /// Pause after a tick that failed and was stopped.
    pub error_backoff: Duration,
    /// Mirror frames horizontally before processing.
    pub mirror: bool,
    pub jpeg_quality: u8,
    pub health_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(20),
            capture_backoff: Duration::from_millis(100),
            capture_retries: 5,
            idle_backoff: Duration::from_millis(100),
            error_backoff: Duration::from_millis(100),
            mirror: true,
            jpeg_quality: 80,
            health_interval: Duration::from_secs(5),
        }
    }
}

/// How a tick ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The mode's plan ran to completion.
    Proceeded { mode: Mode, label: &'static str },
    /// Planning or actuation failed; the robot was stopped.
    Stopped { mode: Mode, reason: String },
    /// No frame could be captured within the retry budget.
    CaptureFailed { attempts: u32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub capture_failures: u64,
    pub stopped_ticks: u64,
    pub frames_published: u64,
}

pub struct Scheduler {
    source: Box<dyn FrameSource>,
    actuator: SharedActuator,
    state: Arc<SharedState>,
    sequencer: Sequencer,
    face: FaceTrackController,
    line: LineFollowController,
    config: SchedulerConfig,
    stats: SchedulerStats,
    capture_streak: u32,
}

impl Scheduler {
    /// `face_locator == None` means the face-detection capability is absent:
    /// FACE_TRACK falls straight back to IDLE.
    pub fn new(
        source: Box<dyn FrameSource>,
        actuator: SharedActuator,
        state: Arc<SharedState>,
        face_locator: Option<Box<dyn FaceLocator>>,
        config: SchedulerConfig,
    ) -> Self {
        state.set_face_tracking_available(face_locator.is_some());
        Self {
            source,
            actuator,
            state,
            sequencer: Sequencer::new(),
            face: FaceTrackController::new(face_locator),
            line: LineFollowController::default(),
            config,
            stats: SchedulerStats::default(),
            capture_streak: 0,
        }
    }

    pub fn with_line_follower(mut self, line: LineFollowController) -> Self {
        self.line = line;
        self
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Run one tick. Never fails; errors and panics are folded into the outcome.
    pub fn tick(&mut self) -> TickOutcome {
        let Some(mut frame) = self.capture() else {
            return TickOutcome::CaptureFailed {
                attempts: self.config.capture_retries.max(1),
            };
        };
        if self.config.mirror {
            frame.mirror_horizontal();
        }

        let mode = self.state.mode();
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            self.plan(mode, &mut frame)
                .and_then(|plan| self.execute(mode, plan))
        }));
        let result = attempt.unwrap_or_else(|payload| {
            Err(anyhow!("panicked: {}", panic_message(&*payload)))
        });
        let outcome = match result {
            Ok(label) => TickOutcome::Proceeded { mode, label },
            Err(err) => {
                log::warn!("{} tick failed, stopping: {:#}", mode, err);
                if let Err(stop_err) = self.actuator.stop() {
                    log::error!("stop after failed tick also failed: {:#}", stop_err);
                }
                self.stats.stopped_ticks += 1;
                thread::sleep(self.config.error_backoff);
                TickOutcome::Stopped {
                    mode,
                    reason: format!("{:#}", err),
                }
            }
        };

        self.publish(frame, mode);
        self.stats.ticks += 1;
        outcome
    }

    /// Run ticks until `stop` is raised, then shut down.
    pub fn run(&mut self, stop: &AtomicBool) {
        self.state.set_autonomous(true);
        log::info!(
            "scheduler running: source={} actuator={} face_tracking={}",
            self.source.name(),
            self.actuator.name(),
            self.face.is_available()
        );

        let mut last_health_log = Instant::now();
        while !stop.load(Ordering::SeqCst) {
            match self.tick() {
                TickOutcome::Proceeded { mode, label } => {
                    log::trace!("tick {}: {} {}", self.stats.ticks, mode, label)
                }
                TickOutcome::Stopped { .. } => {}
                TickOutcome::CaptureFailed { attempts } => {
                    log::warn!("no frame after {} capture attempts", attempts)
                }
            }

            if last_health_log.elapsed() >= self.config.health_interval {
                let source = self.source.stats();
                log::info!(
                    "scheduler health: mode={} ticks={} stopped={} published={} capture_failures={} source={} healthy={}",
                    self.state.mode(),
                    self.stats.ticks,
                    self.stats.stopped_ticks,
                    self.stats.frames_published,
                    self.stats.capture_failures,
                    source.source,
                    self.source.is_healthy()
                );
                last_health_log = Instant::now();
            }

            thread::sleep(self.config.tick_interval);
        }
        self.shutdown();
    }

    /// Stop the robot and release the frame source.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.actuator.stop() {
            log::error!("shutdown stop failed: {:#}", err);
        }
        if let Err(err) = self.source.stop() {
            log::error!("frame source stop failed: {:#}", err);
        }
        self.state.set_autonomous(false);
        log::info!("scheduler stopped after {} ticks", self.stats.ticks);
    }

    /// Move the scheduler onto its own thread.
    pub fn spawn(mut self) -> Result<SchedulerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let join = thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || self.run(&stop_thread))?;
        Ok(SchedulerHandle {
            stop,
            join: Some(join),
        })
    }

    fn capture(&mut self) -> Option<Frame> {
        for _ in 0..self.config.capture_retries.max(1) {
            match self.source.capture_frame() {
                Ok(frame) => {
                    if self.capture_streak > 0 {
                        log::info!(
                            "frame capture recovered after {} failures",
                            self.capture_streak
                        );
                        self.capture_streak = 0;
                    }
                    return Some(frame);
                }
                Err(err) => {
                    self.stats.capture_failures += 1;
                    if self.capture_streak == 0 {
                        log::warn!("frame capture failed, retrying: {:#}", err);
                    }
                    self.capture_streak += 1;
                    thread::sleep(self.config.capture_backoff);
                }
            }
        }
        None
    }

    fn plan(&mut self, mode: Mode, frame: &mut Frame) -> Result<TickPlan> {
        match mode {
            Mode::Idle => Ok(TickPlan::stop("IDLE").settle(self.config.idle_backoff)),
            Mode::Sequential => self.sequencer.plan(&self.state),
            Mode::FaceTrack => {
                let plan = self.face.plan(frame)?;
                if plan.next_mode.is_some() {
                    log::warn!("face detection unavailable, leaving FACE_TRACK");
                }
                Ok(plan)
            }
            Mode::LineFollow => {
                let profile = self.state.line_color()?;
                self.line.plan(frame, &profile)
            }
            Mode::Manual => Ok(TickPlan::passive("MANUAL")),
        }
    }

    fn execute(&mut self, mode: Mode, plan: TickPlan) -> Result<&'static str> {
        for command in &plan.commands {
            self.actuator.execute(command)?;
        }
        if let Some(next) = plan.next_mode {
            self.state.transition(mode, next);
        }
        if !plan.settle.is_zero() {
            thread::sleep(plan.settle);
        }
        Ok(plan.label)
    }

    fn publish(&mut self, mut frame: Frame, mode: Mode) {
        let banner = mode.as_str();
        let x = frame.width() as i32 - overlay::label_width(banner) - 6;
        overlay::draw_label(&mut frame, x, 6, banner, WHITE);
        match frame.encode_jpeg(self.config.jpeg_quality) {
            Ok(jpeg) => {
                self.state.publish_frame(jpeg);
                self.stats.frames_published += 1;
            }
            Err(err) => log::warn!("frame encode failed: {:#}", err),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle to a running scheduler thread.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Raise the stop flag and wait for the loop to shut down. The current
    /// tick (including any actuation hold) completes first.
    pub fn stop(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("scheduler thread panicked"))?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }
}
