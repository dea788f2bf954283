//! Rover Pilot
//!
//! This crate implements the autonomous control loop for a camera-equipped
//! wheeled robot with a pan/tilt camera head.
//!
//! # Architecture
//!
//! One long-lived scheduler thread owns the camera and drives the robot
//! through exactly one of five modes per tick:
//!
//! 1. **Idle**: command Stop, no vision work (rest state).
//! 2. **Sequential**: replay one queued instruction per tick.
//! 3. **Face track**: steer toward the first detected face.
//! 4. **Line follow**: steer along a coloured floor line, disambiguating junctions.
//! 5. **Manual**: hold still; actuation comes from the operator.
//!
//! Operator commands arrive concurrently and only touch the shared state
//! surface (mode, instruction queue, servo angles, line colour profile). The
//! scheduler publishes one annotated JPEG per tick for streaming.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames, JPEG encoding, single-slot latest frame
//! - `ingest`: Frame sources (synthetic, JPEG replay, V4L2)
//! - `actuator`: Motor/servo driver seam
//! - `detect`: Face locator backends
//! - `vision`: Line extraction (HSV masks, morphology, blobs)
//! - `control`: Face tracking, line following, sequencer
//! - `state`: Shared state surface
//! - `commands`: Operator command layer
//! - `scheduler`: The control loop
//! - `api`: HTTP adapter and MJPEG stream

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod actuator;
pub mod api;
pub mod commands;
pub mod config;
pub mod control;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod scheduler;
pub mod state;
pub mod vision;

pub use actuator::{Actuator, ActuatorCall, RecordingActuator, SharedActuator, SimulatedActuator};
pub use commands::{parse_instruction_batch, CommandReply, CommandSettings, CommandSurface};
pub use control::{FaceTrackController, LineFollowController, Sequencer, TickPlan};
pub use detect::{FaceBox, FaceLocator, StubLocator};
pub use frame::{EncodedFrame, Frame, LatestFrame};
pub use ingest::{CameraConfig, FrameSource, ReplaySource, SyntheticSource};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, TickOutcome};
pub use state::{SharedState, StatusSnapshot};
pub use vision::{Blob, LineColorProfile, LineDetection, LineExtractor, Moments};

// -------------------- Modes --------------------

/// Active control strategy. Exactly one is active at any instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Idle,
    Sequential,
    FaceTrack,
    LineFollow,
    Manual,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Idle,
        Mode::Sequential,
        Mode::FaceTrack,
        Mode::LineFollow,
        Mode::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Idle => "IDLE",
            Mode::Sequential => "SEQUENTIAL",
            Mode::FaceTrack => "FACE_TRACK",
            Mode::LineFollow => "LINE_FOLLOW",
            Mode::Manual => "MANUAL",
        }
    }

    /// Parse an operator-facing mode name. `STOP` is accepted as an alias for `IDLE`.
    pub fn parse(name: &str) -> Option<Mode> {
        match name.trim().to_ascii_uppercase().as_str() {
            "IDLE" | "STOP" => Some(Mode::Idle),
            "SEQUENTIAL" => Some(Mode::Sequential),
            "FACE_TRACK" => Some(Mode::FaceTrack),
            "LINE_FOLLOW" => Some(Mode::LineFollow),
            "MANUAL" => Some(Mode::Manual),
            _ => None,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Mode::Idle => 0,
            Mode::Sequential => 1,
            Mode::FaceTrack => 2,
            Mode::LineFollow => 3,
            Mode::Manual => 4,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Mode {
        match raw {
            1 => Mode::Sequential,
            2 => Mode::FaceTrack,
            3 => Mode::LineFollow,
            4 => Mode::Manual,
            _ => Mode::Idle,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------------------- Motion Commands --------------------

/// Highest normalized speed accepted by the actuator.
pub const MAX_SPEED: u8 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::TurnLeft => "turn_left",
            Direction::TurnRight => "turn_right",
            Direction::Stop => "stop",
        }
    }
}

/// A single motion order for the actuator.
///
/// `duration == 0` means "hold until superseded". Speed is clamped to
/// `0..=MAX_SPEED` at construction and is always 0 for `Stop`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionCommand {
    direction: Direction,
    speed: u8,
    duration: Duration,
}

impl MotionCommand {
    pub fn new(direction: Direction, speed: u32, duration: Duration) -> Self {
        let speed = match direction {
            Direction::Stop => 0,
            _ => speed.min(MAX_SPEED as u32) as u8,
        };
        Self {
            direction,
            speed,
            duration,
        }
    }

    pub fn stop() -> Self {
        Self::new(Direction::Stop, 0, Duration::ZERO)
    }

    /// Stop and hold the stop for `duration`.
    pub fn stop_for(duration: Duration) -> Self {
        Self::new(Direction::Stop, 0, duration)
    }

    pub fn forward(speed: u32, duration: Duration) -> Self {
        Self::new(Direction::Forward, speed, duration)
    }

    pub fn backward(speed: u32, duration: Duration) -> Self {
        Self::new(Direction::Backward, speed, duration)
    }

    pub fn turn_left(speed: u32, duration: Duration) -> Self {
        Self::new(Direction::TurnLeft, speed, duration)
    }

    pub fn turn_right(speed: u32, duration: Duration) -> Self {
        Self::new(Direction::TurnRight, speed, duration)
    }

    /// Turn toward the side indicated by the sign of a horizontal error
    /// (positive error means the target sits right of centre).
    pub fn turn_toward(error: i32, speed: u32, duration: Duration) -> Self {
        if error > 0 {
            Self::turn_right(speed, duration)
        } else {
            Self::turn_left(speed, duration)
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_stop(&self) -> bool {
        self.direction == Direction::Stop
    }
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) for {:.2}s",
            self.direction.as_str(),
            self.speed,
            self.duration.as_secs_f64()
        )
    }
}

// -------------------- Servo Angles --------------------

pub const PAN_MAX: u8 = 180;
pub const TILT_MAX: u8 = 90;
pub const SERVO_STEP: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServoAxis {
    Pan,
    Tilt,
}

impl ServoAxis {
    pub fn parse(name: &str) -> Option<ServoAxis> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pan" => Some(ServoAxis::Pan),
            "tilt" => Some(ServoAxis::Tilt),
            _ => None,
        }
    }

    pub fn max_angle(self) -> u8 {
        match self {
            ServoAxis::Pan => PAN_MAX,
            ServoAxis::Tilt => TILT_MAX,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServoAdjust {
    Increment,
    Decrement,
}

impl ServoAdjust {
    pub fn parse(name: &str) -> Option<ServoAdjust> {
        match name.trim().to_ascii_lowercase().as_str() {
            "increment" => Some(ServoAdjust::Increment),
            "decrement" => Some(ServoAdjust::Decrement),
            _ => None,
        }
    }
}

/// Camera head angles in degrees. Pan is in `[0, 180]`, tilt in `[0, 90]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoAngles {
    pub pan: u8,
    pub tilt: u8,
}

impl ServoAngles {
    pub fn new(pan: u8, tilt: u8) -> Self {
        Self {
            pan: pan.min(PAN_MAX),
            tilt: tilt.min(TILT_MAX),
        }
    }

    pub fn get(&self, axis: ServoAxis) -> u8 {
        match axis {
            ServoAxis::Pan => self.pan,
            ServoAxis::Tilt => self.tilt,
        }
    }

    /// Apply one step on one axis, clamped to the axis range.
    pub fn adjusted(self, axis: ServoAxis, adjust: ServoAdjust, step: u8) -> Self {
        let current = self.get(axis);
        let next = match adjust {
            ServoAdjust::Increment => current.saturating_add(step).min(axis.max_angle()),
            ServoAdjust::Decrement => current.saturating_sub(step),
        };
        match axis {
            ServoAxis::Pan => Self { pan: next, ..self },
            ServoAxis::Tilt => Self { tilt: next, ..self },
        }
    }
}

impl Default for ServoAngles {
    fn default() -> Self {
        Self::new(70, 0)
    }
}
