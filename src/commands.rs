//! Operator command layer.
//!
//! Every handler validates at the boundary and answers with a structured
//! [`CommandReply`]. Malformed input never reaches the shared state; a
//! failed request leaves mode, queue, angles and colour untouched.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::actuator::SharedActuator;
use crate::state::{SharedState, StatusSnapshot};
use crate::vision::LineColorProfile;
use crate::{Mode, MotionCommand, ServoAdjust, ServoAxis, MAX_SPEED};

/// Fixed parameters of the command layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSettings {
    /// Speed at which queued instructions replay.
    pub sequence_speed: u32,
    /// Manual speed when the request names none.
    pub manual_speed: u32,
    pub pan_channel: u8,
    pub tilt_channel: u8,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            sequence_speed: 50,
            manual_speed: 50,
            pan_channel: 10,
            tilt_channel: 9,
        }
    }
}

/// Structured result of an operator command.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandReply {
    ModeSet {
        mode: Mode,
    },
    #[serde(rename = "ok")]
    Manual {
        command: String,
        mode: Mode,
    },
    #[serde(rename = "ok")]
    Servo {
        pan: u8,
        tilt: u8,
    },
    Running {
        mode: Mode,
        count: usize,
    },
    ColorSet {
        color: String,
        lower: [u8; 3],
        upper: [u8; 3],
    },
    Failed {
        message: String,
    },
}

impl CommandReply {
    pub fn failed(message: impl Into<String>) -> Self {
        CommandReply::Failed {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, CommandReply::Failed { .. })
    }
}

/// Parse a `command:seconds` list. Malformed or unknown pairs are dropped.
///
/// Vocabulary: `t_up`, `t_down`, `turnLeft`, `turnRight`, `t_stop`.
pub fn parse_instruction_batch(input: &str, speed: u32) -> Vec<MotionCommand> {
    input
        .split(',')
        .filter_map(|pair| parse_instruction(pair, speed))
        .collect()
}

fn parse_instruction(pair: &str, speed: u32) -> Option<MotionCommand> {
    let mut parts = pair.split(':');
    let (name, seconds) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let seconds: f64 = seconds.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let duration = Duration::try_from_secs_f64(seconds).ok()?;
    match name.trim() {
        "t_up" => Some(MotionCommand::forward(speed, duration)),
        "t_down" => Some(MotionCommand::backward(speed, duration)),
        "turnLeft" => Some(MotionCommand::turn_left(speed, duration)),
        "turnRight" => Some(MotionCommand::turn_right(speed, duration)),
        "t_stop" => Some(MotionCommand::stop_for(duration)),
        _ => None,
    }
}

/// Entry point for operator requests. Cheap to clone; one per request thread.
#[derive(Clone, Debug)]
pub struct CommandSurface {
    state: Arc<SharedState>,
    actuator: Option<SharedActuator>,
    settings: CommandSettings,
}

impl CommandSurface {
    /// `actuator` is `None` when hardware failed to initialise; commands then
    /// update state but actuate nothing.
    pub fn new(
        state: Arc<SharedState>,
        actuator: Option<SharedActuator>,
        settings: CommandSettings,
    ) -> Self {
        Self {
            state,
            actuator,
            settings,
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Switch to IDLE (alias STOP), FACE_TRACK, LINE_FOLLOW or SEQUENTIAL.
    /// SEQUENTIAL is accepted only while instructions are queued.
    pub fn set_mode(&self, name: &str) -> CommandReply {
        let mode = match Mode::parse(name) {
            Some(Mode::Manual) => {
                return CommandReply::failed("MANUAL is entered through manual control.")
            }
            Some(mode) => mode,
            None => return CommandReply::failed("Invalid mode specified."),
        };

        match mode {
            Mode::Idle => {
                self.state.set_mode(Mode::Idle);
                if let Err(err) = self.actuate(&MotionCommand::stop()) {
                    return CommandReply::failed(format!("stop failed: {:#}", err));
                }
            }
            Mode::Sequential => match self.state.resume_instructions() {
                Ok(true) => {}
                Ok(false) => return CommandReply::failed("No instructions queued."),
                Err(err) => return CommandReply::failed(format!("{:#}", err)),
            },
            other => {
                self.state.set_mode(other);
            }
        }
        CommandReply::ModeSet { mode }
    }

    /// Drive immediately and take manual control. `stop` halts and returns to IDLE.
    pub fn manual(&self, command: &str, speed: Option<i64>) -> CommandReply {
        let speed = speed
            .unwrap_or(self.settings.manual_speed as i64)
            .clamp(0, MAX_SPEED as i64) as u32;
        let (motion, mode) = match command.trim() {
            "forward" => (MotionCommand::forward(speed, Duration::ZERO), Mode::Manual),
            "backward" => (MotionCommand::backward(speed, Duration::ZERO), Mode::Manual),
            "left" => (MotionCommand::turn_left(speed, Duration::ZERO), Mode::Manual),
            "right" => (MotionCommand::turn_right(speed, Duration::ZERO), Mode::Manual),
            "stop" => (MotionCommand::stop(), Mode::Idle),
            other => return CommandReply::failed(format!("Unknown manual command '{}'.", other)),
        };

        self.state.set_mode(mode);
        if let Err(err) = self.actuate(&motion) {
            log::warn!("manual {} failed: {:#}", command, err);
            return CommandReply::failed(format!("actuation failed: {:#}", err));
        }
        CommandReply::Manual {
            command: command.trim().to_string(),
            mode,
        }
    }

    /// Replace the instruction queue and start playback. A batch with no
    /// valid pairs still empties the queue.
    pub fn submit_instructions(&self, input: &str) -> CommandReply {
        let commands = parse_instruction_batch(input, self.settings.sequence_speed);
        let submitted = input.split(',').count();
        let dropped = submitted - commands.len();
        match self.state.load_instructions(commands) {
            Ok(0) => {
                log::info!("instruction batch rejected: no valid pairs in {} submitted", submitted);
                CommandReply::failed("No valid instructions parsed.")
            }
            Ok(count) => {
                log::info!("instruction batch loaded: {} queued, {} dropped", count, dropped);
                CommandReply::Running {
                    mode: Mode::Sequential,
                    count,
                }
            }
            Err(err) => CommandReply::failed(format!("{:#}", err)),
        }
    }

    /// Step the pan or tilt servo by one increment.
    pub fn adjust_servo(&self, servo: &str, action: &str) -> CommandReply {
        let Some(axis) = ServoAxis::parse(servo) else {
            return CommandReply::failed(format!("Unknown servo '{}'.", servo));
        };
        let Some(adjust) = ServoAdjust::parse(action) else {
            return CommandReply::failed(format!("Unknown servo action '{}'.", action));
        };

        let result = match &self.actuator {
            Some(actuator) => self.state.adjust_servo(axis, adjust).and_then(|angles| {
                actuator.set_servo_angle(self.channel(axis), angles.get(axis))?;
                Ok(angles)
            }),
            None => self.state.servo_angles(),
        };
        match result {
            Ok(angles) => CommandReply::Servo {
                pan: angles.pan,
                tilt: angles.tilt,
            },
            Err(err) => CommandReply::failed(format!("{:#}", err)),
        }
    }

    /// Swap the active line colour to a named preset.
    pub fn set_line_color(&self, name: &str) -> CommandReply {
        let Some(profile) = LineColorProfile::preset(name) else {
            return CommandReply::failed("Invalid color specified.");
        };
        let reply = CommandReply::ColorSet {
            color: profile.name.clone(),
            lower: profile.range.lower,
            upper: profile.range.upper,
        };
        match self.state.set_line_color(profile) {
            Ok(()) => reply,
            Err(err) => CommandReply::failed(format!("{:#}", err)),
        }
    }

    pub fn status(&self) -> Result<StatusSnapshot> {
        self.state.snapshot()
    }

    /// Servo channel driving `axis`.
    pub fn channel(&self, axis: ServoAxis) -> u8 {
        match axis {
            ServoAxis::Pan => self.settings.pan_channel,
            ServoAxis::Tilt => self.settings.tilt_channel,
        }
    }

    fn actuate(&self, command: &MotionCommand) -> Result<()> {
        match &self.actuator {
            Some(actuator) => actuator.execute(command),
            None => Ok(()),
        }
    }
}
