//! Motor and servo driver seam.
//!
//! The control loop treats the drive train as an opaque actuator taking
//! normalised speed, duration and angle orders. Drivers issue an order and
//! return; [`SharedActuator`] then holds the caller for the order's duration
//! outside the driver lock, so operator commands can interleave with a long
//! scripted move.

mod recording;
mod simulated;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::{Direction, MotionCommand};

pub use recording::{ActuatorCall, RecordingActuator};
pub use simulated::SimulatedActuator;

/// Hardware driver for the drive motors and the camera servos.
pub trait Actuator: Send {
    fn name(&self) -> &'static str;

    fn stop(&mut self) -> Result<()>;

    fn drive_forward(&mut self, speed: u8, duration: Duration) -> Result<()>;

    fn drive_backward(&mut self, speed: u8, duration: Duration) -> Result<()>;

    fn turn_left(&mut self, speed: u8, duration: Duration) -> Result<()>;

    fn turn_right(&mut self, speed: u8, duration: Duration) -> Result<()>;

    fn set_servo_angle(&mut self, channel: u8, angle: u8) -> Result<()>;

    /// Whether callers should be held for each order's duration. Test doubles
    /// return false so control-loop tests run at full speed.
    fn realtime(&self) -> bool {
        true
    }

    /// Issue one motion order.
    fn apply(&mut self, command: &MotionCommand) -> Result<()> {
        let speed = command.speed();
        let duration = command.duration();
        match command.direction() {
            Direction::Forward => self.drive_forward(speed, duration),
            Direction::Backward => self.drive_backward(speed, duration),
            Direction::TurnLeft => self.turn_left(speed, duration),
            Direction::TurnRight => self.turn_right(speed, duration),
            Direction::Stop => self.stop(),
        }
    }
}

/// Clonable handle to the one actuator shared by the scheduler and the
/// command surface.
#[derive(Clone)]
pub struct SharedActuator {
    inner: Arc<Mutex<Box<dyn Actuator>>>,
    name: &'static str,
    realtime: bool,
}

impl SharedActuator {
    pub fn new<A: Actuator + 'static>(actuator: A) -> Self {
        Self::from_boxed(Box::new(actuator))
    }

    pub fn from_boxed(actuator: Box<dyn Actuator>) -> Self {
        let name = actuator.name();
        let realtime = actuator.realtime();
        Self {
            inner: Arc::new(Mutex::new(actuator)),
            name,
            realtime,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Issue `command` and block for its duration.
    pub fn execute(&self, command: &MotionCommand) -> Result<()> {
        {
            let mut guard = self
                .inner
                .lock()
                .map_err(|_| anyhow!("actuator lock poisoned"))?;
            guard.apply(command)?;
        }
        log::debug!("actuator {}: {}", self.name, command);
        if self.realtime && !command.duration().is_zero() {
            thread::sleep(command.duration());
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.execute(&MotionCommand::stop())
    }

    pub fn set_servo_angle(&self, channel: u8, angle: u8) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("actuator lock poisoned"))?;
        guard.set_servo_angle(channel, angle)
    }
}

impl std::fmt::Debug for SharedActuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedActuator")
            .field("name", &self.name)
            .field("realtime", &self.realtime)
            .finish()
    }
}
