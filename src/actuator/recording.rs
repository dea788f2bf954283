use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::Actuator;
use crate::{Direction, MotionCommand};

/// One call observed by a [`RecordingActuator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActuatorCall {
    Motion(MotionCommand),
    Servo { channel: u8, angle: u8 },
}

#[derive(Debug, Default)]
struct Journal {
    calls: Vec<ActuatorCall>,
    failing: bool,
}

/// Actuator double that records every call and never blocks.
///
/// Clones share one journal, so a test can hand a clone to the scheduler and
/// inspect the calls afterwards.
#[derive(Clone, Debug, Default)]
pub struct RecordingActuator {
    journal: Arc<Mutex<Journal>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.journal
            .lock()
            .map(|j| j.calls.clone())
            .unwrap_or_default()
    }

    /// Motion calls only, in order.
    pub fn motions(&self) -> Vec<MotionCommand> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ActuatorCall::Motion(command) => Some(command),
                ActuatorCall::Servo { .. } => None,
            })
            .collect()
    }

    pub fn last_motion(&self) -> Option<MotionCommand> {
        self.motions().last().copied()
    }

    pub fn clear(&self) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.calls.clear();
        }
    }

    /// Make every subsequent call fail, as a disconnected driver board would.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.failing = failing;
        }
    }

    fn record(&self, call: ActuatorCall) -> Result<()> {
        let mut journal = self
            .journal
            .lock()
            .map_err(|_| anyhow!("recording journal poisoned"))?;
        if journal.failing {
            return Err(anyhow!("actuator offline"));
        }
        journal.calls.push(call);
        Ok(())
    }

    fn motion(&self, direction: Direction, speed: u8, duration: Duration) -> Result<()> {
        self.record(ActuatorCall::Motion(MotionCommand::new(
            direction,
            speed as u32,
            duration,
        )))
    }
}

impl Actuator for RecordingActuator {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn stop(&mut self) -> Result<()> {
        self.motion(Direction::Stop, 0, Duration::ZERO)
    }

    fn drive_forward(&mut self, speed: u8, duration: Duration) -> Result<()> {
        self.motion(Direction::Forward, speed, duration)
    }

    fn drive_backward(&mut self, speed: u8, duration: Duration) -> Result<()> {
        self.motion(Direction::Backward, speed, duration)
    }

    fn turn_left(&mut self, speed: u8, duration: Duration) -> Result<()> {
        self.motion(Direction::TurnLeft, speed, duration)
    }

    fn turn_right(&mut self, speed: u8, duration: Duration) -> Result<()> {
        self.motion(Direction::TurnRight, speed, duration)
    }

    fn set_servo_angle(&mut self, channel: u8, angle: u8) -> Result<()> {
        self.record(ActuatorCall::Servo { channel, angle })
    }

    fn realtime(&self) -> bool {
        false
    }

    fn apply(&mut self, command: &MotionCommand) -> Result<()> {
        self.record(ActuatorCall::Motion(*command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_journal() -> Result<()> {
        let recorder = RecordingActuator::new();
        let mut driver = recorder.clone();
        driver.set_servo_angle(9, 45)?;
        driver.drive_forward(35, Duration::from_millis(150))?;

        assert_eq!(
            recorder.calls(),
            vec![
                ActuatorCall::Servo {
                    channel: 9,
                    angle: 45
                },
                ActuatorCall::Motion(MotionCommand::forward(35, Duration::from_millis(150))),
            ]
        );
        recorder.clear();
        assert!(recorder.calls().is_empty());
        Ok(())
    }

    #[test]
    fn stop_held_for_a_duration_is_recorded_verbatim() -> Result<()> {
        let recorder = RecordingActuator::new();
        let mut driver = recorder.clone();
        let held = MotionCommand::stop_for(Duration::from_secs(2));
        driver.apply(&held)?;
        assert_eq!(recorder.last_motion(), Some(held));
        Ok(())
    }
}
