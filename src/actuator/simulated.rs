use std::time::Duration;

use anyhow::Result;

use super::Actuator;

/// Software stand-in for the motor/servo board. Logs every order.
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    orders: u64,
    servo: [Option<u8>; 16],
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> u64 {
        self.orders
    }

    pub fn servo_angle(&self, channel: u8) -> Option<u8> {
        self.servo.get(channel as usize).copied().flatten()
    }

    fn drive(&mut self, what: &str, speed: u8, duration: Duration) -> Result<()> {
        self.orders += 1;
        log::debug!(
            "sim-actuator: {} speed={} for {:.2}s",
            what,
            speed,
            duration.as_secs_f64()
        );
        Ok(())
    }
}

impl Actuator for SimulatedActuator {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn stop(&mut self) -> Result<()> {
        self.drive("stop", 0, Duration::ZERO)
    }

    fn drive_forward(&mut self, speed: u8, duration: Duration) -> Result<()> {
        self.drive("forward", speed, duration)
    }

    fn drive_backward(&mut self, speed: u8, duration: Duration) -> Result<()> {
        self.drive("backward", speed, duration)
    }

    fn turn_left(&mut self, speed: u8, duration: Duration) -> Result<()> {
        self.drive("turn_left", speed, duration)
    }

    fn turn_right(&mut self, speed: u8, duration: Duration) -> Result<()> {
        self.drive("turn_right", speed, duration)
    }

    fn set_servo_angle(&mut self, channel: u8, angle: u8) -> Result<()> {
        if let Some(slot) = self.servo.get_mut(channel as usize) {
            *slot = Some(angle);
        }
        log::debug!("sim-actuator: servo {} -> {} deg", channel, angle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SharedActuator;
    use crate::MotionCommand;

    #[test]
    fn counts_orders_and_remembers_servo_angles() -> Result<()> {
        let mut sim = SimulatedActuator::new();
        sim.apply(&MotionCommand::forward(40, Duration::ZERO))?;
        sim.apply(&MotionCommand::stop())?;
        sim.set_servo_angle(10, 75)?;
        sim.set_servo_angle(200, 5)?;
        assert_eq!(sim.orders(), 2);
        assert_eq!(sim.servo_angle(10), Some(75));
        assert_eq!(sim.servo_angle(9), None);
        assert_eq!(sim.servo_angle(200), None);
        Ok(())
    }

    #[test]
    fn shared_simulator_is_realtime() {
        let shared = SharedActuator::new(SimulatedActuator::new());
        assert_eq!(shared.name(), "simulated");
        assert!(format!("{:?}", shared).contains("realtime: true"));
    }
}
