use anyhow::Result;

use super::TickPlan;
use crate::state::SharedState;
use crate::MotionCommand;

/// Plays back the instruction queue, one instruction per tick.
#[derive(Debug, Default)]
pub struct Sequencer {
    played: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions popped since start.
    pub fn played(&self) -> u64 {
        self.played
    }

    /// Pop the next instruction and follow it with a Stop. An empty queue
    /// stops the robot; the state surface hands control back to IDLE as part
    /// of the same pop.
    pub fn plan(&mut self, state: &SharedState) -> Result<TickPlan> {
        match state.next_instruction()? {
            Some(command) => {
                self.played += 1;
                log::debug!("sequencer: playing {}", command);
                Ok(TickPlan::new(
                    vec![command, MotionCommand::stop()],
                    "SEQUENCE",
                ))
            }
            None => Ok(TickPlan::stop("SEQUENCE DONE")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mode;
    use std::time::Duration;

    #[test]
    fn plays_then_returns_to_idle() -> Result<()> {
        let state = SharedState::default();
        let first = MotionCommand::forward(50, Duration::from_millis(1500));
        state.load_instructions(vec![first])?;

        let mut sequencer = Sequencer::new();
        let plan = sequencer.plan(&state)?;
        assert_eq!(plan.commands, vec![first, MotionCommand::stop()]);
        assert_eq!(state.mode(), Mode::Sequential);

        let plan = sequencer.plan(&state)?;
        assert_eq!(plan.commands, vec![MotionCommand::stop()]);
        assert_eq!(state.mode(), Mode::Idle);
        assert_eq!(sequencer.played(), 1);
        Ok(())
    }
}
