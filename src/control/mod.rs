//! Per-mode decision making.
//!
//! Each controller turns one frame (or one queued instruction) into a
//! [`TickPlan`]: the motion orders for this tick, an optional settle pause
//! and an optional self-transition. The scheduler executes the plan, so the
//! decision functions stay pure and testable without hardware.

mod face;
mod line;
mod sequencer;

use std::time::Duration;

use crate::{Mode, MotionCommand};

pub use face::{decide_face, FaceDecision, FaceTrackController, FaceTuning};
pub use line::{decide_line, select_junction_path, LineDecision, LineFollowController, LineTuning};
pub use sequencer::Sequencer;

/// What one tick asks of the actuator and the mode state machine.
#[derive(Clone, Debug, PartialEq)]
pub struct TickPlan {
    /// Orders to issue, in sequence. Empty only for [`TickPlan::passive`].
    pub commands: Vec<MotionCommand>,
    /// Extra pause after the orders complete.
    pub settle: Duration,
    /// Self-transition requested by the controller.
    pub next_mode: Option<Mode>,
    /// Short decision tag for logs.
    pub label: &'static str,
}

impl TickPlan {
    pub fn new(commands: Vec<MotionCommand>, label: &'static str) -> Self {
        let commands = if commands.is_empty() {
            vec![MotionCommand::stop()]
        } else {
            commands
        };
        Self {
            commands,
            settle: Duration::ZERO,
            next_mode: None,
            label,
        }
    }

    /// A single Stop.
    pub fn stop(label: &'static str) -> Self {
        Self::new(vec![MotionCommand::stop()], label)
    }

    /// Issue nothing; the operator's last order stays in force.
    pub fn passive(label: &'static str) -> Self {
        Self {
            commands: Vec::new(),
            settle: Duration::ZERO,
            next_mode: None,
            label,
        }
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn transition_to(mut self, mode: Mode) -> Self {
        self.next_mode = Some(mode);
        self
    }

    /// The order the tick ends on, if any.
    pub fn last_command(&self) -> Option<MotionCommand> {
        self.commands.last().copied()
    }
}
