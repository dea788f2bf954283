use std::time::Duration;

use anyhow::Result;

use super::TickPlan;
use crate::detect::{FaceBox, FaceLocator};
use crate::frame::Frame;
use crate::overlay::{self, AMBER, BLUE, GREEN, RED, YELLOW};
use crate::{Mode, MotionCommand};

/// Three-tier proportional law for face centring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceTuning {
    /// Below this error the face counts as centred.
    pub dead_zone: i32,
    /// Above this error the turn saturates at `turn_speed`.
    pub far_zone: i32,
    pub approach_speed: u32,
    pub turn_speed: u32,
    pub gain: f64,
    pub approach_hold: Duration,
    pub far_hold: Duration,
    pub adjust_hold: Duration,
    pub search_settle: Duration,
}

impl Default for FaceTuning {
    fn default() -> Self {
        Self {
            dead_zone: 30,
            far_zone: 80,
            approach_speed: 30,
            turn_speed: 30,
            gain: 0.3,
            approach_hold: Duration::from_millis(200),
            far_hold: Duration::from_millis(150),
            adjust_hold: Duration::from_millis(120),
            search_settle: Duration::from_millis(100),
        }
    }
}

/// Outcome of one face-tracking decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceDecision {
    pub command: MotionCommand,
    /// Horizontal pixel error, `None` while searching.
    pub error: Option<i32>,
    pub label: &'static str,
    pub color: [u8; 3],
}

/// Map the first face (if any) to a motion order.
pub fn decide_face(face: Option<&FaceBox>, frame_width: u32, tuning: &FaceTuning) -> FaceDecision {
    let Some(face) = face else {
        return FaceDecision {
            command: MotionCommand::stop(),
            error: None,
            label: "SEARCHING...",
            color: RED,
        };
    };

    let error = face.center_x() - frame_width as i32 / 2;
    let magnitude = error.abs();
    let (command, label, color) = if magnitude < tuning.dead_zone {
        (
            MotionCommand::forward(tuning.approach_speed, tuning.approach_hold),
            "FORWARD",
            GREEN,
        )
    } else if magnitude > tuning.far_zone {
        (
            MotionCommand::turn_toward(error, tuning.turn_speed, tuning.far_hold),
            if error > 0 { "TURN RIGHT++" } else { "TURN LEFT++" },
            YELLOW,
        )
    } else {
        let speed = (magnitude as f64 * tuning.gain).floor() as u32;
        (
            MotionCommand::turn_toward(error, speed, tuning.adjust_hold),
            if error > 0 { "TURN RIGHT" } else { "TURN LEFT" },
            AMBER,
        )
    };
    FaceDecision {
        command,
        error: Some(error),
        label,
        color,
    }
}

/// Steers toward the first detected face.
///
/// Without a locator the capability is absent: every plan requests IDLE.
pub struct FaceTrackController {
    locator: Option<Box<dyn FaceLocator>>,
    tuning: FaceTuning,
}

impl FaceTrackController {
    pub fn new(locator: Option<Box<dyn FaceLocator>>) -> Self {
        Self::with_tuning(locator, FaceTuning::default())
    }

    pub fn with_tuning(locator: Option<Box<dyn FaceLocator>>, tuning: FaceTuning) -> Self {
        Self { locator, tuning }
    }

    pub fn is_available(&self) -> bool {
        self.locator.is_some()
    }

    pub fn plan(&mut self, frame: &mut Frame) -> Result<TickPlan> {
        let Some(locator) = self.locator.as_mut() else {
            return Ok(TickPlan::stop("NO FACE CAPABILITY").transition_to(Mode::Idle));
        };

        let gray = frame.to_gray();
        let faces = locator.detect_faces(&gray, frame.width(), frame.height())?;
        let face = faces.first();
        let decision = decide_face(face, frame.width(), &self.tuning);
        annotate(frame, face, &decision);
        log::debug!(
            "face: {} error={:?} -> {}",
            decision.label,
            decision.error,
            decision.command
        );

        let plan = TickPlan::new(vec![decision.command], decision.label);
        Ok(match decision.error {
            Some(_) => plan,
            None => plan.settle(self.tuning.search_settle),
        })
    }
}

fn annotate(frame: &mut Frame, face: Option<&FaceBox>, decision: &FaceDecision) {
    if let Some(face) = face {
        let (w, h) = (frame.width() as i32, frame.height() as i32);
        overlay::draw_line(frame, w / 2, 0, w / 2, h - 1, BLUE);
        overlay::draw_line(frame, 0, h / 2, w - 1, h / 2, BLUE);

        overlay::draw_rect(
            frame,
            face.x,
            face.y,
            face.x + face.w,
            face.y + face.h,
            GREEN,
        );
        overlay::fill_circle(frame, face.center_x(), face.center_y(), 5, GREEN);
    }
    overlay::draw_label(frame, 10, 22, decision.label, decision.color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubLocator;
    use crate::Direction;

    /// Face box whose centre sits `error` pixels right of a 320-wide frame centre.
    fn face_with_error(error: i32) -> FaceBox {
        FaceBox::new(160 + error - 20, 100, 40, 40)
    }

    #[test]
    fn centred_face_drives_forward() {
        let decision = decide_face(Some(&face_with_error(0)), 320, &FaceTuning::default());
        assert_eq!(
            decision.command,
            MotionCommand::forward(30, Duration::from_millis(200))
        );
        assert_eq!(decision.label, "FORWARD");
    }

    #[test]
    fn far_face_turns_at_fixed_speed() {
        let tuning = FaceTuning::default();
        let right = decide_face(Some(&face_with_error(81)), 320, &tuning);
        assert_eq!(
            right.command,
            MotionCommand::turn_right(30, Duration::from_millis(150))
        );

        let left = decide_face(Some(&face_with_error(-150)), 320, &tuning);
        assert_eq!(left.command.direction(), Direction::TurnLeft);
        assert_eq!(left.command.speed(), 30);
    }

    #[test]
    fn middle_band_is_proportional() {
        let tuning = FaceTuning::default();
        let decision = decide_face(Some(&face_with_error(50)), 320, &tuning);
        assert_eq!(
            decision.command,
            MotionCommand::turn_right(15, Duration::from_millis(120))
        );

        let edge = decide_face(Some(&face_with_error(-30)), 320, &tuning);
        assert_eq!(edge.command.direction(), Direction::TurnLeft);
        assert_eq!(edge.command.speed(), 9);

        let top = decide_face(Some(&face_with_error(80)), 320, &tuning);
        assert_eq!(top.command.speed(), 24);
    }

    #[test]
    fn no_face_stops_and_searches() {
        let decision = decide_face(None, 320, &FaceTuning::default());
        assert!(decision.command.is_stop());
        assert_eq!(decision.label, "SEARCHING...");
    }

    #[test]
    fn missing_locator_requests_idle() -> Result<()> {
        let mut controller = FaceTrackController::new(None);
        let mut frame = Frame::filled(320, 240, [0, 0, 0]);
        let plan = controller.plan(&mut frame)?;
        assert!(!controller.is_available());
        assert_eq!(plan.next_mode, Some(Mode::Idle));
        assert!(plan.last_command().is_some_and(|c| c.is_stop()));
        Ok(())
    }

    #[test]
    fn plan_annotates_the_face() -> Result<()> {
        let face = face_with_error(0);
        let mut controller =
            FaceTrackController::new(Some(Box::new(StubLocator::always(face))));
        let mut frame = Frame::filled(320, 240, [128, 128, 128]);
        let plan = controller.plan(&mut frame)?;
        assert_eq!(plan.commands[0].direction(), Direction::Forward);
        assert_eq!(plan.settle, Duration::ZERO);
        let (cx, cy) = (face.center_x() as u32, face.center_y() as u32);
        assert_eq!(frame.pixel(cx, cy), Some(GREEN));
        Ok(())
    }

    #[test]
    fn locator_errors_surface_to_the_caller() {
        let mut controller =
            FaceTrackController::new(Some(Box::new(StubLocator::never().then_error("blur"))));
        let mut frame = Frame::filled(320, 240, [0, 0, 0]);
        assert!(controller.plan(&mut frame).is_err());
    }
}
