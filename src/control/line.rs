use std::time::Duration;

use anyhow::Result;

use super::TickPlan;
use crate::frame::Frame;
use crate::overlay::{self, AMBER, BLUE, GREEN, MAGENTA, ORANGE, RED, YELLOW};
use crate::vision::{LineColorProfile, LineDetection, LineExtraction, LineExtractor};
use crate::MotionCommand;

/// Steering law for line following.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineTuning {
    pub dead_zone: i32,
    pub far_zone: i32,
    pub cruise_speed: u32,
    pub junction_cruise_speed: u32,
    pub cruise_hold: Duration,
    pub far_turn_speed: u32,
    pub far_turn_hold: Duration,
    pub gain: f64,
    pub adjust_hold: Duration,
    /// Deceleration issued before steering through a junction.
    pub junction_slow_speed: u32,
    pub junction_slow_hold: Duration,
    /// Weight of the distance from the band bottom when scoring junction paths.
    pub lookahead_weight: f64,
    pub search_settle: Duration,
}

impl Default for LineTuning {
    fn default() -> Self {
        Self {
            dead_zone: 40,
            far_zone: 100,
            cruise_speed: 35,
            junction_cruise_speed: 25,
            cruise_hold: Duration::from_millis(150),
            far_turn_speed: 20,
            far_turn_hold: Duration::from_millis(80),
            gain: 0.15,
            adjust_hold: Duration::from_millis(60),
            junction_slow_speed: 15,
            junction_slow_hold: Duration::from_millis(150),
            lookahead_weight: 0.5,
            search_settle: Duration::from_millis(100),
        }
    }
}

/// Outcome of one line-following decision.
#[derive(Clone, Debug, PartialEq)]
pub struct LineDecision {
    pub commands: Vec<MotionCommand>,
    /// Blob steered on.
    pub chosen: Option<usize>,
    /// Centroid steered on, in band coordinates.
    pub target: Option<(i32, i32)>,
    pub error: Option<i32>,
    pub junction: bool,
    pub label: &'static str,
    pub color: [u8; 3],
}

impl LineDecision {
    fn no_line() -> Self {
        Self {
            commands: vec![MotionCommand::stop()],
            chosen: None,
            target: None,
            error: None,
            junction: false,
            label: "NO LINE DETECTED",
            color: RED,
        }
    }
}

/// Pick the significant blob that is most centred and nearest the robot.
/// Blobs without a centroid are skipped; the first one wins ties.
pub fn select_junction_path(detection: &LineDetection, lookahead_weight: f64) -> Option<usize> {
    let center = detection.center_x();
    let band_height = detection.band_height as i32;
    let mut best: Option<(usize, f64)> = None;
    for &index in &detection.significant {
        let Some((cx, cy)) = detection.blobs[index].centroid() else {
            continue;
        };
        let score = (cx - center).abs() as f64 + lookahead_weight * (band_height - cy) as f64;
        if best.map_or(true, |(_, best_score)| score < best_score) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}

/// Map a band detection to motion orders.
pub fn decide_line(detection: &LineDetection, tuning: &LineTuning) -> LineDecision {
    let Some(largest) = detection.largest() else {
        return LineDecision::no_line();
    };
    let Some(mut target) = detection.blobs[largest].centroid() else {
        return LineDecision::no_line();
    };

    let mut chosen = largest;
    let mut commands = Vec::with_capacity(2);
    let junction = detection.is_junction;
    if junction {
        commands.push(MotionCommand::forward(
            tuning.junction_slow_speed,
            tuning.junction_slow_hold,
        ));
        if let Some(best) = select_junction_path(detection, tuning.lookahead_weight) {
            if let Some(centroid) = detection.blobs[best].centroid() {
                chosen = best;
                target = centroid;
            }
        }
    }

    let error = target.0 - detection.center_x();
    let magnitude = error.abs();
    let (steer, label, color) = if magnitude < tuning.dead_zone {
        let speed = if junction {
            tuning.junction_cruise_speed
        } else {
            tuning.cruise_speed
        };
        (
            MotionCommand::forward(speed, tuning.cruise_hold),
            "FORWARD",
            GREEN,
        )
    } else if magnitude > tuning.far_zone {
        (
            MotionCommand::turn_toward(error, tuning.far_turn_speed, tuning.far_turn_hold),
            if error > 0 { "TURN RIGHT++" } else { "TURN LEFT++" },
            YELLOW,
        )
    } else {
        let speed = (magnitude as f64 * tuning.gain).floor() as u32;
        (
            MotionCommand::turn_toward(error, speed, tuning.adjust_hold),
            if error > 0 { "ADJUST RIGHT" } else { "ADJUST LEFT" },
            AMBER,
        )
    };
    commands.push(steer);

    LineDecision {
        commands,
        chosen: Some(chosen),
        target: Some(target),
        error: Some(error),
        junction,
        label,
        color,
    }
}

/// Follows a coloured floor line through the band nearest the robot.
#[derive(Debug, Default)]
pub struct LineFollowController {
    extractor: LineExtractor,
    tuning: LineTuning,
}

impl LineFollowController {
    pub fn new(extractor: LineExtractor, tuning: LineTuning) -> Self {
        Self { extractor, tuning }
    }

    pub fn extractor(&self) -> &LineExtractor {
        &self.extractor
    }

    pub fn plan(&mut self, frame: &mut Frame, profile: &LineColorProfile) -> Result<TickPlan> {
        let extraction = self.extractor.extract(frame, profile)?;
        let decision = decide_line(&extraction.detection, &self.tuning);
        annotate(frame, &extraction, &decision);
        log::debug!(
            "line: {} blobs={} junction={} error={:?}",
            decision.label,
            extraction.detection.blobs.len(),
            decision.junction,
            decision.error
        );

        let plan = TickPlan::new(decision.commands, decision.label);
        Ok(match decision.error {
            Some(_) => plan,
            None => plan.settle(self.tuning.search_settle),
        })
    }
}

fn annotate(frame: &mut Frame, extraction: &LineExtraction, decision: &LineDecision) {
    let top = extraction.band_top as i32;
    let detection = &extraction.detection;
    let bottom = top + detection.band_height as i32 - 1;

    for index in 0..detection.blobs.len() {
        for &(x, y) in extraction.outline(index) {
            frame.set_pixel(x, top + y, GREEN);
        }
    }
    if let (Some(chosen), true) = (decision.chosen, decision.junction) {
        for &(x, y) in extraction.outline(chosen) {
            overlay::fill_circle(frame, x, top + y, 1, MAGENTA);
        }
    }
    if let Some((cx, cy)) = decision.target {
        overlay::draw_line(frame, cx, top, cx, bottom, BLUE);
        overlay::fill_circle(frame, cx, top + cy, 5, RED);
    }

    if decision.junction {
        overlay::draw_label(frame, 10, 22, "JUNCTION", ORANGE);
        overlay::draw_label(frame, 10, 38, decision.label, decision.color);
    } else {
        overlay::draw_label(frame, 10, 22, decision.label, decision.color);
    }
}
