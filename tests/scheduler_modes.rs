use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use rover_pilot::{
    CommandReply, CommandSettings, CommandSurface, Direction, FaceBox, FaceLocator, Frame,
    FrameSource, Mode, MotionCommand, RecordingActuator, ReplaySource, Scheduler,
    SchedulerConfig, SharedActuator, SharedState, StubLocator, TickOutcome,
};

const FLOOR: [u8; 3] = [200, 200, 200];
const TAPE: [u8; 3] = [10, 10, 10];

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        tick_interval: Duration::ZERO,
        capture_backoff: Duration::from_millis(1),
        idle_backoff: Duration::ZERO,
        error_backoff: Duration::ZERO,
        mirror: false,
        ..SchedulerConfig::default()
    }
}

fn source(frame: Frame) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(ReplaySource::new(vec![frame])?))
}

struct Rig {
    scheduler: Scheduler,
    surface: CommandSurface,
    recorder: RecordingActuator,
    state: Arc<SharedState>,
}

fn rig(frame: Frame, face: Option<Box<dyn FaceLocator>>) -> Result<Rig> {
    let recorder = RecordingActuator::new();
    let actuator = SharedActuator::new(recorder.clone());
    let state = SharedState::default().shared();
    let surface = CommandSurface::new(
        state.clone(),
        Some(actuator.clone()),
        CommandSettings::default(),
    );
    let scheduler = Scheduler::new(source(frame)?, actuator, state.clone(), face, fast_config());
    Ok(Rig {
        scheduler,
        surface,
        recorder,
        state,
    })
}

#[test]
fn sequence_plays_each_instruction_then_idles_once() -> Result<()> {
    let mut rig = rig(Frame::filled(320, 240, FLOOR), None)?;
    let reply = rig.surface.submit_instructions("t_up:1.5, turnLeft:0.5,bogus:1");
    assert_eq!(
        reply,
        CommandReply::Running {
            mode: Mode::Sequential,
            count: 2
        }
    );

    rig.scheduler.tick();
    rig.scheduler.tick();
    assert_eq!(rig.state.mode(), Mode::Sequential);
    let done = rig.scheduler.tick();
    assert_eq!(
        done,
        TickOutcome::Proceeded {
            mode: Mode::Sequential,
            label: "SEQUENCE DONE"
        }
    );
    assert_eq!(rig.state.mode(), Mode::Idle);

    assert_eq!(
        rig.recorder.motions(),
        vec![
            MotionCommand::forward(50, Duration::from_millis(1500)),
            MotionCommand::stop(),
            MotionCommand::turn_left(50, Duration::from_millis(500)),
            MotionCommand::stop(),
            MotionCommand::stop(),
        ]
    );

    // Further ticks stay in IDLE and keep the robot stopped.
    assert_eq!(
        rig.scheduler.tick(),
        TickOutcome::Proceeded {
            mode: Mode::Idle,
            label: "IDLE"
        }
    );
    assert!(rig.recorder.last_motion().is_some_and(|m| m.is_stop()));
    Ok(())
}

#[test]
fn resubmission_replaces_the_queue_mid_sequence() -> Result<()> {
    let mut rig = rig(Frame::filled(320, 240, FLOOR), None)?;
    rig.surface.submit_instructions("t_up:1,t_up:1,t_up:1");
    rig.scheduler.tick();
    rig.surface.submit_instructions("t_down:0.25");
    assert_eq!(rig.state.queue_len()?, 1);

    rig.recorder.clear();
    rig.scheduler.tick();
    assert_eq!(
        rig.recorder.motions(),
        vec![
            MotionCommand::backward(50, Duration::from_millis(250)),
            MotionCommand::stop()
        ]
    );
    Ok(())
}

#[test]
fn face_track_without_capability_falls_back_to_idle() -> Result<()> {
    let mut rig = rig(Frame::filled(320, 240, FLOOR), None)?;
    assert!(!rig.state.face_tracking_available());
    assert_eq!(
        rig.surface.set_mode("FACE_TRACK"),
        CommandReply::ModeSet {
            mode: Mode::FaceTrack
        }
    );

    rig.scheduler.tick();
    assert_eq!(rig.state.mode(), Mode::Idle);
    assert!(rig.recorder.last_motion().is_some_and(|m| m.is_stop()));
    Ok(())
}

#[test]
fn face_track_approaches_a_centred_face() -> Result<()> {
    let locator = StubLocator::always(FaceBox::centred(320, 240, 80));
    let mut rig = rig(Frame::filled(320, 240, FLOOR), Some(Box::new(locator)))?;
    assert!(rig.state.face_tracking_available());
    rig.surface.set_mode("FACE_TRACK");

    rig.scheduler.tick();
    assert_eq!(
        rig.recorder.last_motion(),
        Some(MotionCommand::forward(30, Duration::from_millis(200)))
    );
    assert_eq!(rig.state.mode(), Mode::FaceTrack);
    Ok(())
}

#[test]
fn face_detection_error_stops_and_recovers() -> Result<()> {
    let locator = StubLocator::never().then_error("inference failed");
    let mut rig = rig(Frame::filled(320, 240, FLOOR), Some(Box::new(locator)))?;
    rig.surface.set_mode("FACE_TRACK");

    assert!(matches!(rig.scheduler.tick(), TickOutcome::Stopped { .. }));
    assert!(rig.recorder.last_motion().is_some_and(|m| m.is_stop()));

    assert_eq!(
        rig.scheduler.tick(),
        TickOutcome::Proceeded {
            mode: Mode::FaceTrack,
            label: "SEARCHING..."
        }
    );
    Ok(())
}

#[test]
fn line_follow_adjusts_toward_an_offset_line() -> Result<()> {
    let mut frame = Frame::filled(320, 240, FLOOR);
    frame.fill_rect(250, 0, 269, 239, TAPE);
    let mut rig = rig(frame, None)?;
    rig.surface.set_mode("LINE_FOLLOW");

    let outcome = rig.scheduler.tick();
    assert_eq!(
        outcome,
        TickOutcome::Proceeded {
            mode: Mode::LineFollow,
            label: "ADJUST RIGHT"
        }
    );
    assert_eq!(
        rig.recorder.last_motion(),
        Some(MotionCommand::turn_right(14, Duration::from_millis(60)))
    );
    Ok(())
}

#[test]
fn line_follow_slows_and_picks_the_centred_branch_at_a_junction() -> Result<()> {
    let mut frame = Frame::filled(320, 240, FLOOR);
    frame.fill_rect(40, 100, 89, 239, TAPE);
    frame.fill_rect(200, 100, 249, 239, TAPE);
    let mut rig = rig(frame, None)?;
    rig.surface.set_mode("LINE_FOLLOW");

    rig.scheduler.tick();
    let motions = rig.recorder.motions();
    assert_eq!(motions.len(), 2);
    assert_eq!(
        motions[0],
        MotionCommand::forward(15, Duration::from_millis(150))
    );
    assert_eq!(motions[1].direction(), Direction::TurnRight);
    assert_eq!(motions[1].speed(), 9);
    Ok(())
}

#[test]
fn line_follow_stops_when_the_line_is_lost() -> Result<()> {
    let mut rig = rig(Frame::filled(320, 240, FLOOR), None)?;
    rig.surface.set_mode("LINE_FOLLOW");
    assert_eq!(
        rig.scheduler.tick(),
        TickOutcome::Proceeded {
            mode: Mode::LineFollow,
            label: "NO LINE DETECTED"
        }
    );
    assert_eq!(rig.recorder.last_motion(), Some(MotionCommand::stop()));
    Ok(())
}

#[test]
fn line_colour_change_applies_on_the_next_tick() -> Result<()> {
    let mut frame = Frame::filled(320, 240, FLOOR);
    frame.fill_rect(150, 0, 169, 239, [20, 40, 220]);
    let mut rig = rig(frame, None)?;
    rig.surface.set_mode("LINE_FOLLOW");

    rig.scheduler.tick();
    assert_eq!(rig.recorder.last_motion(), Some(MotionCommand::stop()));

    assert!(rig.surface.set_line_color("blue").is_success());
    rig.scheduler.tick();
    assert_eq!(
        rig.recorder.last_motion(),
        Some(MotionCommand::forward(35, Duration::from_millis(150)))
    );
    Ok(())
}

#[test]
fn manual_mode_leaves_the_operator_in_charge() -> Result<()> {
    let mut rig = rig(Frame::filled(320, 240, FLOOR), None)?;
    rig.surface.manual("left", Some(70));
    rig.recorder.clear();

    for _ in 0..3 {
        rig.scheduler.tick();
    }
    assert!(rig.recorder.calls().is_empty());
    assert_eq!(rig.state.mode(), Mode::Manual);

    rig.surface.manual("stop", None);
    rig.scheduler.tick();
    assert_eq!(rig.state.mode(), Mode::Idle);
    Ok(())
}

struct ExplodingLocator;

impl FaceLocator for ExplodingLocator {
    fn name(&self) -> &'static str {
        "exploding"
    }

    fn detect_faces(&mut self, _gray: &[u8], _w: u32, _h: u32) -> Result<Vec<FaceBox>> {
        panic!("detector blew up");
    }
}

#[test]
fn panicking_detector_stops_the_robot_but_not_the_loop() -> Result<()> {
    let Rig {
        scheduler,
        surface,
        recorder,
        state,
    } = rig(
        Frame::filled(320, 240, FLOOR),
        Some(Box::new(ExplodingLocator)),
    )?;
    surface.manual("forward", Some(60));
    assert_eq!(
        recorder.last_motion(),
        Some(MotionCommand::forward(60, Duration::ZERO))
    );
    let handle = scheduler.spawn()?;
    assert!(surface.set_mode("FACE_TRACK").is_success());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !recorder.last_motion().is_some_and(|m| m.is_stop()) {
        assert!(Instant::now() < deadline, "robot never stopped");
        std::thread::sleep(Duration::from_millis(5));
    }
    std::thread::sleep(Duration::from_millis(20));
    assert!(handle.is_running());
    assert!(state.is_autonomous());
    assert_eq!(state.mode(), Mode::FaceTrack);

    handle.stop()?;
    assert!(!state.is_autonomous());
    Ok(())
}

#[test]
fn spawned_loop_drains_a_batch_and_stops_on_shutdown() -> Result<()> {
    let Rig {
        scheduler,
        surface,
        recorder,
        state,
    } = rig(Frame::filled(320, 240, FLOOR), None)?;
    let handle = scheduler.spawn()?;

    surface.submit_instructions("t_up:0.1,t_down:0.1");
    let deadline = Instant::now() + Duration::from_secs(5);
    while state.mode() != Mode::Idle || state.queue_len()? > 0 {
        assert!(Instant::now() < deadline, "sequence never drained");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(state.is_autonomous());

    handle.stop()?;
    assert!(!state.is_autonomous());
    let motions = recorder.motions();
    assert!(motions.contains(&MotionCommand::forward(50, Duration::from_millis(100))));
    assert!(motions.contains(&MotionCommand::backward(50, Duration::from_millis(100))));
    assert_eq!(motions.last(), Some(&MotionCommand::stop()));
    Ok(())
}
