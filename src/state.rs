//! Shared state surface.
//!
//! One instance is shared (behind an `Arc`) by the scheduler thread and every
//! operator request. Each field has its own narrow accessor:
//! - mode: a single atomic byte
//! - servo angles, line colour: mutex-guarded values swapped whole
//! - instruction queue: mutex-guarded FIFO; refill and drain are indivisible
//! - latest frame: single slot, last write wins

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::frame::{EncodedFrame, LatestFrame};
use crate::vision::LineColorProfile;
use crate::{Mode, MotionCommand, ServoAdjust, ServoAngles, ServoAxis, SERVO_STEP};

/// Point-in-time view for status reporting.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub servo: ServoAngles,
    pub queue_len: usize,
    pub line_color: LineColorProfile,
    pub frame_sequence: u64,
    pub autonomous: bool,
    pub face_tracking_available: bool,
}

#[derive(Debug)]
pub struct SharedState {
    mode: AtomicU8,
    servo: Mutex<ServoAngles>,
    queue: Mutex<VecDeque<MotionCommand>>,
    frame: LatestFrame,
    line_color: Mutex<LineColorProfile>,
    autonomous: AtomicBool,
    face_available: AtomicBool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(ServoAngles::default(), LineColorProfile::default())
    }
}

impl SharedState {
    /// Fresh state in IDLE with an empty queue.
    pub fn new(servo: ServoAngles, line_color: LineColorProfile) -> Self {
        Self {
            mode: AtomicU8::new(Mode::Idle.to_u8()),
            servo: Mutex::new(servo),
            queue: Mutex::new(VecDeque::new()),
            frame: LatestFrame::new(),
            line_color: Mutex::new(line_color),
            autonomous: AtomicBool::new(false),
            face_available: AtomicBool::new(false),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    // -------------------- Mode --------------------

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Unconditionally switch modes. Returns the previous mode.
    pub fn set_mode(&self, mode: Mode) -> Mode {
        let previous = Mode::from_u8(self.mode.swap(mode.to_u8(), Ordering::SeqCst));
        if previous != mode {
            log::info!("mode {} -> {}", previous, mode);
        }
        previous
    }

    /// Switch to `to` only if the mode is still `from`.
    pub fn transition(&self, from: Mode, to: Mode) -> bool {
        let switched = self
            .mode
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if switched && from != to {
            log::info!("mode {} -> {}", from, to);
        }
        switched
    }

    // -------------------- Servo angles --------------------

    pub fn servo_angles(&self) -> Result<ServoAngles> {
        Ok(*lock(&self.servo, "servo")?)
    }

    /// Step one axis by [`SERVO_STEP`], clamped. Returns the new angles.
    pub fn adjust_servo(&self, axis: ServoAxis, adjust: ServoAdjust) -> Result<ServoAngles> {
        let mut guard = lock(&self.servo, "servo")?;
        *guard = guard.adjusted(axis, adjust, SERVO_STEP);
        Ok(*guard)
    }

    // -------------------- Instruction queue --------------------

    /// Replace the queue with `commands`, as one step with respect to the
    /// sequencer. SEQUENTIAL is entered only for a non-empty batch; an empty
    /// one still discards whatever was queued.
    pub fn load_instructions(&self, commands: Vec<MotionCommand>) -> Result<usize> {
        let mut queue = lock(&self.queue, "instruction queue")?;
        queue.clear();
        queue.extend(commands);
        if !queue.is_empty() {
            self.set_mode(Mode::Sequential);
        }
        Ok(queue.len())
    }

    /// Enter SEQUENTIAL if instructions are waiting. Returns whether it did.
    pub fn resume_instructions(&self) -> Result<bool> {
        let queue = lock(&self.queue, "instruction queue")?;
        if queue.is_empty() {
            return Ok(false);
        }
        self.set_mode(Mode::Sequential);
        Ok(true)
    }

    /// Pop the next instruction. When the queue is exhausted the mode falls
    /// back from SEQUENTIAL to IDLE under the same lock, so a concurrent
    /// refill can never be stranded in IDLE.
    pub fn next_instruction(&self) -> Result<Option<MotionCommand>> {
        let mut queue = lock(&self.queue, "instruction queue")?;
        let next = queue.pop_front();
        if next.is_none() && self.transition(Mode::Sequential, Mode::Idle) {
            log::info!("instruction queue drained");
        }
        Ok(next)
    }

    pub fn queue_len(&self) -> Result<usize> {
        Ok(lock(&self.queue, "instruction queue")?.len())
    }

    // -------------------- Latest frame --------------------

    pub fn publish_frame(&self, jpeg: Vec<u8>) -> u64 {
        self.frame.publish(jpeg)
    }

    pub fn latest_frame(&self) -> Option<Arc<EncodedFrame>> {
        self.frame.latest()
    }

    pub fn latest_frame_after(&self, seen: u64) -> Option<Arc<EncodedFrame>> {
        self.frame.latest_after(seen)
    }

    // -------------------- Line colour --------------------

    pub fn line_color(&self) -> Result<LineColorProfile> {
        Ok(lock(&self.line_color, "line colour")?.clone())
    }

    pub fn set_line_color(&self, profile: LineColorProfile) -> Result<()> {
        let mut guard = lock(&self.line_color, "line colour")?;
        log::info!("line colour {} -> {}", guard.name, profile.name);
        *guard = profile;
        Ok(())
    }

    // -------------------- Capabilities --------------------

    /// Whether the scheduler is running on initialised hardware.
    pub fn is_autonomous(&self) -> bool {
        self.autonomous.load(Ordering::SeqCst)
    }

    pub fn set_autonomous(&self, running: bool) {
        self.autonomous.store(running, Ordering::SeqCst);
    }

    pub fn face_tracking_available(&self) -> bool {
        self.face_available.load(Ordering::SeqCst)
    }

    pub fn set_face_tracking_available(&self, available: bool) {
        self.face_available.store(available, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Result<StatusSnapshot> {
        Ok(StatusSnapshot {
            mode: self.mode(),
            servo: self.servo_angles()?,
            queue_len: self.queue_len()?,
            line_color: self.line_color()?,
            frame_sequence: self.frame.sequence(),
            autonomous: self.is_autonomous(),
            face_tracking_available: self.face_tracking_available(),
        })
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| anyhow!("{} lock poisoned", what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn batch(n: usize) -> Vec<MotionCommand> {
        (0..n)
            .map(|i| MotionCommand::forward(50, Duration::from_millis(i as u64)))
            .collect()
    }

    #[test]
    fn starts_idle() -> Result<()> {
        let state = SharedState::default();
        let snapshot = state.snapshot()?;
        assert_eq!(snapshot.mode, Mode::Idle);
        assert_eq!(snapshot.queue_len, 0);
        assert_eq!(snapshot.servo, ServoAngles::new(70, 0));
        assert_eq!(snapshot.frame_sequence, 0);
        Ok(())
    }

    #[test]
    fn transition_only_applies_from_expected_mode() {
        let state = SharedState::default();
        state.set_mode(Mode::LineFollow);
        assert!(!state.transition(Mode::Sequential, Mode::Idle));
        assert_eq!(state.mode(), Mode::LineFollow);
        assert!(state.transition(Mode::LineFollow, Mode::Idle));
        assert_eq!(state.mode(), Mode::Idle);
    }

    #[test]
    fn load_replaces_previous_contents() -> Result<()> {
        let state = SharedState::default();
        assert_eq!(state.load_instructions(batch(5))?, 5);
        state.next_instruction()?;
        assert_eq!(state.load_instructions(batch(2))?, 2);
        assert_eq!(state.queue_len()?, 2);
        assert_eq!(state.mode(), Mode::Sequential);
        Ok(())
    }

    #[test]
    fn empty_load_clears_but_keeps_mode() -> Result<()> {
        let state = SharedState::default();
        state.load_instructions(batch(3))?;
        state.set_mode(Mode::Manual);
        assert_eq!(state.load_instructions(Vec::new())?, 0);
        assert_eq!(state.queue_len()?, 0);
        assert_eq!(state.mode(), Mode::Manual);
        assert!(!state.resume_instructions()?);
        Ok(())
    }

    #[test]
    fn drain_returns_to_idle_once() -> Result<()> {
        let state = SharedState::default();
        state.load_instructions(batch(2))?;
        assert!(state.next_instruction()?.is_some());
        assert!(state.next_instruction()?.is_some());
        assert_eq!(state.mode(), Mode::Sequential);
        assert!(state.next_instruction()?.is_none());
        assert_eq!(state.mode(), Mode::Idle);

        state.set_mode(Mode::FaceTrack);
        assert!(state.next_instruction()?.is_none());
        assert_eq!(state.mode(), Mode::FaceTrack);
        Ok(())
    }

    #[test]
    fn resume_requires_waiting_instructions() -> Result<()> {
        let state = SharedState::default();
        assert!(!state.resume_instructions()?);
        assert_eq!(state.mode(), Mode::Idle);
        state.load_instructions(batch(1))?;
        state.set_mode(Mode::Idle);
        assert!(state.resume_instructions()?);
        assert_eq!(state.mode(), Mode::Sequential);
        Ok(())
    }

    #[test]
    fn concurrent_refills_never_interleave_with_drains() -> Result<()> {
        let state = Arc::new(SharedState::default());
        let writer = {
            let state = Arc::clone(&state);
            thread::spawn(move || -> Result<()> {
                for _ in 0..200 {
                    state.load_instructions(batch(4))?;
                }
                Ok(())
            })
        };
        let mut popped = 0;
        for _ in 0..400 {
            if state.next_instruction()?.is_some() {
                popped += 1;
            }
            let len = state.queue_len()?;
            assert!(len <= 4, "queue grew to {}", len);
        }
        writer
            .join()
            .map_err(|_| anyhow!("writer panicked"))??;
        assert!(state.queue_len()? <= 4);
        log::debug!("popped {} instructions during refills", popped);
        Ok(())
    }

    #[test]
    fn servo_adjustments_clamp() -> Result<()> {
        let state = SharedState::default();
        for _ in 0..40 {
            state.adjust_servo(ServoAxis::Pan, ServoAdjust::Increment)?;
            state.adjust_servo(ServoAxis::Tilt, ServoAdjust::Decrement)?;
        }
        assert_eq!(state.servo_angles()?, ServoAngles::new(180, 0));
        Ok(())
    }

    #[test]
    fn frames_are_single_slot() {
        let state = SharedState::default();
        assert!(state.latest_frame().is_none());
        let first = state.publish_frame(vec![1]);
        let second = state.publish_frame(vec![2]);
        assert!(second > first);
        assert_eq!(state.latest_frame().map(|f| f.jpeg.clone()), Some(vec![2]));
        assert!(state.latest_frame_after(second).is_none());
    }
}
