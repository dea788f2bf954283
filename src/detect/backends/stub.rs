use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::FaceLocator;
use crate::detect::result::FaceBox;

/// Scripted locator for tests and demos.
///
/// Replays queued answers one per call, then keeps returning the fallback.
#[derive(Debug, Default)]
pub struct StubLocator {
    script: VecDeque<Result<Vec<FaceBox>, String>>,
    fallback: Vec<FaceBox>,
    calls: u64,
}

impl StubLocator {
    /// Never finds a face.
    pub fn never() -> Self {
        Self::default()
    }

    /// Always finds the same face.
    pub fn always(face: FaceBox) -> Self {
        Self {
            fallback: vec![face],
            ..Self::default()
        }
    }

    /// Queue the answer for the next call.
    pub fn then_faces(mut self, faces: Vec<FaceBox>) -> Self {
        self.script.push_back(Ok(faces));
        self
    }

    /// Queue a detection failure for the next call.
    pub fn then_error(mut self, message: &str) -> Self {
        self.script.push_back(Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl FaceLocator for StubLocator {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect_faces(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>> {
        if gray.len() != width as usize * height as usize {
            return Err(anyhow!(
                "expected {} gray bytes, received {}",
                width as usize * height as usize,
                gray.len()
            ));
        }
        self.calls += 1;
        match self.script.pop_front() {
            Some(Ok(faces)) => Ok(faces),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_runs_before_fallback() -> Result<()> {
        let face = FaceBox::new(10, 10, 20, 20);
        let mut locator = StubLocator::always(face)
            .then_faces(Vec::new())
            .then_error("lens cap");
        let gray = [0u8; 4];
        assert!(locator.detect_faces(&gray, 2, 2)?.is_empty());
        assert!(locator.detect_faces(&gray, 2, 2).is_err());
        assert_eq!(locator.detect_faces(&gray, 2, 2)?, vec![face]);
        assert_eq!(locator.calls(), 3);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let mut locator = StubLocator::never();
        assert!(locator.detect_faces(&[0u8; 3], 2, 2).is_err());
    }
}
