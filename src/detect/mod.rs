//! Face locators.
//!
//! The face tracker only needs bounding boxes. Where they come from is a
//! backend concern: a scripted stub for tests and demos, or an ONNX model
//! (feature: backend-tract). When no locator can be built the face-detection
//! capability is simply absent and FACE_TRACK falls back to IDLE.

mod backend;
mod backends;
mod result;

use std::path::Path;

use anyhow::{anyhow, Result};

pub use backend::FaceLocator;
pub use backends::StubLocator;
#[cfg(feature = "backend-tract")]
pub use backends::TractLocator;
pub use result::FaceBox;

/// Build the locator named by `model_path`.
///
/// - `None`: no face capability (`Ok(None)`)
/// - `stub://centre`: a face held at the frame centre
/// - `stub://none`: a locator that never finds a face
/// - `*.onnx`: UltraFace-style ONNX model (feature: backend-tract)
pub fn load_face_locator(
    model_path: Option<&str>,
    width: u32,
    height: u32,
) -> Result<Option<Box<dyn FaceLocator>>> {
    let Some(model_path) = model_path else {
        return Ok(None);
    };
    let mut locator: Box<dyn FaceLocator> = match model_path {
        "stub://centre" | "stub://center" => Box::new(StubLocator::always(FaceBox::centred(
            width as i32,
            height as i32,
            width as i32 / 4,
        ))),
        "stub://none" => Box::new(StubLocator::never()),
        path if path.starts_with("stub://") => {
            return Err(anyhow!("unknown stub face locator '{}'", path));
        }
        path => load_model(Path::new(path))?,
    };
    locator.warm_up()?;
    log::info!("face locator {} ready", locator.name());
    Ok(Some(locator))
}

#[cfg(feature = "backend-tract")]
fn load_model(path: &Path) -> Result<Box<dyn FaceLocator>> {
    Ok(Box::new(TractLocator::new(path)?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_model(path: &Path) -> Result<Box<dyn FaceLocator>> {
    Err(anyhow!(
        "face model {} requires the backend-tract feature",
        path.display()
    ))
}
