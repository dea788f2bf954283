use serde::Serialize;

/// Face bounding box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Square box of side `size` centred in a `width` x `height` frame.
    pub fn centred(width: i32, height: i32, size: i32) -> Self {
        Self::new(width / 2 - size / 2, height / 2 - size / 2, size, size)
    }

    pub fn center_x(&self) -> i32 {
        self.x + self.w / 2
    }

    pub fn center_y(&self) -> i32 {
        self.y + self.h / 2
    }
}
