use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;

use crate::error::{EngineError, Result};
use crate::renderer::{Rect, Texture};

/// Frame geometry laid over a texture.
#[derive(Debug)]
pub struct SpriteSheet {
    texture: Rc<Texture>,
    frames: Vec<Rect>,
}

impl SpriteSheet {
    pub fn new(texture: Rc<Texture>, frames: Vec<Rect>) -> Self {
        Self { texture, frames }
    }

    pub fn texture(&self) -> &Rc<Texture> {
        &self.texture
    }

    pub fn frames(&self) -> &[Rect] {
        &self.frames
    }

    /// Source rectangle for `frame`, bounds-checked against the frame list.
    pub fn frame(&self, frame: usize) -> Result<Rect> {
        self.frames
            .get(frame)
            .copied()
            .ok_or(EngineError::RenderBadFrame { frame, frames: self.frames.len() })
    }
}

#[derive(Debug)]
pub struct Sprite {
    pub position: Vec2,
    pub frame: usize,
    sheet: Rc<SpriteSheet>,
}

pub type SharedSprite = Rc<RefCell<Sprite>>;

impl Sprite {
    pub fn new(sheet: Rc<SpriteSheet>) -> Self {
        Self { position: Vec2::ZERO, frame: 0, sheet }
    }

    pub fn shared(sheet: Rc<SpriteSheet>) -> SharedSprite {
        Rc::new(RefCell::new(Self::new(sheet)))
    }

    pub fn sheet(&self) -> &Rc<SpriteSheet> {
        &self.sheet
    }

    /// Source and destination rectangles for the current frame. The
    /// destination sits at the rounded position and keeps the source size.
    pub fn blit_rects(&self) -> Result<(Rect, Rect)> {
        let src = self.sheet.frame(self.frame)?;
        let dst = Rect::new(
            self.position.x.round() as i32,
            self.position.y.round() as i32,
            src.width,
            src.height,
        );
        Ok((src, dst))
    }
}
