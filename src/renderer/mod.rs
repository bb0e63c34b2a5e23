//! Rendering collaborators: the backend seam, the render object pool and the
//! concrete backends.

pub mod canvas;
pub mod pool;
mod texture;
#[cfg(feature = "window")]
pub mod window;

use crate::error::Result;

pub use canvas::CanvasBackend;
pub use pool::{NodeHandle, RenderNode, RenderPool};
pub use texture::Texture;

/// Opaque texture identifier issued by a [`RenderBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Largest width or height accepted for a texture or render target.
pub const MAX_DIMENSION: u32 = 8192;

/// Byte length of a packed RGBA8 image, or `None` when either side is above
/// [`MAX_DIMENSION`].
pub(crate) fn rgba8_len(width: u32, height: u32) -> Option<usize> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return None;
    }
    (width as usize).checked_mul(height as usize)?.checked_mul(PixelFormat::Rgba8.bytes_per_pixel())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of two consecutive rows.
    pub row_stride: usize,
}

impl TextureDesc {
    pub fn packed(format: PixelFormat, width: u32, height: u32) -> Self {
        Self { format, width, height, row_stride: width as usize * format.bytes_per_pixel() }
    }

    /// Minimum buffer length for this layout.
    pub fn required_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.row_stride
            .saturating_mul(self.height as usize - 1)
            .saturating_add(self.width as usize * self.format.bytes_per_pixel())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Drawing primitives the frame loop needs from a concrete backend.
///
/// `open` acquires the presentation surface and then the render target;
/// `close` releases them in reverse order and must tolerate repeated calls.
pub trait RenderBackend {
    fn open(&mut self, width: u32, height: u32) -> Result<()>;
    fn close(&mut self);
    fn create_texture(&mut self, desc: &TextureDesc, bytes: &[u8]) -> Result<TextureHandle>;
    fn clear(&mut self) -> Result<()>;
    fn blit(&mut self, texture: TextureHandle, src: Rect, dst: Rect) -> Result<()>;
    fn present(&mut self) -> Result<()>;
}
