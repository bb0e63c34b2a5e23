//! CPU render target. Used directly for headless runs and as the compositor
//! behind the windowed backend.

use super::{rgba8_len, PixelFormat, Rect, RenderBackend, TextureDesc, TextureHandle, MAX_DIMENSION};
use crate::error::{EngineError, Result};

#[derive(Debug)]
struct CanvasTexture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

#[derive(Debug)]
pub struct CanvasBackend {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    clear_color: [u8; 4],
    textures: Vec<CanvasTexture>,
    frames_presented: u64,
    open: bool,
}

impl CanvasBackend {
    pub fn new(clear_color: [u8; 4]) -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            clear_color,
            textures: Vec::new(),
            frames_presented: 0,
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Render target contents, tightly packed RGBA8.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(EngineError::BackendFailure("canvas is not open".to_string()))
        }
    }
}

impl RenderBackend for CanvasBackend {
    fn open(&mut self, width: u32, height: u32) -> Result<()> {
        let len = match rgba8_len(width, height) {
            Some(len) if len > 0 => len,
            _ => return Err(EngineError::InitFailure(format!("invalid render target size {width}x{height}"))),
        };
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|_| EngineError::NoMemory)?;
        for _ in 0..len / 4 {
            pixels.extend_from_slice(&self.clear_color);
        }
        self.width = width;
        self.height = height;
        self.pixels = pixels;
        self.open = true;
        log::debug!(target: "ember::render", "canvas opened at {width}x{height}");
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.textures.clear();
        self.pixels = Vec::new();
        self.open = false;
        log::debug!(target: "ember::render", "canvas closed after {} frames", self.frames_presented);
    }

    fn create_texture(&mut self, desc: &TextureDesc, bytes: &[u8]) -> Result<TextureHandle> {
        self.ensure_open()?;
        debug_assert_eq!(desc.format, PixelFormat::Rgba8);
        if bytes.len() < desc.required_len() {
            return Err(EngineError::BackendFailure("texture data shorter than its layout".to_string()));
        }
        let row_bytes = desc.width as usize * 4;
        let mut pixels = Vec::with_capacity(row_bytes * desc.height as usize);
        for row in 0..desc.height as usize {
            let start = row * desc.row_stride;
            pixels.extend_from_slice(&bytes[start..start + row_bytes]);
        }
        let id = u32::try_from(self.textures.len()).map_err(|_| EngineError::NoMemory)?;
        self.textures.push(CanvasTexture { width: desc.width, height: desc.height, pixels });
        Ok(TextureHandle::from_raw(id))
    }

    fn clear(&mut self) -> Result<()> {
        self.ensure_open()?;
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&self.clear_color);
        }
        Ok(())
    }

    fn blit(&mut self, texture: TextureHandle, src: Rect, dst: Rect) -> Result<()> {
        self.ensure_open()?;
        let tex = self
            .textures
            .get(texture.raw() as usize)
            .ok_or_else(|| EngineError::BackendFailure(format!("unknown texture {}", texture.raw())))?;
        let src_fits = src.x >= 0
            && src.y >= 0
            && src.x as u64 + src.width as u64 <= tex.width as u64
            && src.y as u64 + src.height as u64 <= tex.height as u64;
        if !src_fits {
            return Err(EngineError::BackendFailure(format!(
                "source rect {src:?} exceeds {}x{} texture",
                tex.width, tex.height
            )));
        }
        if src.width == 0 || src.height == 0 || dst.width == 0 || dst.height == 0 {
            return Ok(());
        }

        let x0 = dst.x.max(0) as i64;
        let y0 = dst.y.max(0) as i64;
        let x1 = (dst.x as i64 + dst.width as i64).min(self.width as i64);
        let y1 = (dst.y as i64 + dst.height as i64).min(self.height as i64);
        for y in y0..y1 {
            let sy = src.y as i64 + (y - dst.y as i64) * src.height as i64 / dst.height as i64;
            for x in x0..x1 {
                let sx = src.x as i64 + (x - dst.x as i64) * src.width as i64 / dst.width as i64;
                let s = (sy as usize * tex.width as usize + sx as usize) * 4;
                let d = (y as usize * self.width as usize + x as usize) * 4;
                blend(&mut self.pixels[d..d + 4], &tex.pixels[s..s + 4]);
            }
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.frames_presented += 1;
        Ok(())
    }
}

/// Source-over blend of one straight-alpha RGBA8 pixel.
fn blend(dst: &mut [u8], src: &[u8]) {
    let alpha = src[3] as u32;
    match alpha {
        0 => {}
        255 => dst.copy_from_slice(src),
        _ => {
            let inv = 255 - alpha;
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * inv + 127) / 255) as u8;
            }
            dst[3] = (alpha + (dst[3] as u32 * inv + 127) / 255).min(255) as u8;
        }
    }
}
