use std::cell::Cell;
use std::path::Path;

use super::{rgba8_len, PixelFormat, RenderBackend, TextureDesc, TextureHandle, MAX_DIMENSION};
use crate::error::{EngineError, Result};
use crate::fs;

/// CPU-side pixel data plus the backend texture created from it on first draw.
#[derive(Debug)]
pub struct Texture {
    desc: TextureDesc,
    pixels: Vec<u8>,
    uploaded: Cell<Option<TextureHandle>>,
}

impl Texture {
    pub fn from_raw(desc: TextureDesc, pixels: Vec<u8>) -> Result<Self> {
        check_size(desc.width, desc.height)?;
        let min_stride = desc.width as usize * desc.format.bytes_per_pixel();
        if desc.row_stride < min_stride {
            return Err(EngineError::BackendFailure(format!(
                "row stride {} is smaller than a {}px row",
                desc.row_stride, desc.width
            )));
        }
        if pixels.len() < desc.required_len() {
            return Err(EngineError::BackendFailure(format!(
                "texture data holds {} bytes, {}x{} needs {}",
                pixels.len(),
                desc.width,
                desc.height,
                desc.required_len()
            )));
        }
        Ok(Self { desc, pixels, uploaded: Cell::new(None) })
    }

    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Result<Self> {
        let len = check_size(width, height)?;
        let desc = TextureDesc::packed(PixelFormat::Rgba8, width, height);
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|_| EngineError::NoMemory)?;
        for _ in 0..len / 4 {
            pixels.extend_from_slice(&color);
        }
        Ok(Self { desc, pixels, uploaded: Cell::new(None) })
    }

    /// Decodes an image file (PNG) into RGBA8 pixels.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read_file(path)?;
        let img = image::load_from_memory(&bytes)
            .map_err(|err| EngineError::BackendFailure(format!("decoding {}: {err}", path.display())))?
            .to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self {
            desc: TextureDesc::packed(PixelFormat::Rgba8, width, height),
            pixels: img.into_raw(),
            uploaded: Cell::new(None),
        })
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub(crate) fn handle<B: RenderBackend + ?Sized>(&self, backend: &mut B) -> Result<TextureHandle> {
        if let Some(handle) = self.uploaded.get() {
            return Ok(handle);
        }
        let handle = backend.create_texture(&self.desc, &self.pixels)?;
        self.uploaded.set(Some(handle));
        Ok(handle)
    }
}

fn check_size(width: u32, height: u32) -> Result<usize> {
    rgba8_len(width, height).ok_or_else(|| {
        EngineError::BackendFailure(format!("texture size {width}x{height} exceeds {MAX_DIMENSION}x{MAX_DIMENSION}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffers_and_narrow_strides() {
        let desc = TextureDesc::packed(PixelFormat::Rgba8, 2, 2);
        assert!(Texture::from_raw(desc, vec![0; 15]).is_err());
        assert!(Texture::from_raw(TextureDesc { row_stride: 4, ..desc }, vec![0; 16]).is_err());
        assert!(Texture::from_raw(desc, vec![0; 16]).is_ok());
    }

    #[test]
    fn solid_fills_every_pixel() {
        let tex = Texture::solid(3, 2, [1, 2, 3, 4]).expect("texture");
        assert_eq!(tex.pixels().len(), 24);
        assert!(tex.pixels().chunks(4).all(|px| px == [1, 2, 3, 4]));
    }

    #[test]
    fn oversized_textures_are_rejected() {
        let err = Texture::solid(u32::MAX, u32::MAX, [0; 4]).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::BackendFailure);
        assert!(Texture::solid(MAX_DIMENSION + 1, 1, [0; 4]).is_err());
        let desc = TextureDesc::packed(PixelFormat::Rgba8, MAX_DIMENSION + 1, 1);
        assert!(Texture::from_raw(desc, Vec::new()).is_err());
    }

    #[test]
    fn load_reports_missing_files_through_fs_codes() {
        let err = Texture::load("no/such/image.png").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::FsNoEntry);
    }
}
