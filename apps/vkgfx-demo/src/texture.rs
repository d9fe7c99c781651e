//! Albedo texture loading.

use std::path::Path;

use anyhow::Context;
use vkgfx_render::{
    ImageFormat, ImageMetadata, ResourceManager, SamplerHandle, Texture, TextureHandle,
};

/// Tightly packed RGBA8 pixels, rows top to bottom.
#[derive(Debug, Clone)]
pub struct Rgba8 {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Rgba8 {
    /// Decode a PNG or JPEG file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgba8();

        Ok(Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }

    /// `size` x `size` board of `tile`-pixel squares, `light` in the top-left.
    pub fn checkerboard(size: u32, tile: u32, light: [u8; 4], dark: [u8; 4]) -> Self {
        let tile = tile.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let color = if (x / tile + y / tile) % 2 == 0 {
                    light
                } else {
                    dark
                };
                pixels.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    pub fn metadata(&self) -> ImageMetadata {
        ImageMetadata {
            width: self.width,
            height: self.height,
            format: ImageFormat::R8G8B8A8,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let start = ((y * self.width + x) * 4) as usize;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.pixels[start..start + 4]);
        pixel
    }

    /// Upload as a sampled image and pair it with `sampler`.
    pub fn upload(
        &self,
        resources: &mut ResourceManager,
        sampler: SamplerHandle,
    ) -> vkgfx_render::Result<TextureHandle> {
        let image = resources.create_image_with_data(self.metadata(), &self.pixels)?;
        resources
            .create_texture(Texture { image, sampler })
            .inspect_err(|_| {
                resources.remove_image(image);
            })
    }
}
