//! CPU raster surface used as the bake target
//!
//! Pixels are RGBA f32 in row-major order with row 0 at the top, matching the
//! orientation of [`crate::material::Texture`] so an accumulated bake can be
//! resampled as the next pass's base texture without conversion.

use std::path::Path;

use glam::Vec2;

use crate::error::PipelineError;

/// A square (or rectangular) RGBA f32 raster
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pixels: Vec<[f32; 4]>,
}

impl Raster {
    /// Create a raster cleared to transparent black
    pub fn new(width: u32, height: u32) -> Self {
        let pixel_count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            pixels: vec![[0.0, 0.0, 0.0, 0.0]; pixel_count],
        }
    }

    /// Clear every pixel to a solid color
    pub fn fill(&mut self, color: [f32; 4]) {
        self.pixels.fill(color);
    }

    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[(y as usize) * (self.width as usize) + (x as usize)])
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [f32; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.pixels[(y as usize) * (self.width as usize) + (x as usize)] = color;
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.pixels
    }

    /// Bilinear sample clamped to the edges; UV origin bottom-left, matching
    /// the mesh bake parameterization.
    pub fn sample(&self, uv: Vec2) -> [f32; 4] {
        let (w, h) = (self.width as i64, self.height as i64);
        let px = uv.x * w as f32 - 0.5;
        let py = (1.0 - uv.y) * h as f32 - 0.5;

        let x0 = px.floor() as i64;
        let y0 = py.floor() as i64;
        let fx = px - x0 as f32;
        let fy = py - y0 as f32;

        let cx0 = x0.clamp(0, w - 1) as u32;
        let cx1 = (x0 + 1).clamp(0, w - 1) as u32;
        let cy0 = y0.clamp(0, h - 1) as u32;
        let cy1 = (y0 + 1).clamp(0, h - 1) as u32;

        let at = |x: u32, y: u32| self.pixels[(y as usize) * (self.width as usize) + (x as usize)];
        let c00 = at(cx0, cy0);
        let c10 = at(cx1, cy0);
        let c01 = at(cx0, cy1);
        let c11 = at(cx1, cy1);

        let mut out = [0.0f32; 4];
        for i in 0..4 {
            let top = c00[i] * (1.0 - fx) + c10[i] * fx;
            let bottom = c01[i] * (1.0 - fx) + c11[i] * fx;
            out[i] = top * (1.0 - fy) + bottom * fy;
        }
        out
    }

    /// Raw pixel data for GPU upload or hashing
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Convert to 8-bit RGBA, clamping out-of-range values
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }

    /// Persist as a PNG file
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let buffer = image::RgbaImage::from_raw(self.width, self.height, self.to_rgba8())
            .ok_or_else(|| PipelineError::Image {
                path: path.to_path_buf(),
                source: image::ImageError::Parameter(image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                )),
            })?;
        buffer.save(path).map_err(|source| PipelineError::Image {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_raster_is_transparent() {
        let raster = Raster::new(4, 4);
        assert_eq!(raster.get_pixel(0, 0), Some([0.0, 0.0, 0.0, 0.0]));
        assert_eq!(raster.get_pixel(4, 0), None);
    }

    #[test]
    fn test_set_get_pixel() {
        let mut raster = Raster::new(4, 4);
        raster.set_pixel(2, 3, [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(raster.get_pixel(2, 3), Some([1.0, 0.5, 0.25, 1.0]));
        // Out of bounds writes are ignored
        raster.set_pixel(9, 9, [1.0; 4]);
    }

    #[test]
    fn test_sample_matches_texture_orientation() {
        let mut raster = Raster::new(1, 2);
        raster.set_pixel(0, 0, [1.0; 4]); // top row
        raster.set_pixel(0, 1, [0.0, 0.0, 0.0, 1.0]); // bottom row
        // v = 1 samples the top of the image
        let top = raster.sample(Vec2::new(0.5, 0.75));
        let bottom = raster.sample(Vec2::new(0.5, 0.25));
        assert!(top[0] > 0.99);
        assert!(bottom[0] < 0.01);
    }

    #[test]
    fn test_to_rgba8_clamps() {
        let mut raster = Raster::new(1, 1);
        raster.set_pixel(0, 0, [2.0, -1.0, 0.5, 1.0]);
        let bytes = raster.to_rgba8();
        assert_eq!(bytes[0], 255);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[2], 128);
        assert_eq!(bytes[3], 255);
    }

    #[test]
    fn test_as_bytes_length() {
        let raster = Raster::new(2, 2);
        assert_eq!(raster.as_bytes().len(), 2 * 2 * 4 * 4);
    }

    #[test]
    fn test_save_png() {
        let mut raster = Raster::new(2, 2);
        raster.fill([1.0, 0.0, 0.0, 1.0]);
        let path = std::env::temp_dir().join("baking_test_raster_save.png");
        raster.save_png(&path).expect("save");
        assert!(path.exists());
        std::fs::remove_file(&path).ok();
    }
}
