//! In-memory images with format-accurate storage.

use glam::{Vec2, Vec4};
use half::f16;

use ssf_core::TargetFormat;

/// Rounds a value to what `format` can store.
///
/// Single-channel formats read back as `(r, 0, 0, 1)`.
pub fn quantize(format: TargetFormat, value: Vec4) -> Vec4 {
    match format {
        TargetFormat::R32Float => Vec4::new(value.x, 0.0, 0.0, 1.0),
        TargetFormat::R16Float => Vec4::new(f16::from_f32(value.x).to_f32(), 0.0, 0.0, 1.0),
        TargetFormat::Rgba16Float => {
            Vec4::from_array(value.to_array().map(|c| f16::from_f32(c).to_f32()))
        }
        TargetFormat::Rgba8Unorm => {
            Vec4::from_array(value.to_array().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() / 255.0))
        }
    }
}

/// A 2D image of RGBA texels.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    format: TargetFormat,
    texels: Vec<Vec4>,
}

impl Image {
    /// Creates an image with every texel at zero.
    pub fn new(width: u32, height: u32, format: TargetFormat) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let zero = quantize(format, Vec4::ZERO);
        Self {
            width,
            height,
            format,
            texels: vec![zero; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> TargetFormat {
        self.format
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// First channel of every texel.
    pub fn channel0(&self) -> Vec<f32> {
        self.texels.iter().map(|t| t.x).collect()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Reads a texel, clamping coordinates to the edge.
    pub fn load(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, i64::from(self.width) - 1) as u32;
        let y = y.clamp(0, i64::from(self.height) - 1) as u32;
        self.texels[self.index(x, y)]
    }

    /// Writes a texel, rounding to the image format.
    pub fn store(&mut self, x: u32, y: u32, value: Vec4) {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.texels[i] = quantize(self.format, value);
        }
    }

    /// Sets every texel to `value`.
    pub fn fill(&mut self, value: Vec4) {
        let q = quantize(self.format, value);
        self.texels.fill(q);
    }

    /// Replaces the contents from a slice of texels.
    pub fn write_all(&mut self, texels: &[Vec4]) -> bool {
        if texels.len() != self.texels.len() {
            return false;
        }
        let format = self.format;
        for (dst, src) in self.texels.iter_mut().zip(texels) {
            *dst = quantize(format, *src);
        }
        true
    }

    /// Nearest-texel lookup at a texture coordinate (top-left origin).
    pub fn sample_point(&self, uv: Vec2) -> Vec4 {
        let x = (uv.x * self.width as f32).floor() as i64;
        let y = (uv.y * self.height as f32).floor() as i64;
        self.load(x, y)
    }

    /// Bilinear lookup with clamp-to-edge addressing.
    pub fn sample_bilinear(&self, uv: Vec2) -> Vec4 {
        let p = uv * Vec2::new(self.width as f32, self.height as f32) - Vec2::splat(0.5);
        let base = p.floor();
        let f = p - base;
        let (x, y) = (base.x as i64, base.y as i64);
        let a = self.load(x, y);
        let b = self.load(x + 1, y);
        let c = self.load(x, y + 1);
        let d = self.load(x + 1, y + 1);
        a.lerp(b, f.x).lerp(c.lerp(d, f.x), f.y)
    }

    /// Texture coordinate of a texel center.
    pub fn texel_center(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        )
    }
}
