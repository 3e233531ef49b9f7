//! Texture storage and texel packing for the GPU backend.

use glam::Vec4;
use half::f16;

use ssf_core::TargetFormat;

/// Usage of every texture the backend renders to or samples from.
pub const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

pub fn wgpu_format(format: TargetFormat) -> wgpu::TextureFormat {
    match format {
        TargetFormat::R16Float => wgpu::TextureFormat::R16Float,
        TargetFormat::R32Float => wgpu::TextureFormat::R32Float,
        TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

pub fn target_format(format: wgpu::TextureFormat) -> Option<TargetFormat> {
    match format {
        wgpu::TextureFormat::R16Float => Some(TargetFormat::R16Float),
        wgpu::TextureFormat::R32Float => Some(TargetFormat::R32Float),
        wgpu::TextureFormat::Rgba8Unorm => Some(TargetFormat::Rgba8Unorm),
        wgpu::TextureFormat::Rgba16Float => Some(TargetFormat::Rgba16Float),
        _ => None,
    }
}

/// Packs texels into tightly laid out rows of `format`.
///
/// Single-channel formats keep the first channel only.
pub fn encode_texels(format: TargetFormat, texels: &[Vec4]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(texels.len() * format.bytes_per_pixel() as usize);
    for t in texels {
        match format {
            TargetFormat::R16Float => bytes.extend_from_slice(&f16::from_f32(t.x).to_le_bytes()),
            TargetFormat::R32Float => bytes.extend_from_slice(&t.x.to_le_bytes()),
            TargetFormat::Rgba8Unorm => {
                bytes.extend(t.to_array().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
            }
            TargetFormat::Rgba16Float => {
                for c in t.to_array() {
                    bytes.extend_from_slice(&f16::from_f32(c).to_le_bytes());
                }
            }
        }
    }
    bytes
}

/// Unpacks tightly laid out rows of `format`.
///
/// Single-channel formats decode as `(r, 0, 0, 1)`.
pub fn decode_texels(format: TargetFormat, bytes: &[u8]) -> Vec<Vec4> {
    let half_at = |c: &[u8], i: usize| f16::from_le_bytes([c[2 * i], c[2 * i + 1]]).to_f32();
    bytes
        .chunks_exact(format.bytes_per_pixel() as usize)
        .map(|c| match format {
            TargetFormat::R16Float => Vec4::new(half_at(c, 0), 0.0, 0.0, 1.0),
            TargetFormat::R32Float => {
                Vec4::new(f32::from_le_bytes([c[0], c[1], c[2], c[3]]), 0.0, 0.0, 1.0)
            }
            TargetFormat::Rgba8Unorm => {
                Vec4::new(c[0].into(), c[1].into(), c[2].into(), c[3].into()) / 255.0
            }
            TargetFormat::Rgba16Float => Vec4::new(
                half_at(c, 0),
                half_at(c, 1),
                half_at(c, 2),
                half_at(c, 3),
            ),
        })
        .collect()
}

/// Bytes per row of a readback buffer, padded to the copy alignment.
pub fn aligned_bytes_per_row(width: u32, format: TargetFormat) -> u32 {
    let unaligned = width * format.bytes_per_pixel();
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

/// A texture and its default view.
pub struct GpuTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: TargetFormat,
}

impl GpuTarget {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: TargetFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(format),
            usage: TARGET_USAGE,
            view_formats: &[],
        });
        Self::from_texture(texture, format)
    }

    pub fn from_texture(texture: wgpu::Texture, format: TargetFormat) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.texture.width(),
            height: self.texture.height(),
            depth_or_array_layers: 1,
        }
    }

    pub fn texel_count(&self) -> usize {
        let (w, h) = self.size();
        w as usize * h as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mapping_round_trips() {
        for format in [
            TargetFormat::R16Float,
            TargetFormat::R32Float,
            TargetFormat::Rgba8Unorm,
            TargetFormat::Rgba16Float,
        ] {
            assert_eq!(target_format(wgpu_format(format)), Some(format));
        }
        assert_eq!(target_format(wgpu::TextureFormat::Bgra8Unorm), None);
    }

    #[test]
    fn test_single_channel_packing() {
        let texels = [Vec4::new(0.75, 0.2, 0.3, 0.4)];
        let bytes = encode_texels(TargetFormat::R32Float, &texels);
        assert_eq!(bytes.len(), 4);
        assert_eq!(
            decode_texels(TargetFormat::R32Float, &bytes),
            vec![Vec4::new(0.75, 0.0, 0.0, 1.0)]
        );

        let bytes = encode_texels(TargetFormat::R16Float, &texels);
        assert_eq!(bytes.len(), 2);
        assert_eq!(decode_texels(TargetFormat::R16Float, &bytes)[0].x, 0.75);
    }

    #[test]
    fn test_rgba8_clamps() {
        let bytes = encode_texels(TargetFormat::Rgba8Unorm, &[Vec4::new(-1.0, 0.5, 2.0, 1.0)]);
        assert_eq!(bytes, vec![0, 128, 255, 255]);
    }

    #[test]
    fn test_row_alignment() {
        assert_eq!(aligned_bytes_per_row(1, TargetFormat::R32Float), 256);
        assert_eq!(aligned_bytes_per_row(64, TargetFormat::R32Float), 256);
        assert_eq!(aligned_bytes_per_row(65, TargetFormat::R32Float), 512);
    }
}
