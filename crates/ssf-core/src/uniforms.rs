//! Uniform block shared by every blit program.

use glam::{Mat4, Vec3, Vec4};

use crate::config::{PipelineConfig, ReconstructionMode};
use crate::frustum::{clip_to_view_matrix, CornerOrder, FrustumCorners, ZBufferParams};
use crate::scene::CameraFrame;

/// GPU-compatible per-blit uniforms.
///
/// Matches the `SsfUniforms` struct in the WGSL programs; every member is a
/// 16-byte aligned vector or matrix.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SsfUniforms {
    /// Inverse of the GPU projection: (ndc.xy, device depth) to view space.
    pub clip_to_view: [[f32; 4]; 4],
    /// Far-plane corner rays in quad order (bottom-left, bottom-right, top-left, top-right).
    pub frustum_corners: [[f32; 4]; 4],
    /// near, far, orthographic (0/1), reconstruction mode (0 matrix, 1 frustum ray).
    pub zbuffer_params: [f32; 4],
    /// 1/width, 1/height, width, height of the source image.
    pub src_texel_size: [f32; 4],
    /// 1/width, 1/height, width, height of the destination image.
    pub dst_texel_size: [f32; 4],
    pub tint: [f32; 4],
    pub ambient_color: [f32; 4],
    pub specular_color: [f32; 4],
    pub edge_color: [f32; 4],
    /// View-space direction toward the main light, intensity in w.
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    /// glossiness, rim amount, rim threshold, depth threshold.
    pub shading: [f32; 4],
    /// depth scale factor, edge scale factor, edge depth threshold, edge normal threshold.
    pub edges: [f32; 4],
    /// distortion strength, unused x3.
    pub distortion: [f32; 4],
}

impl SsfUniforms {
    /// Builds the uniforms for one frame.
    ///
    /// Frustum-ray reconstruction needs a perspective camera; orthographic
    /// frames fall back to matrix reconstruction.
    pub fn new(config: &PipelineConfig, frame: &CameraFrame, flip_y: bool) -> Self {
        let lighting = &config.lighting;
        let zbuffer = ZBufferParams::from_projection(frame.projection);
        let mode = match config.reconstruction {
            ReconstructionMode::FrustumRay if !zbuffer.orthographic => 1.0,
            _ => 0.0,
        };

        let corners = FrustumCorners::from_projection(frame.projection).ordered(CornerOrder::Quad);
        let light = &frame.main_light;
        let light_dir = frame
            .view_matrix()
            .transform_vector3(light.direction)
            .normalize_or(Vec3::Z);

        Self {
            clip_to_view: clip_to_view_matrix(frame.projection, flip_y).to_cols_array_2d(),
            frustum_corners: corners.map(|c| c.extend(0.0).to_array()),
            zbuffer_params: [
                zbuffer.near,
                zbuffer.far,
                if zbuffer.orthographic { 1.0 } else { 0.0 },
                mode,
            ],
            src_texel_size: texel_size(frame.width, frame.height),
            dst_texel_size: texel_size(frame.width, frame.height),
            tint: lighting.tint.to_array(),
            ambient_color: lighting.ambient_color.to_array(),
            specular_color: lighting.specular_color.to_array(),
            edge_color: lighting.edge_color.to_array(),
            light_direction: light_dir.extend(light.intensity).to_array(),
            light_color: light.color.extend(1.0).to_array(),
            shading: [
                lighting.glossiness,
                lighting.rim_amount,
                lighting.rim_threshold,
                lighting.depth_threshold,
            ],
            edges: [
                lighting.depth_scale_factor as f32,
                lighting.edge_scale_factor as f32,
                lighting.edge_depth_threshold,
                lighting.edge_normal_threshold,
            ],
            distortion: [lighting.distortion_strength, 0.0, 0.0, 0.0],
        }
    }

    /// Returns a copy with source and destination sizes set for one blit.
    #[must_use]
    pub fn for_blit(mut self, src: (u32, u32), dst: (u32, u32)) -> Self {
        self.src_texel_size = texel_size(src.0, src.1);
        self.dst_texel_size = texel_size(dst.0, dst.1);
        self
    }

    pub fn clip_to_view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.clip_to_view)
    }

    /// Corner rays in quad order.
    pub fn frustum_corners(&self) -> [Vec3; 4] {
        self.frustum_corners.map(|c| Vec4::from_array(c).truncate())
    }

    pub fn zbuffer(&self) -> ZBufferParams {
        ZBufferParams {
            near: self.zbuffer_params[0],
            far: self.zbuffer_params[1],
            orthographic: self.zbuffer_params[2] > 0.5,
        }
    }

    /// Reconstruction mode in effect for this frame.
    pub fn reconstruction(&self) -> ReconstructionMode {
        if self.zbuffer_params[3] > 0.5 {
            ReconstructionMode::FrustumRay
        } else {
            ReconstructionMode::Matrix
        }
    }

    pub fn depth_threshold(&self) -> f32 {
        self.shading[3]
    }
}

fn texel_size(width: u32, height: u32) -> [f32; 4] {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    [1.0 / w, 1.0 / h, w, h]
}
