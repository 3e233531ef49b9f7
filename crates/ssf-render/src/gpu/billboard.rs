//! Sphere billboard depth rendering.
//!
//! Each instance is a camera-facing quad covering the sphere's projected
//! bounding box. The fragment shader ray-traces the sphere and writes the
//! exact reversed-Z depth both to the height target and to a depth
//! attachment, so overlapping spheres resolve to the nearest hit.

use std::collections::HashMap;

use glam::{Mat4, Vec4};
use wgpu::util::DeviceExt;

use ssf_core::TargetFormat;

use super::texture::{wgpu_format, GpuTarget};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// GPU representation of the billboard camera.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BillboardUniforms {
    pub projection: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    /// 1/w, 1/h, w, h
    pub target_size: [f32; 4],
}

impl BillboardUniforms {
    pub fn new(projection: Mat4, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            projection: projection.to_cols_array_2d(),
            inverse_projection: projection.inverse().to_cols_array_2d(),
            target_size: [1.0 / w, 1.0 / h, w, h],
        }
    }
}

/// Billboard depth render resources.
pub struct BillboardDepthPass {
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    bind_group_layout: wgpu::BindGroupLayout,
    /// Depth attachment of the last drawn size, replaced when the size changes.
    depth: Option<((u32, u32), wgpu::TextureView)>,
}

impl BillboardDepthPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ssf Billboard Bind Group Layout"),
            entries: &[
                // Camera uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Spheres (storage buffer)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ssf Billboard Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/billboard_depth.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ssf Billboard Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = [TargetFormat::R16Float, TargetFormat::R32Float]
            .into_iter()
            .map(wgpu_format)
            .map(|format| {
                let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Ssf Billboard Pipeline"),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vs_main"),
                        buffers: &[],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        cull_mode: None,
                        ..Default::default()
                    },
                    // Reversed Z: larger is nearer.
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Greater,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                });
                (format, pipeline)
            })
            .collect();

        Self {
            pipelines,
            bind_group_layout,
            depth: None,
        }
    }

    /// Whether billboards can be drawn into targets of `format`.
    pub fn supports(&self, format: TargetFormat) -> bool {
        self.pipelines.contains_key(&wgpu_format(format))
    }

    /// Size of the cached depth attachment.
    pub fn depth_attachment_size(&self) -> Option<(u32, u32)> {
        self.depth.as_ref().map(|(size, _)| *size)
    }

    fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Ssf Billboard Depth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Draws `spheres` (view-space center in xyz, radius in w) into `target`.
    ///
    /// Returns `false` without recording anything when the target format
    /// has no pipeline.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &GpuTarget,
        projection: Mat4,
        spheres: &[Vec4],
    ) -> bool {
        if spheres.is_empty() {
            return true;
        }
        let (width, height) = target.size();
        let format = wgpu_format(target.format);
        if !self.pipelines.contains_key(&format) {
            return false;
        }
        if self.depth_attachment_size() != Some((width, height)) {
            self.depth = Some((
                (width, height),
                Self::create_depth_view(device, width, height),
            ));
        }

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Ssf Billboard Uniform Buffer"),
            contents: bytemuck::cast_slice(&[BillboardUniforms::new(projection, width, height)]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let sphere_data: Vec<[f32; 4]> = spheres.iter().map(|s| s.to_array()).collect();
        let sphere_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Ssf Billboard Spheres"),
            contents: bytemuck::cast_slice(&sphere_data),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ssf Billboard Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sphere_buffer.as_entire_binding(),
                },
            ],
        });

        let (Some(pipeline), Some((_, depth_view))) =
            (self.pipelines.get(&format), self.depth.as_ref())
        else {
            return false;
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Ssf Billboard Depth Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..6, 0..spheres.len() as u32);
        true
    }
}
