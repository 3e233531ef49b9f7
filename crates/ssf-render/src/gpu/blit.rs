//! Full-screen passes running the four fluid programs.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use ssf_core::{SsfUniforms, TargetFormat};

use super::texture::wgpu_format;
use crate::backend::BlitProgram;

const COMMON_SHADER: &str = include_str!("../shaders/common.wgsl");

/// Shader source of `program`, with the shared declarations prepended.
pub fn program_source(program: BlitProgram) -> String {
    let body = match program {
        BlitProgram::DownSample => include_str!("../shaders/downsample.wgsl"),
        BlitProgram::UpSample => include_str!("../shaders/upsample.wgsl"),
        BlitProgram::DepthNormal => include_str!("../shaders/depth_normal.wgsl"),
        BlitProgram::Lit => include_str!("../shaders/lit.wgsl"),
    };
    format!("{COMMON_SHADER}\n{body}")
}

/// Formats a program can write.
pub fn output_formats(program: BlitProgram) -> &'static [TargetFormat] {
    match program {
        BlitProgram::DownSample | BlitProgram::UpSample => {
            &[TargetFormat::R16Float, TargetFormat::R32Float]
        }
        BlitProgram::DepthNormal | BlitProgram::Lit => {
            &[TargetFormat::Rgba8Unorm, TargetFormat::Rgba16Float]
        }
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            // Float32 targets cannot be filtered; programs load texels directly.
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Pipelines of every program for every format it can write.
pub struct BlitPasses {
    pipelines: HashMap<(BlitProgram, wgpu::TextureFormat), wgpu::RenderPipeline>,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl BlitPasses {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Ssf Blit Bind Group Layout"),
            entries: &[
                // Source
                texture_entry(0),
                // Smoothed height
                texture_entry(1),
                // Packed normals
                texture_entry(2),
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ssf Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let mut pipelines = HashMap::new();
        for program in [
            BlitProgram::DownSample,
            BlitProgram::UpSample,
            BlitProgram::DepthNormal,
            BlitProgram::Lit,
        ] {
            let label = format!("Ssf {program:?} Shader");
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(program_source(program).into()),
            });
            for &format in output_formats(program) {
                let format = wgpu_format(format);
                let pipeline = Self::create_pipeline(device, &pipeline_layout, &shader, format);
                pipelines.insert((program, format), pipeline);
            }
        }

        Self {
            pipelines,
            bind_group_layout,
        }
    }

    fn create_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        shader: &wgpu::ShaderModule,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Ssf Blit Pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
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
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    pub fn pipeline(
        &self,
        program: BlitProgram,
        format: wgpu::TextureFormat,
    ) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(&(program, format))
    }

    /// Creates a bind group with a fresh uniform buffer, so blits recorded
    /// into the same encoder keep their own parameters.
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        source_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        normal_view: &wgpu::TextureView,
        uniforms: &SsfUniforms,
    ) -> wgpu::BindGroup {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Ssf Blit Uniform Buffer"),
            contents: bytemuck::cast_slice(&[*uniforms]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ssf Blit Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(normal_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        })
    }

    /// Renders a fullscreen triangle into `output_view`.
    pub fn render(
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        output_view: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        bind_group: &wgpu::BindGroup,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });

        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.draw(0..3, 0..1); // Fullscreen triangle
    }
}
