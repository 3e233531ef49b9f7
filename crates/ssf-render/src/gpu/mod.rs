//! wgpu backend.
//!
//! Pool targets are single-sample textures owned by the backend. Commands
//! are recorded into one encoder per frame and submitted together; a
//! dropped frame discards the encoder so no partial overlay reaches the
//! color target.

mod billboard;
mod blit;
mod texture;

use std::collections::{HashMap, HashSet};

use glam::Vec4;

use ssf_core::{
    Result, SsfError, StorageId, TargetAllocator, TargetDescriptor, TargetFormat, TargetUsage,
};

pub use billboard::{BillboardDepthPass, BillboardUniforms};
pub use blit::{output_formats, program_source, BlitPasses};
pub use texture::{decode_texels, encode_texels, target_format, wgpu_format, GpuTarget};

use crate::backend::{
    BlitProgram, DrawRequest, DrawStats, EffectMaterial, PassId, PassInputs, RenderBackend,
};
use crate::error::{RenderError, RenderResult};

fn lookup(targets: &HashMap<StorageId, GpuTarget>, storage: StorageId) -> Result<&GpuTarget> {
    targets
        .get(&storage)
        .ok_or_else(|| RenderError::UnknownStorage(storage).into())
}

/// View bound for an auxiliary input. Only the lit program requires its
/// inputs; the others get a placeholder.
fn input_view<'a>(
    targets: &'a HashMap<StorageId, GpuTarget>,
    placeholder: &'a GpuTarget,
    program: BlitProgram,
    storage: Option<StorageId>,
    what: &str,
) -> Result<&'a wgpu::TextureView> {
    match (storage, program) {
        (Some(storage), _) => Ok(&lookup(targets, storage)?.view),
        (None, BlitProgram::Lit) => {
            Err(RenderError::CommandFailed(format!("missing {what} input")).into())
        }
        (None, _) => Ok(&placeholder.view),
    }
}

/// A backend that renders with wgpu.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    material: EffectMaterial,
    targets: HashMap<StorageId, GpuTarget>,
    /// Storage handed out through [`TargetAllocator`].
    pooled: HashSet<StorageId>,
    next_id: u64,
    blits: BlitPasses,
    billboards: BillboardDepthPass,
    /// Bound in place of absent auxiliary inputs.
    placeholder: GpuTarget,
    /// Source copy for self-blits, replaced when the size or format changes.
    blit_copy: Option<GpuTarget>,
    encoder: Option<wgpu::CommandEncoder>,
    submissions: usize,
}

impl GpuBackend {
    /// Creates a backend on an existing device.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let blits = BlitPasses::new(&device);
        let billboards = BillboardDepthPass::new(&device);
        let placeholder = GpuTarget::new(&device, "Ssf Placeholder", 1, 1, TargetFormat::Rgba8Unorm);
        log::info!("Ssf: created wgpu backend");
        Self {
            device,
            queue,
            material: EffectMaterial::default(),
            targets: HashMap::new(),
            pooled: HashSet::new(),
            next_id: 0,
            blits,
            billboards,
            placeholder,
            blit_copy: None,
            encoder: None,
            submissions: 0,
        }
    }

    /// Creates a backend on its own device, without a window.
    pub async fn new_headless() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("ssf device (headless)"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?;

        Ok(Self::new(device, queue))
    }

    /// Blocking version of [`GpuBackend::new_headless`].
    pub fn headless() -> RenderResult<Self> {
        pollster::block_on(Self::new_headless())
    }

    #[must_use]
    pub fn with_material(mut self, material: EffectMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn next_storage(&mut self) -> StorageId {
        let id = StorageId(self.next_id);
        self.next_id += 1;
        id
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        let max = self.device.limits().max_texture_dimension_2d;
        width > 0 && height > 0 && width <= max && height <= max
    }

    /// Creates a host-owned texture, such as a camera color buffer.
    pub fn create_image(
        &mut self,
        width: u32,
        height: u32,
        format: TargetFormat,
    ) -> RenderResult<StorageId> {
        if !self.fits(width, height) {
            return Err(RenderError::OutOfMemory);
        }
        let id = self.next_storage();
        let target = GpuTarget::new(&self.device, "Ssf Host Target", width, height, format);
        self.targets.insert(id, target);
        Ok(id)
    }

    /// Registers a texture created by the host.
    ///
    /// The texture must be single-sample, use one of the [`TargetFormat`]s
    /// and allow render attachment, binding and copies in both directions.
    pub fn import_texture(&mut self, texture: wgpu::Texture) -> RenderResult<StorageId> {
        let format = target_format(texture.format()).ok_or_else(|| {
            RenderError::CommandFailed(format!("unsupported texture format {:?}", texture.format()))
        })?;
        if !texture.usage().contains(texture::TARGET_USAGE) || texture.sample_count() != 1 {
            return Err(RenderError::CommandFailed(format!(
                "texture usage {:?} with {} sample(s) cannot be a color target",
                texture.usage(),
                texture.sample_count()
            )));
        }
        let id = self.next_storage();
        self.targets.insert(id, GpuTarget::from_texture(texture, format));
        Ok(id)
    }

    /// Uploads texels to a texture, row-major from the top-left.
    pub fn write_image(&mut self, storage: StorageId, texels: &[Vec4]) -> RenderResult<()> {
        let target = self
            .targets
            .get(&storage)
            .ok_or(RenderError::UnknownStorage(storage))?;
        if texels.len() != target.texel_count() {
            return Err(RenderError::SizeMismatch {
                expected: target.texel_count(),
                actual: texels.len(),
            });
        }
        let (width, height) = target.size();
        let data = encode_texels(target.format, texels);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * target.format.bytes_per_pixel()),
                rows_per_image: Some(height),
            },
            target.extent(),
        );
        Ok(())
    }

    /// Reads a texture back, row-major from the top-left.
    ///
    /// Commands recorded but not yet submitted are not visible.
    pub fn read_image(&self, storage: StorageId) -> RenderResult<Vec<Vec4>> {
        let target = self
            .targets
            .get(&storage)
            .ok_or(RenderError::UnknownStorage(storage))?;
        let (width, height) = target.size();
        let bytes_per_row = texture::aligned_bytes_per_row(width, target.format);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ssf Readback Buffer"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Ssf readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            target.extent(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        rx.recv()
            .map_err(|_| RenderError::ReadbackFailed)?
            .map_err(|_| RenderError::ReadbackFailed)?;

        // Strip row padding
        let data = buffer_slice.get_mapped_range();
        let row_bytes = (width * target.format.bytes_per_pixel()) as usize;
        let mut texels = Vec::with_capacity(target.texel_count());
        for row in 0..height as usize {
            let start = row * bytes_per_row as usize;
            texels.extend(decode_texels(target.format, &data[start..start + row_bytes]));
        }
        drop(data);
        buffer.unmap();
        Ok(texels)
    }

    /// Removes a host-owned texture. Pool storage is left alone.
    pub fn remove_image(&mut self, storage: StorageId) -> bool {
        if self.pooled.contains(&storage) {
            return false;
        }
        self.targets.remove(&storage).is_some()
    }

    /// Number of pool targets currently allocated.
    pub fn live_targets(&self) -> usize {
        self.pooled.len()
    }

    /// Size of the cached self-blit source copy.
    pub fn blit_copy_size(&self) -> Option<(u32, u32)> {
        self.blit_copy.as_ref().map(GpuTarget::size)
    }

    /// Size of the cached billboard depth attachment.
    pub fn billboard_depth_size(&self) -> Option<(u32, u32)> {
        self.billboards.depth_attachment_size()
    }

    /// Number of completed submissions.
    pub fn submissions(&self) -> usize {
        self.submissions
    }
}

impl TargetAllocator for GpuBackend {
    fn allocate(&mut self, name: &str, descriptor: &TargetDescriptor) -> Result<StorageId> {
        if descriptor.msaa_samples != 1 || !self.fits(descriptor.width, descriptor.height) {
            return Err(SsfError::ResourceExhausted {
                name: name.to_string(),
                width: descriptor.width,
                height: descriptor.height,
                format: descriptor.format,
            });
        }
        let id = self.next_storage();
        let target = GpuTarget::new(
            &self.device,
            name,
            descriptor.width,
            descriptor.height,
            descriptor.format,
        );
        self.targets.insert(id, target);
        self.pooled.insert(id);
        log::trace!(
            "Ssf: allocated '{name}' as {id:?} ({}x{} {:?})",
            descriptor.width,
            descriptor.height,
            descriptor.format
        );
        Ok(id)
    }

    fn free(&mut self, storage: StorageId) {
        if !self.pooled.remove(&storage) {
            log::error!("Ssf: free of unknown storage {storage:?}");
            return;
        }
        self.targets.remove(&storage);
    }
}

impl RenderBackend for GpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn find_pass(&self, name: &str) -> Option<PassId> {
        self.material.find_pass(name)
    }

    fn supports_format(&self, format: TargetFormat, usage: TargetUsage) -> bool {
        match usage {
            TargetUsage::Height => {
                self.billboards.supports(format)
                    && output_formats(BlitProgram::DownSample).contains(&format)
            }
            TargetUsage::Normal => output_formats(BlitProgram::DepthNormal).contains(&format),
        }
    }

    fn supports_msaa(&self, samples: u32) -> bool {
        samples == 1
    }

    fn clear(&mut self, target: StorageId, value: f32) -> Result<()> {
        let target = lookup(&self.targets, target)?;
        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Ssf frame encoder"),
            })
        });
        let value = f64::from(value);
        let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Ssf Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: value,
                        g: value,
                        b: value,
                        a: value,
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
        Ok(())
    }

    fn draw_billboards(&mut self, target: StorageId, request: &DrawRequest<'_>) -> Result<DrawStats> {
        let mut stats = DrawStats::default();
        let mut spheres = Vec::new();
        for batch in request.eligible() {
            stats.batches += 1;
            stats.instances += batch.instances.len();
            spheres.extend(
                batch
                    .instances
                    .iter()
                    .map(|i| request.view.transform_point3(i.center).extend(i.radius)),
            );
        }

        let target = lookup(&self.targets, target)?;
        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Ssf frame encoder"),
            })
        });
        if !self
            .billboards
            .render(device, encoder, target, request.projection, &spheres)
        {
            return Err(RenderError::CommandFailed(format!(
                "cannot draw billboards into {:?}",
                target.format
            ))
            .into());
        }
        Ok(stats)
    }

    fn blit(
        &mut self,
        source: StorageId,
        destination: StorageId,
        pass: PassId,
        inputs: &PassInputs,
    ) -> Result<()> {
        let program = self
            .material
            .program(pass)
            .ok_or(RenderError::UnknownPass(pass.0))?;
        let label = self.material.pass_name(pass).unwrap_or("Ssf Blit");

        let dst = lookup(&self.targets, destination)?;
        let src = lookup(&self.targets, source)?;
        let pipeline = self
            .blits
            .pipeline(program, wgpu_format(dst.format))
            .ok_or_else(|| {
                RenderError::CommandFailed(format!("{program:?} cannot write {:?}", dst.format))
            })?;
        let (targets, placeholder) = (&self.targets, &self.placeholder);
        let depth_view = input_view(targets, placeholder, program, inputs.depth, "depth")?;
        let normal_view = input_view(targets, placeholder, program, inputs.normals, "normals")?;

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Ssf frame encoder"),
            })
        });

        // A texture cannot be sampled while it is the render attachment, so
        // self-blits read from a copy.
        let source_view = if source == destination {
            let (width, height) = src.size();
            let stale = self
                .blit_copy
                .as_ref()
                .is_none_or(|c| c.size() != (width, height) || c.format != src.format);
            if stale {
                log::debug!("Ssf: blit source copy {width}x{height} {:?}", src.format);
                self.blit_copy = Some(GpuTarget::new(
                    device,
                    "Ssf Blit Source Copy",
                    width,
                    height,
                    src.format,
                ));
            }
            let copy = self
                .blit_copy
                .as_ref()
                .ok_or_else(|| RenderError::CommandFailed("missing blit source copy".into()))?;
            encoder.copy_texture_to_texture(
                src.texture.as_image_copy(),
                copy.texture.as_image_copy(),
                src.extent(),
            );
            &copy.view
        } else {
            &src.view
        };

        let bind_group = self.blits.create_bind_group(
            device,
            source_view,
            depth_view,
            normal_view,
            &inputs.uniforms,
        );
        BlitPasses::render(encoder, label, &dst.view, pipeline, &bind_group);
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.submissions += 1;
        Ok(())
    }

    fn discard(&mut self) {
        if self.encoder.take().is_some() {
            log::debug!("Ssf: discarded unsubmitted commands");
        }
    }
}
