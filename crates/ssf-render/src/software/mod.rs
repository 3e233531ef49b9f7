//! CPU reference backend.
//!
//! Executes every pass on in-memory [`Image`]s. Besides serving as the
//! numerical reference for the WGSL programs it supports a memory budget and
//! failure injection, which makes the frame-drop paths testable.
//!
//! Commands execute immediately. Host images touched since the last submit
//! are journaled so a discarded frame leaves them as they were.

mod image;
pub mod programs;
mod raster;

use std::collections::{HashMap, HashSet};

use glam::Vec4;

use ssf_core::{
    Result, SsfError, StorageId, TargetAllocator, TargetDescriptor, TargetFormat, TargetUsage,
};

pub use image::{quantize, Image};

use crate::backend::{
    BlitProgram, DrawRequest, DrawStats, EffectMaterial, PassId, PassInputs, RenderBackend,
};
use crate::error::{RenderError, RenderResult};

/// Storage owned by the backend, with its pool-facing sample count.
#[derive(Debug)]
struct Slot {
    image: Image,
    samples: u32,
    bytes: u64,
}

/// A backend that renders on the CPU.
#[derive(Debug)]
pub struct SoftwareBackend {
    material: EffectMaterial,
    slots: HashMap<StorageId, Slot>,
    /// Storage handed out through [`TargetAllocator`].
    pooled: HashSet<StorageId>,
    next_id: u64,
    unsupported: HashSet<TargetFormat>,
    max_samples: u32,
    memory_budget: Option<u64>,
    used_bytes: u64,
    fail_allocation_at: Option<usize>,
    fail_command_at: Option<usize>,
    allocations: usize,
    commands: usize,
    submissions: usize,
    /// Host images as they were before the unsubmitted commands touched them.
    journal: HashMap<StorageId, Image>,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    /// Creates a backend exposing the default effect material.
    pub fn new() -> Self {
        Self {
            material: EffectMaterial::default(),
            slots: HashMap::new(),
            pooled: HashSet::new(),
            next_id: 1,
            unsupported: HashSet::new(),
            max_samples: 8,
            memory_budget: None,
            used_bytes: 0,
            fail_allocation_at: None,
            fail_command_at: None,
            allocations: 0,
            commands: 0,
            submissions: 0,
            journal: HashMap::new(),
        }
    }

    /// Replaces the effect material.
    #[must_use]
    pub fn with_material(mut self, material: EffectMaterial) -> Self {
        self.material = material;
        self
    }

    /// Marks a format as not renderable.
    #[must_use]
    pub fn without_format(mut self, format: TargetFormat) -> Self {
        self.unsupported.insert(format);
        self
    }

    /// Limits multisampled targets to at most `samples` samples.
    #[must_use]
    pub fn with_max_msaa_samples(mut self, samples: u32) -> Self {
        self.max_samples = samples.max(1);
        self
    }

    /// Caps the bytes of pool storage alive at once.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Makes the `n`th allocation from now (0-based) fail with `ResourceExhausted`.
    pub fn fail_allocation_at(&mut self, n: usize) {
        self.allocations = 0;
        self.fail_allocation_at = Some(n);
    }

    /// Makes the `n`th command from now (0-based) fail.
    pub fn fail_command_at(&mut self, n: usize) {
        self.commands = 0;
        self.fail_command_at = Some(n);
    }

    /// Clears any injected failures.
    pub fn clear_failures(&mut self) {
        self.fail_allocation_at = None;
        self.fail_command_at = None;
    }

    /// Creates a host-owned image, such as a camera color buffer.
    pub fn create_image(&mut self, width: u32, height: u32, format: TargetFormat) -> StorageId {
        let id = self.next_storage();
        let image = Image::new(width, height, format);
        self.slots.insert(
            id,
            Slot {
                image,
                samples: 1,
                bytes: 0,
            },
        );
        id
    }

    /// Creates a host-owned image initialised from `texels`.
    pub fn import_image(
        &mut self,
        width: u32,
        height: u32,
        format: TargetFormat,
        texels: &[Vec4],
    ) -> RenderResult<StorageId> {
        let id = self.create_image(width, height, format);
        self.write_image(id, texels)?;
        Ok(id)
    }

    /// Overwrites an image.
    pub fn write_image(&mut self, storage: StorageId, texels: &[Vec4]) -> RenderResult<()> {
        self.journal.remove(&storage);
        let image = &mut self
            .slots
            .get_mut(&storage)
            .ok_or(RenderError::UnknownStorage(storage))?
            .image;
        let expected = image.texels().len();
        if image.write_all(texels) {
            Ok(())
        } else {
            Err(RenderError::SizeMismatch {
                expected,
                actual: texels.len(),
            })
        }
    }

    /// Removes a host-owned image.
    pub fn remove_image(&mut self, storage: StorageId) -> Option<Image> {
        if self.pooled.contains(&storage) {
            return None;
        }
        self.journal.remove(&storage);
        self.slots.remove(&storage).map(|s| s.image)
    }

    /// Looks up any image by storage id.
    pub fn image(&self, storage: StorageId) -> Option<&Image> {
        self.slots.get(&storage).map(|s| &s.image)
    }

    /// Number of pool targets currently allocated.
    pub fn live_targets(&self) -> usize {
        self.pooled.len()
    }

    /// Bytes held by pool targets.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Number of completed submissions.
    pub fn submissions(&self) -> usize {
        self.submissions
    }

    fn next_storage(&mut self) -> StorageId {
        let id = StorageId(self.next_id);
        self.next_id += 1;
        id
    }

    fn begin_command(&mut self, what: &str) -> Result<()> {
        let index = self.commands;
        self.commands += 1;
        if self.fail_command_at == Some(index) {
            return Err(RenderError::CommandFailed(format!("injected failure in {what}")).into());
        }
        Ok(())
    }

    fn slot(&self, storage: StorageId) -> Result<&Slot> {
        self.slots
            .get(&storage)
            .ok_or_else(|| RenderError::UnknownStorage(storage).into())
    }

    /// Keeps the pre-frame contents of a host image so [`RenderBackend::discard`]
    /// can restore it. Pool targets are scratch and are not journaled.
    fn journal_write(&mut self, storage: StorageId) {
        if self.pooled.contains(&storage) || self.journal.contains_key(&storage) {
            return;
        }
        if let Some(slot) = self.slots.get(&storage) {
            self.journal.insert(storage, slot.image.clone());
        }
    }

    fn image_mut(&mut self, storage: StorageId) -> Result<&mut Image> {
        self.journal_write(storage);
        self.slots
            .get_mut(&storage)
            .map(|s| &mut s.image)
            .ok_or_else(|| RenderError::UnknownStorage(storage).into())
    }

    fn input(&self, storage: Option<StorageId>, what: &str) -> Result<&Image> {
        let storage = storage
            .ok_or_else(|| RenderError::CommandFailed(format!("missing {what} input")))?;
        Ok(&self.slot(storage)?.image)
    }
}

impl TargetAllocator for SoftwareBackend {
    fn allocate(&mut self, name: &str, descriptor: &TargetDescriptor) -> Result<StorageId> {
        let index = self.allocations;
        self.allocations += 1;
        let bytes = descriptor.byte_size();
        let over_budget = self
            .memory_budget
            .is_some_and(|budget| self.used_bytes + bytes > budget);
        if self.fail_allocation_at == Some(index) || over_budget {
            return Err(SsfError::ResourceExhausted {
                name: name.to_string(),
                width: descriptor.width,
                height: descriptor.height,
                format: descriptor.format,
            });
        }

        let id = self.next_storage();
        self.slots.insert(
            id,
            Slot {
                image: Image::new(descriptor.width, descriptor.height, descriptor.format),
                samples: descriptor.msaa_samples,
                bytes,
            },
        );
        self.pooled.insert(id);
        self.used_bytes += bytes;
        log::trace!("Ssf: allocated '{name}' as {id:?} ({bytes} bytes)");
        Ok(id)
    }

    fn free(&mut self, storage: StorageId) {
        if !self.pooled.remove(&storage) {
            log::error!("Ssf: free of unknown storage {storage:?}");
            return;
        }
        if let Some(slot) = self.slots.remove(&storage) {
            self.used_bytes = self.used_bytes.saturating_sub(slot.bytes);
        }
    }
}

impl RenderBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn find_pass(&self, name: &str) -> Option<PassId> {
        self.material.find_pass(name)
    }

    fn supports_format(&self, format: TargetFormat, usage: TargetUsage) -> bool {
        if self.unsupported.contains(&format) {
            return false;
        }
        match usage {
            TargetUsage::Height => format.is_height_format(),
            TargetUsage::Normal => format.is_normal_format(),
        }
    }

    fn supports_msaa(&self, samples: u32) -> bool {
        matches!(samples, 1 | 2 | 4 | 8) && samples <= self.max_samples
    }

    fn clear(&mut self, target: StorageId, value: f32) -> Result<()> {
        self.begin_command("clear")?;
        self.image_mut(target)?.fill(Vec4::splat(value));
        Ok(())
    }

    fn draw_billboards(&mut self, target: StorageId, request: &DrawRequest<'_>) -> Result<DrawStats> {
        self.begin_command("draw")?;
        self.journal_write(target);
        let slot = self
            .slots
            .get_mut(&target)
            .ok_or(RenderError::UnknownStorage(target))?;
        Ok(raster::draw_billboards(&mut slot.image, request, slot.samples))
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
        let label = self.material.pass_name(pass).unwrap_or("blit").to_string();
        self.begin_command(&label)?;

        // Work on a copy of the destination so sources stay readable, which
        // also covers self-blits.
        let mut out = self.slot(destination)?.image.clone();
        let src = &self.slot(source)?.image;
        let u = &inputs.uniforms;
        match program {
            BlitProgram::DownSample => programs::down_sample(src, &mut out, u),
            BlitProgram::UpSample => programs::up_sample(src, &mut out, u),
            BlitProgram::DepthNormal => programs::depth_normal(src, &mut out, u),
            BlitProgram::Lit => {
                let depth = self.input(inputs.depth, "depth")?;
                let normals = self.input(inputs.normals, "normals")?;
                programs::lit(src, depth, normals, &mut out, u);
            }
        }
        *self.image_mut(destination)? = out;
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        self.begin_command("submit")?;
        self.journal.clear();
        self.submissions += 1;
        Ok(())
    }

    fn discard(&mut self) {
        for (storage, image) in self.journal.drain() {
            if let Some(slot) = self.slots.get_mut(&storage) {
                slot.image = image;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssf_core::FilterMode;

    fn desc(w: u32, h: u32) -> TargetDescriptor {
        TargetDescriptor::new(w, h, TargetFormat::R32Float, FilterMode::Point)
    }

    #[test]
    fn test_allocate_and_free() {
        let mut backend = SoftwareBackend::new();
        let id = backend.allocate("a", &desc(4, 4)).unwrap();
        assert_eq!(backend.live_targets(), 1);
        assert_eq!(backend.used_bytes(), 64);
        backend.free(id);
        assert_eq!(backend.live_targets(), 0);
        assert_eq!(backend.used_bytes(), 0);
        assert!(backend.image(id).is_none());
    }

    #[test]
    fn test_memory_budget() {
        let mut backend = SoftwareBackend::new().with_memory_budget(100);
        assert!(backend.allocate("a", &desc(4, 4)).is_ok());
        let err = backend.allocate("b", &desc(4, 4)).unwrap_err();
        assert!(matches!(err, SsfError::ResourceExhausted { .. }));
    }

    #[test]
    fn test_injected_failures() {
        let mut backend = SoftwareBackend::new();
        backend.fail_allocation_at(1);
        assert!(backend.allocate("a", &desc(2, 2)).is_ok());
        assert!(backend.allocate("b", &desc(2, 2)).is_err());

        let target = backend.create_image(2, 2, TargetFormat::R32Float);
        backend.fail_command_at(0);
        assert!(backend.clear(target, 0.0).is_err());
        assert!(backend.clear(target, 0.0).is_ok());
    }

    #[test]
    fn test_host_images_are_not_pool_storage() {
        let mut backend = SoftwareBackend::new();
        let id = backend
            .import_image(1, 2, TargetFormat::Rgba8Unorm, &[Vec4::ONE, Vec4::ZERO])
            .unwrap();
        assert_eq!(backend.live_targets(), 0);
        assert_eq!(backend.image(id).unwrap().load(0, 1), Vec4::ZERO);
        assert!(backend.write_image(id, &[Vec4::ONE]).is_err());
        assert!(backend.remove_image(id).is_some());
    }

    #[test]
    fn test_discard_restores_host_images() {
        let mut backend = SoftwareBackend::new();
        let color = backend
            .import_image(1, 1, TargetFormat::Rgba8Unorm, &[Vec4::ONE])
            .unwrap();
        backend.clear(color, 0.0).unwrap();
        backend.discard();
        assert_eq!(backend.image(color).unwrap().load(0, 0), Vec4::ONE);

        backend.clear(color, 0.0).unwrap();
        backend.submit().unwrap();
        backend.discard();
        assert_eq!(backend.image(color).unwrap().load(0, 0), Vec4::ZERO);
    }

    #[test]
    fn test_unsupported_format() {
        let backend = SoftwareBackend::new().without_format(TargetFormat::R16Float);
        assert!(!backend.supports_format(TargetFormat::R16Float, TargetUsage::Height));
        assert!(backend.supports_format(TargetFormat::R32Float, TargetUsage::Height));
        assert!(!backend.supports_format(TargetFormat::R32Float, TargetUsage::Normal));
    }
}
