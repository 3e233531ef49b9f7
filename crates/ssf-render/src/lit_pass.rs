//! Lighting and composite over the camera color buffer.

use ssf_core::{RenderTargetHandle, Result, SsfUniforms, StorageId};

use crate::backend::{PassId, PassInputs, RenderBackend};

/// Self-blits the camera color through the lit program.
#[derive(Debug, Clone)]
pub struct LitStage {
    pass: PassId,
}

impl LitStage {
    pub fn new(pass: PassId) -> Self {
        Self { pass }
    }

    /// Shades covered pixels of `color` in place. `size` is the color buffer
    /// resolution.
    pub fn record<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        color: StorageId,
        size: (u32, u32),
        smoothed: &RenderTargetHandle,
        normals: &RenderTargetHandle,
        uniforms: &SsfUniforms,
    ) -> Result<()> {
        let inputs = PassInputs::new(uniforms.for_blit(size, size))
            .with_depth(smoothed.storage())
            .with_normals(normals.storage());
        backend.blit(color, color, self.pass, &inputs)
    }
}
