//! Normal reconstruction from the smoothed height field.

use ssf_core::{
    FilterMode, RenderTargetHandle, Result, SsfUniforms, TargetDescriptor, TargetFormat,
};

use crate::backend::{PassId, PassInputs, RenderBackend};

/// Name of the packed normal target.
pub const NORMAL_TARGET: &str = "_SsfNormalTexture";

/// Rebuilds view-space normals at capture resolution.
#[derive(Debug, Clone)]
pub struct NormalStage {
    pass: PassId,
}

impl NormalStage {
    pub fn new(pass: PassId) -> Self {
        Self { pass }
    }

    pub fn descriptor(width: u32, height: u32, format: TargetFormat) -> TargetDescriptor {
        TargetDescriptor::new(width, height, format, FilterMode::Point)
    }

    /// Resamples `smoothed` into `normals` and writes packed normals.
    pub fn record<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        smoothed: &RenderTargetHandle,
        normals: &RenderTargetHandle,
        uniforms: &SsfUniforms,
    ) -> Result<()> {
        let inputs = PassInputs::new(uniforms.for_blit(smoothed.resolution(), normals.resolution()))
            .with_depth(smoothed.storage());
        backend.blit(smoothed.storage(), normals.storage(), self.pass, &inputs)
    }
}
