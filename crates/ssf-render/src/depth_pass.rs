//! Depth capture of billboarded spheres into the height field.

use ssf_core::{
    gpu_projection_matrix, BillboardBatch, CameraFrame, FilterMode, FilterSettings,
    RenderTargetHandle, Result, TargetDescriptor, TargetFormat,
};

use crate::backend::{DrawRequest, DrawStats, RenderBackend};

/// Name of the captured height field target.
pub const DEPTH_TARGET: &str = "_SsfDepthTexture";

/// Height meaning "no surface". Equal to the far plane in reversed Z.
pub const HEIGHT_SENTINEL: f32 = 0.0;

/// Draws eligible billboards with their own depth program.
#[derive(Debug, Clone)]
pub struct DepthCaptureStage {
    tag: String,
    filter: FilterSettings,
}

impl DepthCaptureStage {
    pub fn new(tag: impl Into<String>, filter: FilterSettings) -> Self {
        Self {
            tag: tag.into(),
            filter,
        }
    }

    /// Shader tag a batch must carry to be captured.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn filter(&self) -> FilterSettings {
        self.filter
    }

    /// Descriptor of the full-resolution height field.
    pub fn descriptor(width: u32, height: u32, format: TargetFormat, samples: u32) -> TargetDescriptor {
        TargetDescriptor::new(width, height, format, FilterMode::Point).with_msaa_samples(samples)
    }

    /// Clears `target` to the sentinel and draws the eligible billboards.
    ///
    /// Draw order is left to the host; the capture keeps the nearest depth.
    pub fn record<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        target: &RenderTargetHandle,
        frame: &CameraFrame,
        scene: &[BillboardBatch],
    ) -> Result<DrawStats> {
        backend.clear(target.storage(), HEIGHT_SENTINEL)?;
        let request = DrawRequest {
            batches: scene,
            filter: self.filter,
            tag: &self.tag,
            view: frame.view_matrix(),
            projection: gpu_projection_matrix(frame.projection, backend.flips_y()),
            sort: frame.opaque_sort,
        };
        let stats = backend.draw_billboards(target.storage(), &request)?;
        log::debug!(
            "Ssf: captured {} instance(s) from {} batch(es) into '{}'",
            stats.instances,
            stats.batches,
            target.name()
        );
        Ok(stats)
    }
}
