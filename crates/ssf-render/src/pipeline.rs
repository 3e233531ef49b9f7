//! The screen-space fluid pipeline.
//!
//! A pipeline is built once from a [`PipelineConfig`] against a backend,
//! which resolves every pass up front. Each camera frame then runs
//! configure (acquire targets), execute (record the four stages) and
//! cleanup (release targets) in that order. [`SsfPipeline::render`] runs
//! all three and contains per-frame errors.

use ssf_core::{
    BillboardBatch, CameraFrame, FilterSettings, FrameScope, PipelineConfig, RenderPassEvent,
    RenderTargetHandle, RenderTargetPool, Result, SsfError, SsfUniforms, TargetDescriptor,
    TargetUsage,
};
use thiserror::Error;

use crate::backend::{PassId, RenderBackend};
use crate::blur_pass::{BlurPyramid, BlurStage};
use crate::depth_pass::{DepthCaptureStage, DEPTH_TARGET};
use crate::lit_pass::LitStage;
use crate::normal_pass::{NormalStage, NORMAL_TARGET};

/// Step of a frame, used to report where a frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStage {
    Configure,
    DepthCapture,
    Blur,
    NormalReconstruction,
    Lighting,
    Submit,
}

/// A frame-local failure and the stage it happened in.
#[derive(Error, Debug)]
#[error("{stage:?} stage failed: {error}")]
pub struct StageFailure {
    pub stage: FrameStage,
    #[source]
    pub error: SsfError,
}

impl StageFailure {
    fn at(stage: FrameStage) -> impl FnOnce(SsfError) -> Self {
        move |error| Self { stage, error }
    }
}

/// What a rendered frame did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Billboard batches that passed the filter.
    pub batches: usize,
    /// Billboard instances drawn.
    pub instances: usize,
    /// Commands recorded (clear and draw count as one capture pass).
    pub passes: usize,
    /// Descriptors of the acquired targets in acquisition order:
    /// height field, pyramid levels, normals.
    pub targets: Vec<TargetDescriptor>,
    /// Resolution of the smoothed height field.
    pub smoothed_resolution: (u32, u32),
    /// Targets released at cleanup.
    pub released: usize,
}

/// Result of [`SsfPipeline::render`].
#[derive(Debug)]
pub enum FrameOutcome {
    /// The overlay was composited.
    Rendered(FrameStats),
    /// The frame was dropped. The color buffer holds no partial overlay and
    /// every target was released.
    Dropped { stage: FrameStage, error: SsfError },
}

impl FrameOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    pub fn stats(&self) -> Option<&FrameStats> {
        match self {
            Self::Rendered(stats) => Some(stats),
            Self::Dropped { .. } => None,
        }
    }
}

/// Targets acquired for one frame.
#[derive(Debug, Clone)]
pub struct FrameTargets {
    pub depth: RenderTargetHandle,
    pub pyramid: BlurPyramid,
    pub normals: RenderTargetHandle,
}

impl FrameTargets {
    fn descriptors(&self) -> Vec<TargetDescriptor> {
        std::iter::once(&self.depth)
            .chain(self.pyramid.levels())
            .chain(std::iter::once(&self.normals))
            .map(|h| *h.descriptor())
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Stages {
    depth: DepthCaptureStage,
    blur: BlurStage,
    normal: NormalStage,
    lit: LitStage,
}

/// Screen-space fluid renderer for one camera.
#[derive(Debug)]
pub struct SsfPipeline {
    config: PipelineConfig,
    stages: Stages,
    pool: RenderTargetPool,
}

impl SsfPipeline {
    /// Builds a pipeline, resolving its passes and checking formats against `backend`.
    ///
    /// Every error returned here is a configuration error; the pipeline must
    /// not be scheduled.
    pub fn new<B: RenderBackend + ?Sized>(config: PipelineConfig, backend: &B) -> Result<Self> {
        config.validate()?;

        for (format, usage) in [
            (config.depth_format, TargetUsage::Height),
            (config.normal_format, TargetUsage::Normal),
        ] {
            if !backend.supports_format(format, usage) {
                return Err(SsfError::UnsupportedFormat { format, usage });
            }
        }
        if !backend.supports_msaa(config.msaa_samples) {
            return Err(SsfError::InvalidConfig(format!(
                "{} backend cannot render {} samples per pixel",
                backend.name(),
                config.msaa_samples
            )));
        }

        let resolve = |name: &str| -> Result<PassId> {
            backend
                .find_pass(name)
                .ok_or_else(|| SsfError::UnknownPass(name.to_string()))
        };
        let passes = &config.passes;
        let stages = Stages {
            depth: DepthCaptureStage::new(&passes.depth_tag, config.filter_settings()),
            blur: BlurStage::new(
                resolve(&passes.down_sampling)?,
                resolve(&passes.up_sampling)?,
                config.blur_iterations,
            ),
            normal: NormalStage::new(resolve(&passes.depth_normal)?),
            lit: LitStage::new(resolve(&passes.lit)?),
        };

        log::info!(
            "Ssf: pipeline built on {} backend ({} blur iteration(s), {:?} height, {:?} normals, {:?})",
            backend.name(),
            config.blur_iterations,
            config.depth_format,
            config.normal_format,
            config.reconstruction
        );

        Ok(Self {
            config,
            stages,
            pool: RenderTargetPool::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Where the pipeline runs within the camera's frame.
    pub fn event(&self) -> RenderPassEvent {
        self.config.event
    }

    pub fn filter_settings(&self) -> FilterSettings {
        self.stages.depth.filter()
    }

    /// The target pool, for inspecting statistics.
    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    /// Acquires this frame's targets, sized from the camera.
    ///
    /// Targets are released when the returned frame is cleaned up or
    /// dropped, including when this call fails halfway.
    pub fn configure<'a, B: RenderBackend + ?Sized>(
        &'a mut self,
        backend: &'a mut B,
        camera: &CameraFrame,
    ) -> Result<SsfFrame<'a, B>> {
        let Self {
            config,
            stages,
            pool,
        } = self;
        if camera.width == 0 || camera.height == 0 {
            return Err(SsfError::Render(format!(
                "camera target has zero size ({}x{})",
                camera.width, camera.height
            )));
        }

        let mut scope = pool.begin_frame(backend);
        let depth_desc = DepthCaptureStage::descriptor(
            camera.width,
            camera.height,
            config.depth_format,
            config.msaa_samples,
        );
        let depth = scope.acquire(DEPTH_TARGET, depth_desc)?;
        let pyramid = BlurPyramid::acquire(&mut scope, &depth_desc, config.blur_iterations)?;
        let normals = scope.acquire(
            NORMAL_TARGET,
            NormalStage::descriptor(camera.width, camera.height, config.normal_format),
        )?;

        let uniforms = SsfUniforms::new(config, camera, scope.allocator().flips_y());
        log::debug!(
            "Ssf: configured {}x{} frame with {} target(s)",
            camera.width,
            camera.height,
            scope.pool().outstanding()
        );

        Ok(SsfFrame {
            scope,
            stages,
            camera: *camera,
            uniforms,
            targets: FrameTargets {
                depth,
                pyramid,
                normals,
            },
            smoothed: None,
            executed: false,
            pending: false,
        })
    }

    /// Renders one camera frame: configure, execute, cleanup.
    ///
    /// Frame-local errors drop the frame instead of propagating.
    pub fn render<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        camera: &CameraFrame,
        scene: &[BillboardBatch],
    ) -> FrameOutcome {
        let mut frame = match self.configure(backend, camera) {
            Ok(frame) => frame,
            Err(error) => {
                log::warn!("Ssf: dropped frame while configuring targets: {error}");
                return FrameOutcome::Dropped {
                    stage: FrameStage::Configure,
                    error,
                };
            }
        };

        match frame.execute(scene) {
            Ok(mut stats) => {
                stats.released = frame.cleanup();
                FrameOutcome::Rendered(stats)
            }
            Err(StageFailure { stage, error }) => {
                let released = frame.cleanup();
                log::warn!(
                    "Ssf: dropped frame at {stage:?} stage: {error} (released {released} target(s))"
                );
                FrameOutcome::Dropped { stage, error }
            }
        }
    }
}

/// One camera frame between configure and cleanup.
///
/// Commands recorded by a failed [`SsfFrame::execute`] are discarded at
/// cleanup, so the camera color keeps its pre-frame contents. Dropping the
/// frame does the same as [`SsfFrame::cleanup`].
pub struct SsfFrame<'a, B: RenderBackend + ?Sized> {
    scope: FrameScope<'a, B>,
    stages: &'a Stages,
    camera: CameraFrame,
    uniforms: SsfUniforms,
    targets: FrameTargets,
    smoothed: Option<RenderTargetHandle>,
    executed: bool,
    /// Commands were recorded and not yet submitted.
    pending: bool,
}

impl<B: RenderBackend + ?Sized> SsfFrame<'_, B> {
    /// Records and submits the four stages in order.
    pub fn execute(&mut self, scene: &[BillboardBatch]) -> std::result::Result<FrameStats, StageFailure> {
        if self.executed {
            return Err(StageFailure {
                stage: FrameStage::DepthCapture,
                error: SsfError::Render("frame was already executed".into()),
            });
        }
        self.executed = true;
        self.pending = true;

        let stages = self.stages;
        let camera = self.camera;
        let uniforms = self.uniforms;
        let targets = &self.targets;
        let backend = self.scope.allocator_mut();

        let drawn = stages
            .depth
            .record(&mut *backend, &targets.depth, &camera, scene)
            .map_err(StageFailure::at(FrameStage::DepthCapture))?;

        let smoothed = stages
            .blur
            .record(&mut *backend, &targets.depth, &targets.pyramid, &uniforms)
            .map_err(StageFailure::at(FrameStage::Blur))?;

        stages
            .normal
            .record(&mut *backend, &smoothed, &targets.normals, &uniforms)
            .map_err(StageFailure::at(FrameStage::NormalReconstruction))?;

        stages
            .lit
            .record(
                &mut *backend,
                camera.color_target,
                (camera.width, camera.height),
                &smoothed,
                &targets.normals,
                &uniforms,
            )
            .map_err(StageFailure::at(FrameStage::Lighting))?;

        backend
            .submit()
            .map_err(StageFailure::at(FrameStage::Submit))?;
        self.pending = false;

        let stats = FrameStats {
            batches: drawn.batches,
            instances: drawn.instances,
            passes: 1 + stages.blur.blit_count() + 2,
            targets: targets.descriptors(),
            smoothed_resolution: smoothed.resolution(),
            released: 0,
        };
        self.smoothed = Some(smoothed);
        Ok(stats)
    }

    /// Drops recorded but unsubmitted commands.
    pub fn discard(&mut self) {
        self.scope.allocator_mut().discard();
        self.pending = false;
    }

    /// Whether commands were recorded and not yet submitted.
    pub fn has_pending_commands(&self) -> bool {
        self.pending
    }

    /// Discards unsubmitted commands and releases every target of the
    /// frame. Returns how many targets were released.
    pub fn cleanup(mut self) -> usize {
        self.discard_pending();
        self.scope.release_all()
    }

    fn discard_pending(&mut self) {
        if self.pending {
            log::debug!("Ssf: discarding commands of an unsubmitted frame");
            self.discard();
        }
    }

    pub fn targets(&self) -> &FrameTargets {
        &self.targets
    }

    /// The smoothed height field, once executed.
    pub fn smoothed_height(&self) -> Option<&RenderTargetHandle> {
        self.smoothed.as_ref()
    }

    pub fn uniforms(&self) -> &SsfUniforms {
        &self.uniforms
    }

    /// The backend, for reading targets before cleanup.
    pub fn backend(&self) -> &B {
        self.scope.allocator()
    }
}

impl<B: RenderBackend + ?Sized> Drop for SsfFrame<'_, B> {
    fn drop(&mut self) {
        // Runs before the scope releases the targets.
        self.discard_pending();
    }
}
