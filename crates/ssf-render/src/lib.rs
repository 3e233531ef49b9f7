//! Screen-space fluid rendering for ssf-rs.
//!
//! Particles are drawn as ray-traced sphere billboards into a height field,
//! smoothed by a down/up-sampling pyramid, turned into view-space normals and
//! composited over the camera color with toon lighting.
//!
//! The stages record commands against a [`RenderBackend`]. Two backends are
//! provided:
//! - [`GpuBackend`] runs the WGSL programs with wgpu
//! - [`SoftwareBackend`] runs the same programs on the CPU and supports
//!   failure injection for testing frame-drop paths
//!
//! ```no_run
//! use ssf_core::{
//!     BillboardBatch, BillboardInstance, CameraFrame, LayerMask, Mat4, PipelineConfig,
//!     TargetFormat, Vec3,
//! };
//! use ssf_render::{FrameOutcome, SoftwareBackend, SsfPipeline};
//!
//! let mut backend = SoftwareBackend::new();
//! let color = backend.create_image(320, 240, TargetFormat::Rgba8Unorm);
//! let config = PipelineConfig::default().with_layer_mask(LayerMask::EVERYTHING);
//! let mut pipeline = SsfPipeline::new(config, &backend)?;
//!
//! let camera = CameraFrame::new(
//!     Mat4::perspective_rh(1.0, 320.0 / 240.0, 0.1, 100.0),
//!     Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y),
//!     320,
//!     240,
//!     color,
//! );
//! let scene = [BillboardBatch::new("SsfBillboardSphereDepth", 0, 3000)
//!     .with_instances([BillboardInstance::new(Vec3::ZERO, 0.5)])];
//! if let FrameOutcome::Dropped { stage, error } = pipeline.render(&mut backend, &camera, &scene) {
//!     eprintln!("frame dropped at {stage:?}: {error}");
//! }
//! # Ok::<(), ssf_core::SsfError>(())
//! ```

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Pixel coordinates and sizes move between u32, i64 and f32 throughout
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
// wgpu descriptors are built with Default::default() for compilation options
#![allow(clippy::default_trait_access)]

pub mod backend;
pub mod blur_pass;
pub mod depth_pass;
pub mod error;
pub mod gpu;
pub mod lit_pass;
pub mod normal_pass;
pub mod pipeline;
pub mod software;

pub use backend::{
    BlitProgram, DrawRequest, DrawStats, EffectMaterial, PassId, PassInputs, RenderBackend,
};
pub use blur_pass::{
    level_descriptors, level_name, BlurPyramid, BlurStage, PyramidCursor, Slot,
    BLUR_TARGET_PREFIX,
};
pub use depth_pass::{DepthCaptureStage, DEPTH_TARGET, HEIGHT_SENTINEL};
pub use error::{RenderError, RenderResult};
pub use gpu::GpuBackend;
pub use lit_pass::LitStage;
pub use normal_pass::{NormalStage, NORMAL_TARGET};
pub use pipeline::{
    FrameOutcome, FrameStage, FrameStats, FrameTargets, SsfFrame, SsfPipeline, StageFailure,
};
pub use software::{Image, SoftwareBackend};
