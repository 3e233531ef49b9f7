//! Core abstractions for ssf-rs.
//!
//! This crate provides the backend-independent pieces of the screen-space
//! fluid pipeline:
//! - [`PipelineConfig`] and [`LightingConfig`] with JSON loading and validation
//! - [`RenderTargetPool`] with a frame-scoped guaranteed release ([`FrameScope`])
//! - Frustum corner rays and reversed-Z projection helpers
//! - The billboard scene model and camera frame inputs
//! - The [`SsfUniforms`] block shared by every pass program

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Pixel sizes and counts are converted to f32 for texel math
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod frustum;
pub mod pool;
pub mod scene;
pub mod target;
pub mod uniforms;

pub use config::{
    LightingConfig, PassNames, PipelineConfig, ReconstructionMode, MAX_BLUR_ITERATIONS,
};
pub use error::{Result, SsfError};
pub use event::{PassQueue, RenderPassEvent};
pub use filter::{FilterSettings, LayerMask, RenderQueueRange, MAX_RENDER_QUEUE};
pub use frustum::{
    clip_to_view_matrix, gpu_projection_matrix, reconstruct_view_position, uv_to_ndc,
    CornerOrder, FrustumCorners, ZBufferParams,
};
pub use pool::{FrameScope, PoolStats, RenderTargetPool, TargetAllocator};
pub use scene::{
    BillboardBatch, BillboardInstance, CameraFrame, DirectionalLight, SortCriteria,
};
pub use target::{
    next_level_descriptor, FilterMode, RenderTargetHandle, StorageId, TargetDescriptor,
    TargetFormat, TargetId, TargetUsage,
};
pub use uniforms::SsfUniforms;

// Re-export glam types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};
