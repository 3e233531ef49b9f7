//! Per-frame inputs supplied by the host renderer.

use glam::{Mat4, Vec3};

use crate::filter::FilterSettings;
use crate::target::StorageId;

/// One billboarded sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BillboardInstance {
    /// Sphere center in world space.
    pub center: Vec3,
    /// Sphere radius in world units.
    pub radius: f32,
}

impl BillboardInstance {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// A renderer drawing many billboards with one material.
#[derive(Debug, Clone, PartialEq)]
pub struct BillboardBatch {
    /// Shader tags the batch's material provides programs for.
    pub tags: Vec<String>,
    /// Scene layer (0..32).
    pub layer: u32,
    /// Render queue of the batch's material.
    pub render_queue: i32,
    pub instances: Vec<BillboardInstance>,
}

impl BillboardBatch {
    /// Creates a batch carrying a single shader tag.
    pub fn new(tag: impl Into<String>, layer: u32, render_queue: i32) -> Self {
        Self {
            tags: vec![tag.into()],
            layer,
            render_queue,
            instances: Vec::new(),
        }
    }

    /// Appends instances.
    #[must_use]
    pub fn with_instances(mut self, instances: impl IntoIterator<Item = BillboardInstance>) -> Self {
        self.instances.extend(instances);
        self
    }

    /// Whether the batch's material has a program for `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether the batch is drawn by a depth capture with this filter and tag.
    pub fn is_eligible(&self, filter: &FilterSettings, tag: &str) -> bool {
        filter.accepts(self.layer, self.render_queue) && self.has_tag(tag)
    }
}

/// Draw ordering preferred by the host for opaque geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortCriteria {
    /// Keep submission order.
    None,
    /// Nearest batches first.
    #[default]
    FrontToBack,
    /// Group by material state.
    StateMinimizing,
}

/// The main directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// World-space direction from the surface toward the light.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.3, 1.0, 0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Camera data for one frame. Recomputed by the host every frame.
#[derive(Debug, Clone, Copy)]
pub struct CameraFrame {
    /// Right-handed projection with `[0, 1]` depth.
    pub projection: Mat4,
    /// Camera-to-world transform (inverse of the view matrix).
    pub camera_to_world: Mat4,
    pub width: u32,
    pub height: u32,
    /// Color buffer the lighting stage composites into.
    pub color_target: StorageId,
    pub main_light: DirectionalLight,
    pub opaque_sort: SortCriteria,
}

impl CameraFrame {
    /// Creates a frame from view and projection matrices.
    pub fn new(
        projection: Mat4,
        view: Mat4,
        width: u32,
        height: u32,
        color_target: StorageId,
    ) -> Self {
        Self {
            projection,
            camera_to_world: view.inverse(),
            width,
            height,
            color_target,
            main_light: DirectionalLight::default(),
            opaque_sort: SortCriteria::default(),
        }
    }

    /// Sets the main light.
    #[must_use]
    pub fn with_light(mut self, light: DirectionalLight) -> Self {
        self.main_light = light;
        self
    }

    /// World-to-camera (view) matrix.
    pub fn view_matrix(&self) -> Mat4 {
        self.camera_to_world.inverse()
    }

    /// World-space camera position.
    pub fn position(&self) -> Vec3 {
        self.camera_to_world.w_axis.truncate()
    }
}
