//! Pipeline configuration.
//!
//! Settings are fixed when a pipeline is built. Only camera-dependent values
//! (matrices, frustum corners, resolution) change from frame to frame.

use std::path::Path;

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SsfError};
use crate::event::RenderPassEvent;
use crate::filter::{FilterSettings, LayerMask, RenderQueueRange, MAX_RENDER_QUEUE};
use crate::target::TargetFormat;

/// Largest supported blur iteration count.
pub const MAX_BLUR_ITERATIONS: u32 = 16;

/// How normals are rebuilt from the smoothed height field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReconstructionMode {
    /// Unproject every pixel through the inverse GPU projection.
    #[default]
    Matrix,
    /// Scale interpolated far-plane corner rays by linear depth.
    FrustumRay,
}

/// Names of the programs the pipeline resolves from its effect material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassNames {
    /// Shader tag selecting each billboard's own depth program.
    pub depth_tag: String,
    pub down_sampling: String,
    pub up_sampling: String,
    pub depth_normal: String,
    pub lit: String,
}

impl Default for PassNames {
    fn default() -> Self {
        Self {
            depth_tag: "SsfBillboardSphereDepth".to_string(),
            down_sampling: "DownSampling".to_string(),
            up_sampling: "UpSampling".to_string(),
            depth_normal: "DepthNormal".to_string(),
            lit: "SsfLit".to_string(),
        }
    }
}

/// Surface shading parameters used by the lighting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// RGB multiplies the refracted background; alpha is the blend weight.
    pub tint: Vec4,
    pub ambient_color: Vec4,
    pub specular_color: Vec4,
    pub glossiness: f32,
    /// Rim cutoff (0..=1).
    pub rim_amount: f32,
    /// How far the rim extends into the lit side (0..=1).
    pub rim_threshold: f32,
    /// Heights at or below this value carry no surface (0..=1).
    pub depth_threshold: f32,
    /// Multiplier on depth differences in edge detection (0..=20).
    pub depth_scale_factor: u32,
    /// Background offset in pixels per unit of normal XY.
    pub distortion_strength: f32,
    pub edge_color: Vec4,
    /// Edge sampling distance in pixels.
    pub edge_scale_factor: u32,
    pub edge_depth_threshold: f32,
    pub edge_normal_threshold: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            tint: Vec4::ONE,
            ambient_color: Vec4::ONE,
            specular_color: Vec4::ONE,
            glossiness: 2.0,
            rim_amount: 0.7,
            rim_threshold: 0.1,
            depth_threshold: 0.001,
            depth_scale_factor: 1,
            distortion_strength: 1.0,
            edge_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            edge_scale_factor: 2,
            edge_depth_threshold: 0.2,
            edge_normal_threshold: 0.2,
        }
    }
}

impl LightingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tint(mut self, tint: Vec4) -> Self {
        self.tint = tint;
        self
    }

    pub fn with_ambient_color(mut self, color: Vec4) -> Self {
        self.ambient_color = color;
        self
    }

    pub fn with_specular_color(mut self, color: Vec4) -> Self {
        self.specular_color = color;
        self
    }

    pub fn with_glossiness(mut self, glossiness: f32) -> Self {
        self.glossiness = glossiness;
        self
    }

    pub fn with_rim(mut self, amount: f32, threshold: f32) -> Self {
        self.rim_amount = amount;
        self.rim_threshold = threshold;
        self
    }

    pub fn with_depth_threshold(mut self, threshold: f32) -> Self {
        self.depth_threshold = threshold;
        self
    }

    pub fn with_distortion_strength(mut self, strength: f32) -> Self {
        self.distortion_strength = strength;
        self
    }

    /// Sets the edge color and thresholds.
    pub fn with_edges(mut self, color: Vec4, depth_threshold: f32, normal_threshold: f32) -> Self {
        self.edge_color = color;
        self.edge_depth_threshold = depth_threshold;
        self.edge_normal_threshold = normal_threshold;
        self
    }

    fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(SsfError::InvalidConfig(format!("{name} must be in 0..=1, got {v}")))
            }
        };
        unit("rim_amount", self.rim_amount)?;
        unit("rim_threshold", self.rim_threshold)?;
        unit("depth_threshold", self.depth_threshold)?;
        unit("edge_depth_threshold", self.edge_depth_threshold)?;
        unit("edge_normal_threshold", self.edge_normal_threshold)?;

        if !(self.glossiness > 0.0 && self.glossiness.is_finite()) {
            return Err(SsfError::InvalidConfig(format!(
                "glossiness must be positive, got {}",
                self.glossiness
            )));
        }
        if self.depth_scale_factor > 20 {
            return Err(SsfError::InvalidConfig(format!(
                "depth_scale_factor must be in 0..=20, got {}",
                self.depth_scale_factor
            )));
        }
        if !self.distortion_strength.is_finite() {
            return Err(SsfError::InvalidConfig(
                "distortion_strength must be finite".into(),
            ));
        }
        for (name, color) in [
            ("tint", self.tint),
            ("ambient_color", self.ambient_color),
            ("specular_color", self.specular_color),
            ("edge_color", self.edge_color),
        ] {
            if !color.is_finite() || color.min_element() < 0.0 {
                return Err(SsfError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {color}"
                )));
            }
        }
        Ok(())
    }
}

/// Immutable settings of one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where the pipeline inserts itself in the camera's frame.
    pub event: RenderPassEvent,
    pub layer_mask: LayerMask,
    pub render_queue_lower_bound: i32,
    pub render_queue_upper_bound: i32,
    /// Number of half-resolution blur levels (0 disables blurring).
    pub blur_iterations: u32,
    pub depth_format: TargetFormat,
    pub normal_format: TargetFormat,
    pub msaa_samples: u32,
    pub reconstruction: ReconstructionMode,
    pub passes: PassNames,
    pub lighting: LightingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            event: RenderPassEvent::BeforeRenderingTransparents,
            layer_mask: LayerMask::NOTHING,
            render_queue_lower_bound: 0,
            render_queue_upper_bound: MAX_RENDER_QUEUE,
            blur_iterations: 1,
            depth_format: TargetFormat::R32Float,
            normal_format: TargetFormat::Rgba8Unorm,
            msaa_samples: 1,
            reconstruction: ReconstructionMode::Matrix,
            passes: PassNames::default(),
            lighting: LightingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, event: RenderPassEvent) -> Self {
        self.event = event;
        self
    }

    pub fn with_layer_mask(mut self, mask: LayerMask) -> Self {
        self.layer_mask = mask;
        self
    }

    pub fn with_render_queue(mut self, lower_bound: i32, upper_bound: i32) -> Self {
        self.render_queue_lower_bound = lower_bound;
        self.render_queue_upper_bound = upper_bound;
        self
    }

    pub fn with_blur_iterations(mut self, iterations: u32) -> Self {
        self.blur_iterations = iterations;
        self
    }

    pub fn with_depth_format(mut self, format: TargetFormat) -> Self {
        self.depth_format = format;
        self
    }

    pub fn with_normal_format(mut self, format: TargetFormat) -> Self {
        self.normal_format = format;
        self
    }

    pub fn with_msaa_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples;
        self
    }

    pub fn with_reconstruction(mut self, mode: ReconstructionMode) -> Self {
        self.reconstruction = mode;
        self
    }

    pub fn with_lighting(mut self, lighting: LightingConfig) -> Self {
        self.lighting = lighting;
        self
    }

    /// Filter derived from the layer mask and render queue bounds.
    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings::new(
            RenderQueueRange::new(self.render_queue_lower_bound, self.render_queue_upper_bound),
            self.layer_mask,
        )
    }

    /// Checks every setting against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.blur_iterations > MAX_BLUR_ITERATIONS {
            return Err(SsfError::InvalidConfig(format!(
                "blur_iterations must be in 0..={MAX_BLUR_ITERATIONS}, got {}",
                self.blur_iterations
            )));
        }
        let queue = 0..=MAX_RENDER_QUEUE;
        if !queue.contains(&self.render_queue_lower_bound)
            || !queue.contains(&self.render_queue_upper_bound)
        {
            return Err(SsfError::InvalidConfig(format!(
                "render queue bounds must be in 0..={MAX_RENDER_QUEUE}"
            )));
        }
        if self.render_queue_lower_bound > self.render_queue_upper_bound {
            return Err(SsfError::InvalidConfig(format!(
                "render queue lower bound {} exceeds upper bound {}",
                self.render_queue_lower_bound, self.render_queue_upper_bound
            )));
        }
        if !matches!(self.msaa_samples, 1 | 2 | 4 | 8) {
            return Err(SsfError::InvalidConfig(format!(
                "msaa_samples must be 1, 2, 4 or 8, got {}",
                self.msaa_samples
            )));
        }
        if !self.depth_format.is_height_format() {
            return Err(SsfError::InvalidConfig(format!(
                "depth_format {:?} is not a single-channel float format",
                self.depth_format
            )));
        }
        if !self.normal_format.is_normal_format() {
            return Err(SsfError::InvalidConfig(format!(
                "normal_format {:?} cannot hold three normal components",
                self.normal_format
            )));
        }
        let passes = &self.passes;
        for (field, name) in [
            ("depth_tag", &passes.depth_tag),
            ("down_sampling", &passes.down_sampling),
            ("up_sampling", &passes.up_sampling),
            ("depth_normal", &passes.depth_normal),
            ("lit", &passes.lit),
        ] {
            if name.is_empty() {
                return Err(SsfError::InvalidConfig(format!("pass name {field} is empty")));
            }
        }
        self.lighting.validate()
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
