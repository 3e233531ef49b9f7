//! Command-recording interface implemented by the render backends.
//!
//! The stages never touch images directly. They record clears, billboard
//! draws and full-screen blits against [`StorageId`]s handed out by the
//! target pool, and the backend executes them in submission order.

use glam::Mat4;

use ssf_core::{
    BillboardBatch, FilterSettings, PassNames, Result, SortCriteria, SsfUniforms, StorageId,
    TargetAllocator, TargetFormat, TargetUsage,
};

/// Index of a pass in an [`EffectMaterial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(pub usize);

/// Full-screen programs a pass can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlitProgram {
    /// Half-resolution bilinear downsample of the height field.
    DownSample,
    /// Bilinear upsample of a coarser height level.
    UpSample,
    /// Height field to packed view-space normals.
    DepthNormal,
    /// Lighting and composite over the camera color.
    Lit,
}

/// A named collection of blit programs, looked up by pass name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectMaterial {
    name: String,
    passes: Vec<(String, BlitProgram)>,
}

impl EffectMaterial {
    /// Creates a material without passes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passes: Vec::new(),
        }
    }

    /// Creates the material exposing all four programs under `names`.
    pub fn from_pass_names(names: &PassNames) -> Self {
        Self::new("Ssf")
            .with_pass(&names.down_sampling, BlitProgram::DownSample)
            .with_pass(&names.up_sampling, BlitProgram::UpSample)
            .with_pass(&names.depth_normal, BlitProgram::DepthNormal)
            .with_pass(&names.lit, BlitProgram::Lit)
    }

    /// Adds a pass, replacing any pass with the same name.
    #[must_use]
    pub fn with_pass(mut self, name: &str, program: BlitProgram) -> Self {
        self.passes.retain(|(n, _)| n != name);
        self.passes.push((name.to_string(), program));
        self
    }

    /// Removes a pass.
    #[must_use]
    pub fn without_pass(mut self, name: &str) -> Self {
        self.passes.retain(|(n, _)| n != name);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn find_pass(&self, name: &str) -> Option<PassId> {
        self.passes.iter().position(|(n, _)| n == name).map(PassId)
    }

    pub fn program(&self, pass: PassId) -> Option<BlitProgram> {
        self.passes.get(pass.0).map(|(_, p)| *p)
    }

    pub fn pass_name(&self, pass: PassId) -> Option<&str> {
        self.passes.get(pass.0).map(|(n, _)| n.as_str())
    }
}

impl Default for EffectMaterial {
    fn default() -> Self {
        Self::from_pass_names(&PassNames::default())
    }
}

/// Everything a backend needs to draw the eligible billboards.
#[derive(Debug, Clone, Copy)]
pub struct DrawRequest<'a> {
    pub batches: &'a [BillboardBatch],
    pub filter: FilterSettings,
    /// Shader tag a batch must carry to be drawn.
    pub tag: &'a str,
    /// World-to-view matrix.
    pub view: Mat4,
    /// GPU-adjusted (reversed-Z) projection.
    pub projection: Mat4,
    /// Host sort order. Backends draw in submission order; results do not
    /// depend on it because depth resolves to the nearest sample.
    pub sort: SortCriteria,
}

impl DrawRequest<'_> {
    /// Batches passing the filter and carrying the tag.
    pub fn eligible(&self) -> impl Iterator<Item = &BillboardBatch> + '_ {
        self.batches
            .iter()
            .filter(move |b| b.is_eligible(&self.filter, self.tag))
    }
}

/// What a depth capture drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub batches: usize,
    pub instances: usize,
}

/// Auxiliary inputs bound to a blit alongside its source.
#[derive(Debug, Clone, Copy)]
pub struct PassInputs {
    /// Smoothed height field.
    pub depth: Option<StorageId>,
    /// Packed normals.
    pub normals: Option<StorageId>,
    pub uniforms: SsfUniforms,
}

impl PassInputs {
    pub fn new(uniforms: SsfUniforms) -> Self {
        Self {
            depth: None,
            normals: None,
            uniforms,
        }
    }

    #[must_use]
    pub fn with_depth(mut self, depth: StorageId) -> Self {
        self.depth = Some(depth);
        self
    }

    #[must_use]
    pub fn with_normals(mut self, normals: StorageId) -> Self {
        self.normals = Some(normals);
        self
    }
}

/// A device that owns image storage and executes pass commands.
pub trait RenderBackend: TargetAllocator {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Resolves a pass of the effect material by name.
    fn find_pass(&self, name: &str) -> Option<PassId>;

    /// Whether targets of `format` can be rendered to for `usage`.
    fn supports_format(&self, format: TargetFormat, usage: TargetUsage) -> bool;

    /// Whether scratch targets may use `samples` samples per pixel.
    fn supports_msaa(&self, samples: u32) -> bool;

    /// Whether render textures have a bottom-left origin and need a Y flip.
    fn flips_y(&self) -> bool {
        false
    }

    /// Fills every channel of `target` with `value`.
    fn clear(&mut self, target: StorageId, value: f32) -> Result<()>;

    /// Draws the eligible billboards' sphere depth into `target`.
    fn draw_billboards(&mut self, target: StorageId, request: &DrawRequest<'_>) -> Result<DrawStats>;

    /// Runs `pass` as a full-screen blit from `source` into `destination`.
    ///
    /// `source` and `destination` may be the same storage (self-blit).
    fn blit(
        &mut self,
        source: StorageId,
        destination: StorageId,
        pass: PassId,
        inputs: &PassInputs,
    ) -> Result<()>;

    /// Submits recorded commands.
    fn submit(&mut self) -> Result<()>;

    /// Drops commands recorded since the last submit.
    fn discard(&mut self) {}
}
