//! Down/up-sampling blur pyramid over the height field.
//!
//! Downsampling runs from the capture into level 0, then level 0 into
//! level 1, and so on, halving the resolution each step. Upsampling walks
//! back from the coarsest level into level 0. Which image holds the result
//! is tracked by a [`PyramidCursor`] rather than assumed.

use ssf_core::{
    next_level_descriptor, FilterMode, FrameScope, RenderTargetHandle, Result, SsfError,
    SsfUniforms, TargetAllocator, TargetDescriptor,
};

use crate::backend::{PassId, PassInputs, RenderBackend};

/// Prefix of the pyramid level target names.
pub const BLUR_TARGET_PREFIX: &str = "_BlurTemp";

/// Name of pyramid level `index`.
pub fn level_name(index: usize) -> String {
    format!("{BLUR_TARGET_PREFIX}{index}")
}

/// Descriptors of every level for a capture described by `base`.
///
/// Level `i` is `base / 2^(i+1)`. Levels are single-sample and bilinear.
pub fn level_descriptors(base: &TargetDescriptor, iterations: u32) -> Vec<TargetDescriptor> {
    let mut prev = base.with_msaa_samples(1).with_filter(FilterMode::Bilinear);
    (0..iterations)
        .map(|_| {
            prev = next_level_descriptor(&prev);
            prev
        })
        .collect()
}

/// The acquired pyramid levels of one frame, finest first.
#[derive(Debug, Clone, Default)]
pub struct BlurPyramid {
    levels: Vec<RenderTargetHandle>,
}

impl BlurPyramid {
    /// Acquires every level up front.
    pub fn acquire<A: TargetAllocator + ?Sized>(
        scope: &mut FrameScope<'_, A>,
        base: &TargetDescriptor,
        iterations: u32,
    ) -> Result<Self> {
        let levels = level_descriptors(base, iterations)
            .into_iter()
            .enumerate()
            .map(|(i, desc)| scope.acquire(&level_name(i), desc))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[RenderTargetHandle] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    fn level(&self, index: usize) -> Result<&RenderTargetHandle> {
        self.levels
            .get(index)
            .ok_or_else(|| SsfError::UnknownTarget(level_name(index)))
    }
}

/// An image the pyramid reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The raw capture.
    Capture,
    /// A pyramid level.
    Level(usize),
}

/// Current source and destination of the pyramid walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyramidCursor {
    source: Slot,
    destination: Slot,
}

impl PyramidCursor {
    /// Starts reading from the capture.
    pub fn new() -> Self {
        Self {
            source: Slot::Capture,
            destination: Slot::Capture,
        }
    }

    /// Targets `destination` and returns the `(source, destination)` pair for
    /// the blit. The destination becomes the next source.
    pub fn step(&mut self, destination: Slot) -> (Slot, Slot) {
        self.destination = destination;
        let pair = (self.source, self.destination);
        self.source = self.destination;
        pair
    }

    /// The image holding the latest result.
    pub fn current(&self) -> Slot {
        self.source
    }
}

impl Default for PyramidCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the pyramid's down- and up-sampling blits.
#[derive(Debug, Clone)]
pub struct BlurStage {
    down: PassId,
    up: PassId,
    iterations: u32,
}

impl BlurStage {
    pub fn new(down: PassId, up: PassId, iterations: u32) -> Self {
        Self {
            down,
            up,
            iterations,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Number of blits recorded per frame.
    pub fn blit_count(&self) -> usize {
        let k = self.iterations as usize;
        k + k.saturating_sub(1)
    }

    /// Blurs `capture` and returns the handle holding the smoothed field.
    ///
    /// With zero iterations nothing is recorded and the capture itself is
    /// returned.
    pub fn record<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        capture: &RenderTargetHandle,
        pyramid: &BlurPyramid,
        uniforms: &SsfUniforms,
    ) -> Result<RenderTargetHandle> {
        let resolve = |slot: Slot| match slot {
            Slot::Capture => Ok(capture),
            Slot::Level(i) => pyramid.level(i),
        };
        let blit = |backend: &mut B, pass: PassId, (src, dst): (Slot, Slot)| -> Result<()> {
            let src = resolve(src)?;
            let dst = resolve(dst)?;
            let inputs = PassInputs::new(uniforms.for_blit(src.resolution(), dst.resolution()));
            backend.blit(src.storage(), dst.storage(), pass, &inputs)
        };

        let k = self.iterations as usize;
        let mut cursor = PyramidCursor::new();
        for i in 0..k {
            blit(backend, self.down, cursor.step(Slot::Level(i)))?;
        }
        for i in (0..k.saturating_sub(1)).rev() {
            blit(backend, self.up, cursor.step(Slot::Level(i)))?;
        }

        let result = resolve(cursor.current())?;
        log::debug!(
            "Ssf: blur with {k} iteration(s) left the smoothed field in '{}' at {:?}",
            result.name(),
            result.resolution()
        );
        Ok(result.clone())
    }
}
