//! Injection points of custom passes within a camera's frame.

use serde::{Deserialize, Serialize};

/// Where in the frame a pass is inserted, relative to built-in stages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum RenderPassEvent {
    BeforeRendering,
    BeforeRenderingShadows,
    AfterRenderingShadows,
    BeforeRenderingPrePasses,
    AfterRenderingPrePasses,
    BeforeRenderingOpaques,
    AfterRenderingOpaques,
    BeforeRenderingSkybox,
    AfterRenderingSkybox,
    #[default]
    BeforeRenderingTransparents,
    AfterRenderingTransparents,
    BeforeRenderingPostProcessing,
    AfterRenderingPostProcessing,
    AfterRendering,
}

impl RenderPassEvent {
    /// Numeric ordinal, spaced so hosts can slot passes in between.
    #[must_use]
    pub fn ordinal(self) -> u32 {
        match self {
            RenderPassEvent::BeforeRendering => 0,
            RenderPassEvent::BeforeRenderingShadows => 50,
            RenderPassEvent::AfterRenderingShadows => 100,
            RenderPassEvent::BeforeRenderingPrePasses => 150,
            RenderPassEvent::AfterRenderingPrePasses => 200,
            RenderPassEvent::BeforeRenderingOpaques => 250,
            RenderPassEvent::AfterRenderingOpaques => 300,
            RenderPassEvent::BeforeRenderingSkybox => 350,
            RenderPassEvent::AfterRenderingSkybox => 400,
            RenderPassEvent::BeforeRenderingTransparents => 450,
            RenderPassEvent::AfterRenderingTransparents => 500,
            RenderPassEvent::BeforeRenderingPostProcessing => 550,
            RenderPassEvent::AfterRenderingPostProcessing => 600,
            RenderPassEvent::AfterRendering => 1000,
        }
    }
}

/// Per-camera queue of passes, executed in event order.
///
/// Passes enqueued at the same event keep their insertion order.
#[derive(Debug, Clone)]
pub struct PassQueue<T> {
    entries: Vec<(RenderPassEvent, T)>,
}

impl<T> PassQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a pass at `event`.
    pub fn enqueue(&mut self, event: RenderPassEvent, pass: T) {
        self.entries.push((event, pass));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains the queue in execution order.
    pub fn drain_ordered(&mut self) -> impl Iterator<Item = (RenderPassEvent, T)> + '_ {
        self.entries.sort_by_key(|(event, _)| event.ordinal());
        self.entries.drain(..)
    }
}

impl<T> Default for PassQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
