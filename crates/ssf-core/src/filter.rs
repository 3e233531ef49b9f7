//! Scene filtering for the depth capture stage.

use serde::{Deserialize, Serialize};

/// Upper bound of the render queue range accepted in settings.
pub const MAX_RENDER_QUEUE: i32 = 5000;

/// Bit mask over 32 scene layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    /// Matches no layer.
    pub const NOTHING: Self = Self(0);
    /// Matches every layer.
    pub const EVERYTHING: Self = Self(u32::MAX);

    /// Mask matching a single layer.
    pub fn from_layer(layer: u32) -> Self {
        if layer < 32 {
            Self(1 << layer)
        } else {
            Self::NOTHING
        }
    }

    /// Adds a layer to the mask.
    #[must_use]
    pub fn with_layer(self, layer: u32) -> Self {
        Self(self.0 | Self::from_layer(layer).0)
    }

    /// Whether `layer` is in the mask.
    pub fn contains(self, layer: u32) -> bool {
        layer < 32 && self.0 & (1 << layer) != 0
    }
}

/// Inclusive range of render queue values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderQueueRange {
    pub lower_bound: i32,
    pub upper_bound: i32,
}

impl RenderQueueRange {
    /// Every queue.
    pub const ALL: Self = Self {
        lower_bound: 0,
        upper_bound: MAX_RENDER_QUEUE,
    };
    /// Opaque geometry queues.
    pub const OPAQUE: Self = Self {
        lower_bound: 0,
        upper_bound: 2500,
    };
    /// Transparent geometry queues.
    pub const TRANSPARENT: Self = Self {
        lower_bound: 2501,
        upper_bound: MAX_RENDER_QUEUE,
    };

    pub fn new(lower_bound: i32, upper_bound: i32) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    /// Whether `queue` lies inside the range.
    pub fn contains(self, queue: i32) -> bool {
        (self.lower_bound..=self.upper_bound).contains(&queue)
    }
}

impl Default for RenderQueueRange {
    fn default() -> Self {
        Self::ALL
    }
}

/// Which scene primitives are eligible for depth capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterSettings {
    pub render_queue_range: RenderQueueRange,
    pub layer_mask: LayerMask,
}

impl FilterSettings {
    pub fn new(render_queue_range: RenderQueueRange, layer_mask: LayerMask) -> Self {
        Self {
            render_queue_range,
            layer_mask,
        }
    }

    /// Whether a primitive on `layer` in `render_queue` passes the filter.
    pub fn accepts(&self, layer: u32, render_queue: i32) -> bool {
        self.layer_mask.contains(layer) && self.render_queue_range.contains(render_queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_mask() {
        let mask = LayerMask::from_layer(3).with_layer(5);
        assert!(mask.contains(3));
        assert!(mask.contains(5));
        assert!(!mask.contains(4));
        assert!(!mask.contains(40));
        assert!(!LayerMask::NOTHING.contains(0));
        assert!(LayerMask::EVERYTHING.contains(31));
    }

    #[test]
    fn test_render_queue_range_is_inclusive() {
        let range = RenderQueueRange::new(2000, 3000);
        assert!(range.contains(2000));
        assert!(range.contains(3000));
        assert!(!range.contains(1999));
        assert!(!range.contains(3001));
        assert!(RenderQueueRange::OPAQUE.contains(2500));
        assert!(!RenderQueueRange::TRANSPARENT.contains(2500));
    }

    #[test]
    fn test_filter_requires_both() {
        let filter = FilterSettings::new(RenderQueueRange::OPAQUE, LayerMask::from_layer(4));
        assert!(filter.accepts(4, 2000));
        assert!(!filter.accepts(3, 2000));
        assert!(!filter.accepts(4, 3000));
    }

    #[test]
    fn test_layer_mask_serializes_as_integer() {
        let json = serde_json::to_string(&LayerMask(0b1010)).unwrap();
        assert_eq!(json, "10");
    }
}
