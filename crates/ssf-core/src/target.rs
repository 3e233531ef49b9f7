//! Scratch render target descriptions and handles.

use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Pixel format of a scratch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TargetFormat {
    /// Single-channel half float (RHalf).
    R16Float,
    /// Single-channel full float (RFloat).
    #[default]
    R32Float,
    /// Four 8-bit normalized channels (ARGB32).
    Rgba8Unorm,
    /// Four half-float channels.
    Rgba16Float,
}

impl TargetFormat {
    /// Number of channels stored per pixel.
    #[must_use]
    pub fn channels(self) -> u32 {
        match self {
            TargetFormat::R16Float | TargetFormat::R32Float => 1,
            TargetFormat::Rgba8Unorm | TargetFormat::Rgba16Float => 4,
        }
    }

    /// Bits stored per channel.
    #[must_use]
    pub fn bits_per_channel(self) -> u32 {
        match self {
            TargetFormat::Rgba8Unorm => 8,
            TargetFormat::R16Float | TargetFormat::Rgba16Float => 16,
            TargetFormat::R32Float => 32,
        }
    }

    /// Bytes per pixel.
    #[must_use]
    pub fn bytes_per_pixel(self) -> u32 {
        self.channels() * self.bits_per_channel() / 8
    }

    /// Whether channels are stored as floating point.
    #[must_use]
    pub fn is_float(self) -> bool {
        !matches!(self, TargetFormat::Rgba8Unorm)
    }

    /// Whether the format can hold a height field.
    #[must_use]
    pub fn is_height_format(self) -> bool {
        self.channels() == 1 && self.is_float()
    }

    /// Whether the format can hold packed normals (three channels, at least 8 bits).
    #[must_use]
    pub fn is_normal_format(self) -> bool {
        self.channels() >= 3 && self.bits_per_channel() >= 8
    }
}

/// What a target is used for; backends may support a format for one use only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetUsage {
    /// Height field written by depth capture and the blur pyramid.
    Height,
    /// Packed surface normals.
    Normal,
}

/// Sampler filtering used when a target is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel.
    #[default]
    Point,
    /// Hardware bilinear filtering.
    Bilinear,
}

/// Full description of a scratch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TargetFormat,
    pub msaa_samples: u32,
    pub filter: FilterMode,
}

impl TargetDescriptor {
    /// Creates a single-sample descriptor.
    #[must_use]
    pub fn new(width: u32, height: u32, format: TargetFormat, filter: FilterMode) -> Self {
        Self {
            width,
            height,
            format,
            msaa_samples: 1,
            filter,
        }
    }

    /// Sets the multisample count.
    #[must_use]
    pub fn with_msaa_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples.max(1);
        self
    }

    /// Sets the filter mode.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    /// Number of pixels.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Approximate storage footprint in bytes.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.pixel_count() as u64
            * u64::from(self.format.bytes_per_pixel())
            * u64::from(self.msaa_samples)
    }
}

/// Returns the descriptor for the next, half-resolution blur level.
///
/// Sizes use integer division and never drop below one pixel.
#[must_use]
pub fn next_level_descriptor(prev: &TargetDescriptor) -> TargetDescriptor {
    TargetDescriptor {
        width: (prev.width / 2).max(1),
        height: (prev.height / 2).max(1),
        ..*prev
    }
}

/// Identifies backend image storage (a texture, an in-memory image, the camera color buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId(pub u64);

/// Stable identifier of a named target, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    /// Derives the identifier for a target name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// A named scratch target acquired from the pool for one frame.
///
/// This is a lightweight value; the image itself lives in the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetHandle {
    name: String,
    id: TargetId,
    descriptor: TargetDescriptor,
    storage: StorageId,
}

impl RenderTargetHandle {
    pub(crate) fn new(name: &str, descriptor: TargetDescriptor, storage: StorageId) -> Self {
        Self {
            name: name.to_string(),
            id: TargetId::from_name(name),
            descriptor,
            storage,
        }
    }

    /// Target name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> TargetId {
        self.id
    }

    /// Descriptor the target was acquired with.
    #[must_use]
    pub fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    /// Backend storage backing this target.
    #[must_use]
    pub fn storage(&self) -> StorageId {
        self.storage
    }

    /// Current resolution.
    #[must_use]
    pub fn resolution(&self) -> (u32, u32) {
        (self.descriptor.width, self.descriptor.height)
    }
}
