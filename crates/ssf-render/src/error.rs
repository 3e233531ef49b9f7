//! Rendering error types.

use ssf_core::{SsfError, StorageId};
use thiserror::Error;

/// Errors raised by the render backends.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// A command referenced storage the backend does not own.
    #[error("no storage with id {0:?}")]
    UnknownStorage(StorageId),

    /// Uploaded pixel data does not match the target size.
    #[error("pixel data has {actual} values, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A pass id that is not part of the effect material.
    #[error("pass {0} is not part of the effect material")]
    UnknownPass(usize),

    /// Reading a target back to the CPU failed.
    #[error("failed to read back target")]
    ReadbackFailed,

    /// Out of memory.
    #[error("out of memory")]
    OutOfMemory,

    /// A command could not be executed.
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

impl From<RenderError> for SsfError {
    fn from(err: RenderError) -> Self {
        SsfError::Render(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_is_frame_local() {
        let err: SsfError = RenderError::UnknownStorage(StorageId(7)).into();
        assert!(err.is_frame_local());
        assert!(err.to_string().contains("StorageId(7)"));
    }
}
