//! Error types for ssf-rs.

use thiserror::Error;

use crate::target::{TargetFormat, TargetUsage};

/// The main error type for ssf-rs operations.
#[derive(Error, Debug)]
pub enum SsfError {
    /// A named pass could not be resolved from the effect material.
    #[error("effect material has no pass named '{0}'")]
    UnknownPass(String),

    /// The active backend cannot back a target with the requested format.
    #[error("format {format:?} is not supported as a {usage:?} target")]
    UnsupportedFormat {
        format: TargetFormat,
        usage: TargetUsage,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to parse a configuration document.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Target storage could not be allocated.
    #[error("cannot allocate target '{name}' ({width}x{height} {format:?})")]
    ResourceExhausted {
        name: String,
        width: u32,
        height: u32,
        format: TargetFormat,
    },

    /// A handle that was never acquired in this frame.
    #[error("target '{0}' was not acquired in this frame")]
    UnknownTarget(String),

    /// A handle that has already been released.
    #[error("target '{0}' has already been released")]
    ReleasedTarget(String),

    /// A backend failed while recording or executing a command.
    #[error("render error: {0}")]
    Render(String),
}

impl SsfError {
    /// Returns true for errors that must stop a pipeline from being scheduled.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownPass(_)
                | Self::UnsupportedFormat { .. }
                | Self::InvalidConfig(_)
                | Self::ConfigParse(_)
                | Self::Io(_)
        )
    }

    /// Returns true for errors that only invalidate the current frame.
    pub fn is_frame_local(&self) -> bool {
        !self.is_configuration()
    }
}

/// A specialized Result type for ssf-rs operations.
pub type Result<T> = std::result::Result<T, SsfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SsfError::UnknownPass("DownSampling".into()).is_configuration());
        assert!(SsfError::InvalidConfig("x".into()).is_configuration());

        let exhausted = SsfError::ResourceExhausted {
            name: "_SsfDepthTexture".into(),
            width: 64,
            height: 64,
            format: TargetFormat::R32Float,
        };
        assert!(exhausted.is_frame_local());
        assert!(SsfError::Render("lost".into()).is_frame_local());
    }

    #[test]
    fn test_error_messages() {
        let err = SsfError::UnknownPass("SsfLit".into());
        assert_eq!(err.to_string(), "effect material has no pass named 'SsfLit'");
    }
}
