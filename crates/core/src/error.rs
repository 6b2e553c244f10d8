//! Error types shared by the platform and application layers.

use thiserror::Error;

/// Top-level error type for window and surface plumbing.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Vulkan-related errors raised outside the rhi crate
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the workspace [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
