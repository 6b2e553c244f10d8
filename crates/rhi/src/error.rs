//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
///
/// Everything here is fatal: a stale surface is an expected presentation
/// outcome, not an error, and is reported through the tagged results in
/// [`crate::swapchain`] instead.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] ash::vk::Result),

    /// Failed to load the Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A fence wait at the maximal bound ran out; the device is wedged
    #[error("Fence wait timed out; device is not making progress")]
    SyncTimeout,

    /// Surface creation or query error
    #[error("Surface error: {0}")]
    Surface(String),

    /// Swapchain negotiation or creation error
    #[error("Swapchain error: {0}")]
    Swapchain(String),

    /// Shader loading error
    #[error("Shader error: {0}")]
    Shader(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
