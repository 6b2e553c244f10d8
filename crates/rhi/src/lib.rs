//! Vulkan abstraction layer.
//!
//! This crate provides a safe abstraction over Vulkan using the `ash`
//! crate. It handles:
//! - Instance and device creation
//! - Swapchain management and presentation
//! - Render pass and imageless framebuffer construction
//! - Command buffer recording
//! - Pipeline creation
//! - Synchronization primitives

mod error;

pub mod command;
pub mod device;
pub mod instance;
pub mod pass;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
