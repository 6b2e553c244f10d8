//! Platform layer: windowing and Vulkan surface creation.

mod window;

pub use window::{Surface, Window};
