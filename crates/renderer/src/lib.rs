//! Frame pacing and presentation.
//!
//! This crate is the heart of cadence: it decides how many frames may
//! be in flight, which per-frame resources are safe to reuse, and how
//! the pipeline recovers when the surface goes stale on resize.
//!
//! - [`pacer`] - the pure slot-cursor / phase state machine
//! - [`recorder`] - per-slot command buffer recording
//! - [`coordinator`] - the per-frame engine tying slots, recorder and
//!   swapchain together
//! - [`renderer`] - the owning context object and public entry points

pub mod coordinator;
pub mod pacer;
pub mod recorder;
pub mod renderer;

pub use coordinator::{FrameContext, FrameCoordinator, FrameOutcome};
pub use pacer::{FramePacer, FramePhase};
pub use recorder::{CommandRecorder, DrawCall, RecordTarget};
pub use renderer::Renderer;

/// Number of frames whose GPU work may be unfinished while the CPU
/// records new ones.
///
/// Three balances latency against throughput; the value is a tunable,
/// not a protocol constant. The presentable image count is negotiated
/// independently and may differ.
pub const FRAMES_IN_FLIGHT: usize = 3;
