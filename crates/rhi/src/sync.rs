//! Synchronization primitives.
//!
//! Wrappers for the Vulkan synchronization objects used by the frame
//! loop:
//! - [`Semaphore`] - GPU-to-GPU ordering between queue operations
//! - [`Fence`] - GPU-to-CPU completion signal the host can wait on
//! - [`SlotSync`] - the per-frame-slot bundle of one fence and two
//!   semaphores
//!
//! The protocol per frame slot:
//!
//! ```text
//! 1. Wait on in_flight fence (CPU waits for the slot's previous use)
//! 2. Acquire swapchain image (signals image_available)
//! 3. Record the slot's command buffer
//! 4. Submit: wait image_available, signal render_finished + fence
//! 5. Present: wait render_finished
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
///
/// Semaphores order queue operations without CPU involvement: the
/// acquire-to-render and render-to-present edges of every frame.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
///
/// Fences let the host observe completion of submitted GPU work; the
/// frame loop uses one per slot as its only backpressure point.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `signaled` - If true, the fence starts signaled. Required for
    ///   fences that are waited on before the first submission that
    ///   would signal them.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds. The frame loop passes
    ///   `u64::MAX`; an elapsed timeout at that bound means the device
    ///   has stopped making progress and is reported as the fatal
    ///   [`RhiError::SyncTimeout`], never retried.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SyncTimeout`] on timeout, or the underlying
    /// Vulkan error otherwise (e.g. device loss).
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        let result = unsafe { self.device.handle().wait_for_fences(&fences, true, timeout) };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::SyncTimeout),
            Err(e) => Err(e.into()),
        }
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any queue operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Checks if the fence is currently signaled without blocking.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Per-frame-slot synchronization primitives.
///
/// Each slot owns disjoint primitives, so slots execute fully
/// independently once handed to the GPU:
/// - `image_available`: signaled when the acquired swapchain image may
///   be rendered to
/// - `render_finished`: signaled when the slot's submission completes,
///   gating presentation
/// - `in_flight`: signaled by the same submission, gating CPU reuse of
///   the slot's command buffer
pub struct SlotSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl SlotSync {
    /// Creates one slot's worth of synchronization primitives.
    ///
    /// The fence starts signaled so the very first wait on the slot
    /// does not deadlock.
    ///
    /// # Errors
    ///
    /// Returns an error if any primitive creation fails; allocation
    /// failure here is fatal and propagated, not retried.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Creates the synchronization bundles for `count` frame slots.
    ///
    /// # Errors
    ///
    /// Returns an error if any allocation fails.
    pub fn create_slots(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Self>> {
        let mut slots = Vec::with_capacity(count);
        for i in 0..count {
            slots.push(Self::new(device.clone())?);
            debug!("Created sync primitives for frame slot {}", i);
        }
        info!("Created {} frame slot sync bundles", count);
        Ok(slots)
    }

    /// Replaces both semaphores with freshly created ones.
    ///
    /// After a presentation-chain rebuild an aborted frame may have
    /// left a semaphore with a pending signal the chain will never
    /// consume. The caller must have waited for device idle first so
    /// the old semaphores are free to drop.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn recreate_semaphores(&mut self, device: &Arc<Device>) -> RhiResult<()> {
        self.image_available = Semaphore::new(device.clone())?;
        self.render_finished = Semaphore::new(device.clone())?;
        Ok(())
    }

    /// Semaphore signaled when the acquired image becomes usable.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Semaphore signaled when the slot's rendering completes.
    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Fence gating CPU reuse of the slot's resources.
    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }

    #[test]
    fn slot_sync_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SlotSync>();
    }
}
