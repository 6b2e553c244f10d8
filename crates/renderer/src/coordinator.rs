//! The per-frame engine.
//!
//! [`FrameCoordinator`] ties the frame slots, the command recorder and
//! the presentation target together and drives one frame per
//! [`render_frame`](FrameCoordinator::render_frame) call:
//!
//! ```text
//! wait slot fence -> acquire image -> record -> submit -> present -> advance
//! ```
//!
//! The fence wait is the sole CPU-side blocking point and the mechanism
//! that bounds how far the CPU may run ahead of the GPU: at most
//! [`crate::FRAMES_IN_FLIGHT`] frames of commands are ever outstanding.
//! Across slots no ordering is enforced; each slot owns disjoint
//! synchronization primitives and a disjoint command buffer.
//!
//! A stale surface from acquire or present is absorbed locally: the
//! coordinator waits for the device to go fully idle, rebuilds the
//! swapchain against the current drawable size, rebuilds the imageless
//! framebuffer, and returns without advancing the slot cursor. The
//! aborted frame is dropped and the next call retries the same slot.
//! Every other failure is fatal and propagated.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use cadence_rhi::device::Device;
use cadence_rhi::instance::Instance;
use cadence_rhi::pass::{Framebuffer, RenderPass};
use cadence_rhi::pipeline::Pipeline;
use cadence_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use cadence_rhi::sync::SlotSync;
use cadence_rhi::RhiResult;

use crate::pacer::FramePacer;
use crate::recorder::{CommandRecorder, DrawCall, RecordTarget};
use crate::FRAMES_IN_FLIGHT;

/// Fence and acquire timeout in nanoseconds.
///
/// Effectively unbounded: a wait that actually runs out at this bound
/// means the device is wedged, which surfaces as a fatal error rather
/// than a retry.
const WAIT_TIMEOUT_NS: u64 = u64::MAX;

/// Borrowed view of the presentation state a frame needs.
///
/// The coordinator mutates the swapchain and framebuffer during
/// recovery; everything else is read-only.
pub struct FrameContext<'a> {
    /// Vulkan instance, needed for swapchain rebuilds.
    pub instance: &'a Instance,
    /// The window surface.
    pub surface: vk::SurfaceKHR,
    /// The presentation target.
    pub swapchain: &'a mut Swapchain,
    /// The pass every frame records against.
    pub render_pass: &'a RenderPass,
    /// Imageless framebuffer; rebuilt unconditionally on recovery.
    pub framebuffer: &'a mut Framebuffer,
    /// Compiled graphics pipeline (viewport/scissor dynamic, so it
    /// survives every resize untouched).
    pub pipeline: &'a Pipeline,
    /// Current drawable size, used as the rebuild hint.
    pub drawable_size: (u32, u32),
    /// Clear color for the color attachment.
    pub clear_color: [f32; 4],
}

/// What a call to [`FrameCoordinator::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was rendered and queued for presentation.
    Rendered,
    /// The surface was stale; the presentation chain was rebuilt and
    /// the frame was dropped. The caller should simply try again.
    Recovered,
}

/// Drives the frame slots through the render/present cycle.
pub struct FrameCoordinator {
    device: Arc<Device>,
    slots: Vec<SlotSync>,
    recorder: CommandRecorder,
    pacer: FramePacer,
}

impl FrameCoordinator {
    /// Creates the coordinator with [`FRAMES_IN_FLIGHT`] slots.
    ///
    /// # Errors
    ///
    /// Returns an error if slot or command buffer allocation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let slots = SlotSync::create_slots(&device, FRAMES_IN_FLIGHT)?;
        let recorder = CommandRecorder::new(device.clone(), FRAMES_IN_FLIGHT)?;

        Ok(Self {
            device,
            slots,
            recorder,
            pacer: FramePacer::new(FRAMES_IN_FLIGHT),
        })
    }

    /// Renders one frame.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal conditions (device loss, fence
    /// timeout, allocation failure). A stale surface is handled
    /// internally and reported as [`FrameOutcome::Recovered`].
    pub fn render_frame(
        &mut self,
        ctx: &mut FrameContext<'_>,
        draws: &[DrawCall],
    ) -> RhiResult<FrameOutcome> {
        let slot_index = self.pacer.begin_frame();
        let slot = &self.slots[slot_index];

        // Backpressure: block until the submission from FRAMES_IN_FLIGHT
        // frames ago (same slot) has fully completed. Only then are the
        // slot's command buffer and semaphores safe to reuse.
        slot.in_flight().wait(WAIT_TIMEOUT_NS)?;
        self.pacer.slot_ready();

        let (image_index, suboptimal) = match ctx
            .swapchain
            .acquire_next_image(slot.image_available().handle(), WAIT_TIMEOUT_NS)?
        {
            AcquireOutcome::Image { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::Stale => {
                self.pacer.surface_stale();
                self.recover(ctx)?;
                return Ok(FrameOutcome::Recovered);
            }
        };
        if suboptimal {
            debug!("Acquired image from a suboptimal chain; presenting anyway");
        }

        // Reset only after a successful acquire. An acquire-stale abort
        // then leaves the fence signaled for the retry, and a crash
        // between reset and the submit below cannot read as "ready".
        slot.in_flight().reset()?;
        self.pacer.image_acquired();

        self.recorder.begin(slot_index)?;
        let target = RecordTarget {
            render_pass: ctx.render_pass.handle(),
            framebuffer: ctx.framebuffer.handle(),
            image_view: ctx.swapchain.image_view(image_index as usize),
            extent: ctx.swapchain.extent(),
            pipeline: ctx.pipeline.handle(),
            clear_color: ctx.clear_color,
        };
        self.recorder.record_frame(slot_index, &target, draws)?;
        self.pacer.recorded();

        // Color output waits for the acquired image; vertex work may
        // start earlier and overlap acquisition latency.
        let wait_semaphores = [slot.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.render_finished().handle()];
        let command_buffers = [self.recorder.buffer_handle(slot_index)];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], slot.in_flight().handle())?;
        }
        self.pacer.submitted();

        match ctx.swapchain.present(
            self.device.present_queue(),
            image_index,
            slot.render_finished().handle(),
        )? {
            PresentOutcome::Presented => {
                self.pacer.presented();
                Ok(FrameOutcome::Rendered)
            }
            PresentOutcome::Stale => {
                self.pacer.surface_stale();
                self.recover(ctx)?;
                Ok(FrameOutcome::Recovered)
            }
        }
    }

    /// Rebuilds the presentation chain after a stale surface.
    ///
    /// Waits for the device to go fully idle first: a swapchain
    /// resource cannot be destroyed while queued work references it,
    /// and resize is rare enough that the coarse barrier is fine. The
    /// framebuffer rebuild is an unconditional step, not a lazy one.
    fn recover(&mut self, ctx: &mut FrameContext<'_>) -> RhiResult<()> {
        let (width, height) = ctx.drawable_size;
        debug!("Surface stale; rebuilding presentation chain at {}x{}", width, height);

        self.device.wait_idle()?;

        ctx.swapchain
            .rebuild(ctx.instance, ctx.surface, width, height)?;
        ctx.framebuffer
            .rebuild(ctx.swapchain.extent(), ctx.swapchain.format())?;

        // An aborted frame can leave a slot semaphore with a signal the
        // old chain will never consume; fresh semaphores restore a known
        // state. Safe here: the device is idle.
        for slot in &mut self.slots {
            slot.recreate_semaphores(&self.device)?;
        }

        self.pacer.recovered();
        Ok(())
    }

    /// Waits until every slot's outstanding submission has completed.
    ///
    /// # Errors
    ///
    /// Returns an error if any fence wait fails.
    pub fn wait_all_slots(&self) -> RhiResult<()> {
        for slot in &self.slots {
            slot.in_flight().wait(WAIT_TIMEOUT_NS)?;
        }
        Ok(())
    }

    /// The slot the next frame attempt will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.pacer.slot()
    }

    /// Number of frame slots.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.pacer.slot_count()
    }
}
