//! Per-slot command recording.
//!
//! [`CommandRecorder`] owns the command pool and one primary command
//! buffer per frame slot. A buffer is reset and re-recorded every frame
//! with the one-time-submit hint; it must not be touched again until
//! its slot's fence proves the previous submission finished.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use cadence_rhi::command::{CommandBuffer, CommandPool};
use cadence_rhi::device::Device;
use cadence_rhi::RhiResult;

/// One non-indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Number of vertices to draw.
    pub vertex_count: u32,
    /// Number of instances.
    pub instance_count: u32,
    /// First vertex index.
    pub first_vertex: u32,
    /// First instance index.
    pub first_instance: u32,
}

impl DrawCall {
    /// A single-instance draw of `vertex_count` vertices.
    pub fn vertices(vertex_count: u32) -> Self {
        Self {
            vertex_count,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Everything a frame's pass needs, captured by handle.
///
/// The image view belongs to the acquired presentable image; the
/// framebuffer is imageless and only learns the view here.
#[derive(Debug, Clone, Copy)]
pub struct RecordTarget {
    /// Render pass to record against.
    pub render_pass: vk::RenderPass,
    /// Imageless framebuffer compatible with the render pass.
    pub framebuffer: vk::Framebuffer,
    /// View of the acquired presentable image.
    pub image_view: vk::ImageView,
    /// Current drawable extent; also feeds viewport and scissor.
    pub extent: vk::Extent2D,
    /// Compiled graphics pipeline.
    pub pipeline: vk::Pipeline,
    /// Clear color for the attachment.
    pub clear_color: [f32; 4],
}

/// Records frame command buffers, one per slot.
pub struct CommandRecorder {
    pool: CommandPool,
    buffers: Vec<CommandBuffer>,
}

impl CommandRecorder {
    /// Allocates `slot_count` command buffers from a fresh pool on the
    /// graphics queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation or allocation fails.
    pub fn new(device: Arc<Device>, slot_count: usize) -> RhiResult<Self> {
        let graphics_family = device
            .queue_families()
            .graphics_family
            .expect("device was created with a graphics queue family");

        let pool = CommandPool::new(device.clone(), graphics_family)?;
        let handles = pool.allocate_command_buffers(slot_count as u32)?;
        let buffers = handles
            .into_iter()
            .map(|handle| CommandBuffer::from_handle(device.clone(), handle))
            .collect();

        info!(
            "Command recorder ready with {} per-slot buffers",
            slot_count
        );

        Ok(Self { pool, buffers })
    }

    /// Resets and begins recording into the slot's command buffer.
    ///
    /// The caller must have observed the slot's fence first.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset or begin fails.
    pub fn begin(&self, slot: usize) -> RhiResult<()> {
        let buffer = &self.buffers[slot];
        buffer.reset()?;
        buffer.begin()?;
        Ok(())
    }

    /// Records the full frame pass into the slot's command buffer and
    /// finishes recording.
    ///
    /// Emits: begin render pass (clearing the attachment), bind
    /// pipeline, viewport/scissor from the current extent, the draw
    /// list, end render pass, end buffer. Afterwards the buffer is
    /// executable and owned by the pending submission until the slot's
    /// fence signals.
    ///
    /// # Errors
    ///
    /// Returns an error if ending the buffer fails.
    pub fn record_frame(
        &self,
        slot: usize,
        target: &RecordTarget,
        draws: &[DrawCall],
    ) -> RhiResult<()> {
        let buffer = &self.buffers[slot];

        buffer.begin_render_pass(
            target.render_pass,
            target.framebuffer,
            target.extent,
            target.image_view,
            target.clear_color,
        );

        buffer.bind_graphics_pipeline(target.pipeline);
        buffer.set_viewport_scissor(target.extent);

        for draw in draws {
            buffer.draw(
                draw.vertex_count,
                draw.instance_count,
                draw.first_vertex,
                draw.first_instance,
            );
        }

        buffer.end_render_pass();
        buffer.end()?;

        Ok(())
    }

    /// Raw handle of the slot's command buffer, for submission.
    #[inline]
    pub fn buffer_handle(&self, slot: usize) -> vk::CommandBuffer {
        self.buffers[slot].handle()
    }

    /// Number of per-slot buffers.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.buffers.len()
    }

    /// The owning command pool.
    #[inline]
    pub fn pool(&self) -> &CommandPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_call_vertices_defaults() {
        let draw = DrawCall::vertices(3);
        assert_eq!(draw.vertex_count, 3);
        assert_eq!(draw.instance_count, 1);
        assert_eq!(draw.first_vertex, 0);
        assert_eq!(draw.first_instance, 0);
    }
}
