//! Render pass and framebuffer construction.
//!
//! The [`RenderPass`] renders into a single presentable color
//! attachment and hands it off in `PRESENT_SRC_KHR` layout. The
//! [`Framebuffer`] is *imageless* (Vulkan 1.2): it records only an
//! attachment descriptor snapshot (usage, size, view format) and the
//! actual swapchain image view is bound at render-pass begin time.
//! That keeps the per-image state out of the framebuffer entirely; a
//! resize only requires rebuilding this one object with the new
//! extent.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;

/// Render pass with one clear/store color attachment.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Creates the color pass for presentable images of `format`.
    ///
    /// The single subpass writes the attachment in
    /// `COLOR_ATTACHMENT_OPTIMAL`; the pass transitions it from
    /// `UNDEFINED` (previous contents are cleared anyway) to
    /// `PRESENT_SRC_KHR`. An external dependency on the
    /// color-attachment-output stage defers that initial transition
    /// until presentation of the image's previous frame has finished.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(device: Arc<Device>, format: vk::Format) -> RhiResult<Self> {
        let attachments = [vk::AttachmentDescription2::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

        let color_refs = [vk::AttachmentReference2::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .aspect_mask(vk::ImageAspectFlags::COLOR)];

        let subpasses = [vk::SubpassDescription2::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        // The UNDEFINED -> COLOR_ATTACHMENT_OPTIMAL transition must not
        // overtake presentation of whatever the image showed last.
        let dependencies = [vk::SubpassDependency2::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dependency_flags(vk::DependencyFlags::BY_REGION)];

        let create_info = vk::RenderPassCreateInfo2::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass2(&create_info, None)? };

        info!("Render pass created for format {:?}", format);

        Ok(Self {
            device,
            render_pass,
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        info!("Render pass destroyed");
    }
}

/// Imageless framebuffer compatible with [`RenderPass`].
///
/// The attachment descriptor (usage, extent, view format) is a snapshot
/// taken at build time. After a swapchain rebuild the snapshot is stale,
/// so recovery rebuilds this object unconditionally.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl Framebuffer {
    /// Creates an imageless framebuffer for `render_pass`.
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RhiResult<Self> {
        let framebuffer = create_imageless(&device, render_pass.handle(), extent, format)?;

        debug!(
            "Imageless framebuffer created ({}x{}, {:?})",
            extent.width, extent.height, format
        );

        Ok(Self {
            device,
            framebuffer,
            render_pass: render_pass.handle(),
            extent,
            format,
        })
    }

    /// Rebuilds the framebuffer against a new extent and format.
    ///
    /// Called from the recovery path after the swapchain was rebuilt;
    /// the caller has already waited for device idle, so destroying the
    /// old framebuffer is safe.
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails; the old
    /// framebuffer is destroyed either way.
    pub fn rebuild(&mut self, extent: vk::Extent2D, format: vk::Format) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
        self.framebuffer = vk::Framebuffer::null();

        self.framebuffer = create_imageless(&self.device, self.render_pass, extent, format)?;
        self.extent = extent;
        self.format = format;

        debug!(
            "Imageless framebuffer rebuilt ({}x{}, {:?})",
            extent.width, extent.height, format
        );

        Ok(())
    }

    /// Returns the Vulkan framebuffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Returns the extent snapshot the framebuffer was built with.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the view format snapshot the framebuffer was built with.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if self.framebuffer != vk::Framebuffer::null() {
            unsafe {
                self.device
                    .handle()
                    .destroy_framebuffer(self.framebuffer, None);
            }
        }
    }
}

/// Creates the imageless framebuffer object.
fn create_imageless(
    device: &Device,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    format: vk::Format,
) -> RhiResult<vk::Framebuffer> {
    let view_formats = [format];
    let attachment_image_infos = [vk::FramebufferAttachmentImageInfo::default()
        .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .width(extent.width)
        .height(extent.height)
        .layer_count(1)
        .view_formats(&view_formats)];

    let mut attachments_info =
        vk::FramebufferAttachmentsCreateInfo::default()
            .attachment_image_infos(&attachment_image_infos);

    let mut create_info = vk::FramebufferCreateInfo::default()
        .flags(vk::FramebufferCreateFlags::IMAGELESS)
        .render_pass(render_pass)
        .width(extent.width)
        .height(extent.height)
        .layers(1)
        .push_next(&mut attachments_info);

    // Imageless framebuffers still declare how many attachments the
    // render pass binds; the views arrive at begin time.
    create_info.attachment_count = 1;

    let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
    Ok(framebuffer)
}
