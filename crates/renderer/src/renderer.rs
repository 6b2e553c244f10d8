//! The owning graphics context.
//!
//! [`Renderer`] is the explicit context object that owns every piece of
//! graphics state, wired together at construction and destroyed in
//! reverse dependency order on drop. No global state anywhere; a second
//! window would simply be a second `Renderer`.

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info};

use cadence_platform::{Surface, Window};
use cadence_rhi::device::Device;
use cadence_rhi::instance::Instance;
use cadence_rhi::pass::{Framebuffer, RenderPass};
use cadence_rhi::physical_device::select_physical_device;
use cadence_rhi::pipeline::{Pipeline, PipelineLayout};
use cadence_rhi::shader::{Shader, ShaderStage};
use cadence_rhi::swapchain::Swapchain;
use cadence_rhi::{RhiError, RhiResult};

use crate::coordinator::{FrameContext, FrameCoordinator, FrameOutcome};
use crate::recorder::DrawCall;
use crate::FRAMES_IN_FLIGHT;

/// Compiled SPIR-V for the demo triangle, relative to the working
/// directory. See `shaders/` for the GLSL sources.
const VERTEX_SHADER_PATH: &str = "shaders/spv/triangle.vert.spv";
const FRAGMENT_SHADER_PATH: &str = "shaders/spv/triangle.frag.spv";

/// Clear color for the frame.
const CLEAR_COLOR: [f32; 4] = [0.015, 0.015, 0.03, 1.0];

/// Owns the full graphics context and renders frames into a window
/// surface.
///
/// Destruction order matters in Vulkan, so every member is wrapped in
/// `ManuallyDrop` and released explicitly in [`Drop`], after a full
/// device-idle wait: coordinator resources first, the instance last.
pub struct Renderer {
    // Declared in reverse destruction order; Drop releases explicitly.
    instance: ManuallyDrop<Instance>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    swapchain: ManuallyDrop<Swapchain>,
    render_pass: ManuallyDrop<RenderPass>,
    framebuffer: ManuallyDrop<Framebuffer>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    pipeline: ManuallyDrop<Pipeline>,
    coordinator: ManuallyDrop<FrameCoordinator>,

    /// Draws recorded every frame.
    draws: Vec<DrawCall>,
    /// Current drawable size as reported by the window.
    width: u32,
    height: u32,
}

impl Renderer {
    /// Initializes the full graphics context for `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage of bring-up fails: instance or
    /// device creation, surface creation, swapchain negotiation (e.g.
    /// no SRGB format), shader loading, or pipeline compilation.
    pub fn new(window: &Window) -> RhiResult<Self> {
        let width = window.width();
        let height = window.height();

        info!("Initializing renderer ({}x{})", width, height);

        let enable_validation = cfg!(debug_assertions);
        let instance = Instance::new(enable_validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::Surface(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format())?;
        let framebuffer = Framebuffer::new(
            device.clone(),
            &render_pass,
            swapchain.extent(),
            swapchain.format(),
        )?;

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new(VERTEX_SHADER_PATH),
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new(FRAGMENT_SHADER_PATH),
            ShaderStage::Fragment,
            "main",
        )?;

        let pipeline_layout = PipelineLayout::new(device.clone(), &[], &[])?;
        let pipeline = Pipeline::new_graphics(
            device.clone(),
            &pipeline_layout,
            &render_pass,
            &vertex_shader,
            &fragment_shader,
        )?;
        // Shader modules are no longer needed once the pipeline exists;
        // they drop here.

        let coordinator = FrameCoordinator::new(device.clone())?;

        info!(
            "Renderer initialized: {} presentable images, {} frames in flight",
            swapchain.image_count(),
            FRAMES_IN_FLIGHT
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass: ManuallyDrop::new(render_pass),
            framebuffer: ManuallyDrop::new(framebuffer),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline: ManuallyDrop::new(pipeline),
            coordinator: ManuallyDrop::new(coordinator),
            draws: vec![DrawCall::vertices(3)],
            width,
            height,
        })
    }

    /// Notifies the renderer of a new drawable size.
    ///
    /// Nothing is rebuilt here: the next acquire or present against the
    /// resized surface reports it stale and the recovery path rebuilds
    /// the chain against this size. A zero dimension means the window
    /// is minimized and frames are skipped until it comes back.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width != self.width || height != self.height {
            debug!(
                "Drawable size changed: {}x{} -> {}x{}",
                self.width, self.height, width, height
            );
            self.width = width;
            self.height = height;
        }
    }

    /// Renders one frame into the window surface.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal conditions; stale surfaces are
    /// recovered from internally.
    pub fn render_frame(&mut self) -> RhiResult<()> {
        if self.width == 0 || self.height == 0 {
            debug!("Skipping frame: drawable is zero-sized");
            return Ok(());
        }

        let mut ctx = FrameContext {
            instance: &*self.instance,
            surface: self.surface.handle(),
            swapchain: &mut *self.swapchain,
            render_pass: &*self.render_pass,
            framebuffer: &mut *self.framebuffer,
            pipeline: &*self.pipeline,
            drawable_size: (self.width, self.height),
            clear_color: CLEAR_COLOR,
        };

        match self.coordinator.render_frame(&mut ctx, &self.draws)? {
            FrameOutcome::Rendered => {}
            FrameOutcome::Recovered => {
                debug!("Frame dropped; presentation chain rebuilt");
            }
        }

        Ok(())
    }

    /// Current drawable extent.
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Nothing may be destroyed while the GPU still references it.
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {:?}", e);
        }

        unsafe {
            ManuallyDrop::drop(&mut self.coordinator);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.framebuffer);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.surface);
            // Last Arc: destroys the logical device.
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
