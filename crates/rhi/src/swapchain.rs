//! Swapchain management and presentation.
//!
//! The [`Swapchain`] owns the presentable image chain, one view per
//! image, and the negotiated [`SwapchainConfig`]. Configuration
//! negotiation is deterministic and lives in pure functions so it can
//! be exercised without a device.
//!
//! A surface becomes *stale* when its capabilities no longer match the
//! built configuration (typically after a resize). Staleness is an
//! expected, recoverable outcome of [`Swapchain::acquire_next_image`]
//! and [`Swapchain::present`], reported through [`AcquireOutcome`] /
//! [`PresentOutcome`] rather than through the error channel.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiError;
use crate::instance::Instance;

/// Number of presentable images requested before clamping into the
/// surface's supported range. Independent of the number of frame slots.
pub const DESIRED_IMAGE_COUNT: u32 = 3;

/// Surface support details for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    /// Surface capabilities (image count bounds, extents, transform)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported (format, color space) pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Queries swapchain support for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the surface queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Surface support: {} formats, {} present modes, image count {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unbounded".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// The negotiated swapchain configuration.
///
/// Immutable once built; replacing it means destroying and rebuilding
/// the image chain and anything that snapshotted it (the framebuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    /// Pixel format of the presentable images.
    pub format: vk::Format,
    /// Color space of the presentable images.
    pub color_space: vk::ColorSpaceKHR,
    /// Drawable extent.
    pub extent: vk::Extent2D,
    /// Present mode.
    pub present_mode: vk::PresentModeKHR,
    /// Number of images requested from the platform; the chain may end
    /// up with more.
    pub image_count: u32,
}

/// Outcome of acquiring a presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available for rendering.
    Image {
        /// Index of the acquired image within the chain.
        index: u32,
        /// The chain no longer matches the surface exactly but the
        /// image is still presentable.
        suboptimal: bool,
    },
    /// The surface no longer matches the built configuration; the chain
    /// must be rebuilt before rendering can continue.
    Stale,
}

/// Outcome of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued for presentation.
    Presented,
    /// The surface no longer matches the built configuration.
    Stale,
}

/// Vulkan swapchain wrapper: the presentable image chain, its views,
/// and the negotiated configuration.
///
/// Not thread-safe; the single render thread owns it.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    config: SwapchainConfig,
}

impl Swapchain {
    /// Creates a new swapchain for `surface`.
    ///
    /// `width`/`height` are only hints for the rare surfaces that leave
    /// the current extent undefined; the negotiated extent otherwise
    /// follows the surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface queries fail, if no SRGB surface
    /// format is supported, or if swapchain / image view creation
    /// fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<Self, RhiError> {
        Self::create_internal(
            instance,
            device,
            surface,
            width,
            height,
            vk::SwapchainKHR::null(),
        )
    }

    /// Creates a swapchain, optionally recycling an old one.
    fn create_internal(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self, RhiError> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support = SwapchainSupport::query(device.physical_device(), surface, &surface_loader)?;
        let config = negotiate(&support, DESIRED_IMAGE_COUNT, width, height)?;

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            config.extent.width,
            config.extent.height,
            config.format,
            config.color_space,
            config.present_mode,
            config.image_count
        );

        let queue_families = device.queue_families();
        let graphics_family = queue_families.graphics_family.unwrap();
        let present_family = queue_families.present_family.unwrap();
        let family_indices = [graphics_family, present_family];

        let (sharing_mode, family_indices_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(config.image_count)
            .image_format(config.format)
            .image_color_space(config.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        info!("Swapchain created with {} images", images.len());

        let image_views = create_image_views(&device, &images, config.format)?;

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            config,
        })
    }

    /// Rebuilds the image chain against the surface's current state.
    ///
    /// The old swapchain handle is passed to the platform as a recycle
    /// hint before being destroyed. Any framebuffer built against the
    /// old chain snapshots stale attachment descriptors and must be
    /// rebuilt by the caller afterwards.
    ///
    /// The caller must guarantee that no in-flight submission still
    /// references the old images; the frame coordinator does this with
    /// a full device-idle wait before invoking rebuild.
    ///
    /// # Errors
    ///
    /// Returns an error if recreation fails.
    pub fn rebuild(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<(), RhiError> {
        info!("Rebuilding swapchain for {}x{}", width, height);

        self.destroy_image_views();

        let old_swapchain = self.swapchain;
        let mut rebuilt = Self::create_internal(
            instance,
            self.device.clone(),
            surface,
            width,
            height,
            old_swapchain,
        )?;

        unsafe {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }

        self.swapchain = rebuilt.swapchain;
        self.images = std::mem::take(&mut rebuilt.images);
        self.image_views = std::mem::take(&mut rebuilt.image_views);
        self.config = rebuilt.config;

        // Null out the temporary's handle so its Drop does not free the
        // swapchain we just adopted.
        rebuilt.swapchain = vk::SwapchainKHR::null();

        Ok(())
    }

    /// Requests the next presentable image.
    ///
    /// `semaphore` is signaled when the returned image becomes usable
    /// as a render target.
    ///
    /// # Errors
    ///
    /// A stale surface is NOT an error; it is reported as
    /// [`AcquireOutcome::Stale`]. Any other acquisition failure is
    /// fatal and propagated.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout: u64,
    ) -> Result<AcquireOutcome, RhiError> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Surface stale during acquire");
                Ok(AcquireOutcome::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Queues `image_index` for presentation, waiting on
    /// `wait_semaphore` (the render-finished semaphore of the
    /// submitting frame slot).
    ///
    /// # Errors
    ///
    /// A stale or suboptimal surface is reported as
    /// [`PresentOutcome::Stale`]; other failures are fatal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome, RhiError> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => {
                debug!("Surface suboptimal during present");
                Ok(PresentOutcome::Stale)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Surface stale during present");
                Ok(PresentOutcome::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the negotiated configuration.
    #[inline]
    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.config.format
    }

    /// Returns the drawable extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    /// Returns the number of images actually in the chain.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the image view at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    fn destroy_image_views(&mut self) {
        for &view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        // Null handle means rebuild() already moved the chain out.
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed ({}x{}, {} images)",
                self.config.extent.width,
                self.config.extent.height,
                self.images.len()
            );
        }
    }
}

/// Negotiates a [`SwapchainConfig`] from surface support.
///
/// Deterministic: identical inputs always produce an identical
/// configuration.
///
/// # Errors
///
/// Returns an error if the surface offers no SRGB format or no present
/// mode at all.
pub fn negotiate(
    support: &SwapchainSupport,
    desired_image_count: u32,
    width: u32,
    height: u32,
) -> Result<SwapchainConfig, RhiError> {
    if support.present_modes.is_empty() {
        return Err(RhiError::Swapchain(
            "surface reports no present modes".to_string(),
        ));
    }

    let surface_format = select_surface_format(&support.formats).ok_or_else(|| {
        RhiError::Swapchain("no SRGB surface format supported".to_string())
    })?;

    Ok(SwapchainConfig {
        format: surface_format.format,
        color_space: surface_format.color_space,
        extent: select_extent(&support.capabilities, width, height),
        present_mode: select_present_mode(&support.present_modes),
        image_count: select_image_count(desired_image_count, &support.capabilities),
    })
}

/// Picks the first SRGB-encoded format in the standard color space.
///
/// Rendering into a non-SRGB target would require gamma handling in the
/// shaders, so there is no fallback: absence is a hard failure.
fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                && (f.format == vk::Format::R8G8B8A8_SRGB || f.format == vk::Format::B8G8R8A8_SRGB)
        })
        .copied()
}

/// Picks the present mode by priority: MAILBOX > IMMEDIATE > FIFO.
///
/// FIFO is the only mode Vulkan guarantees on every surface, hence the
/// fallback.
fn select_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    if present_modes.contains(&vk::PresentModeKHR::IMMEDIATE) {
        return vk::PresentModeKHR::IMMEDIATE;
    }
    vk::PresentModeKHR::FIFO
}

/// Clamps the desired image count into the surface's supported range.
///
/// `max_image_count == 0` means unbounded. Out-of-range requests are
/// clamped, never rejected.
fn select_image_count(desired: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = desired.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

/// Picks the drawable extent.
///
/// The surface's current extent wins when defined; the `u32::MAX`
/// sentinel means the window decides, clamped into the supported range.
fn select_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Creates one image view per swapchain image.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    let mut image_views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let image_view = unsafe { device.handle().create_image_view(&create_info, None)? };
        image_views.push(image_view);
    }

    debug!("Created {} swapchain image views", image_views.len());
    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support_with(
        formats: Vec<vk::SurfaceFormatKHR>,
        present_modes: Vec<vk::PresentModeKHR>,
        capabilities: vk::SurfaceCapabilitiesKHR,
    ) -> SwapchainSupport {
        SwapchainSupport {
            capabilities,
            formats,
            present_modes,
        }
    }

    fn basic_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn format_selection_prefers_srgb_over_linear() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = select_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_selection_takes_first_srgb_candidate() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = select_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn format_selection_fails_without_srgb() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert!(select_surface_format(&formats).is_none());

        // An SRGB format in a non-standard color space does not count.
        let wrong_space = vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];
        assert!(select_surface_format(&wrong_space).is_none());
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_prefers_immediate_over_fifo() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = vec![vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn image_count_clamped_into_range() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };

        // Below the minimum: raised, not rejected.
        assert_eq!(select_image_count(1, &caps), 2);
        // Above the maximum: lowered, not rejected.
        assert_eq!(select_image_count(5, &caps), 3);
        // In range: untouched.
        assert_eq!(select_image_count(3, &caps), 3);
    }

    #[test]
    fn image_count_with_unbounded_max() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0, // 0 = no upper bound
            ..Default::default()
        };
        assert_eq!(select_image_count(3, &caps), 3);
        assert_eq!(select_image_count(16, &caps), 16);
    }

    #[test]
    fn extent_follows_surface_when_defined() {
        let caps = basic_caps();
        let extent = select_extent(&caps, 1234, 999);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn extent_clamps_window_size_when_undefined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let clamped_up = select_extent(&caps, 50, 50);
        assert_eq!(clamped_up.width, 100);
        assert_eq!(clamped_up.height, 100);

        let clamped_down = select_extent(&caps, 3000, 3000);
        assert_eq!(clamped_down.width, 2000);
        assert_eq!(clamped_down.height, 2000);

        let in_range = select_extent(&caps, 800, 600);
        assert_eq!(in_range.width, 800);
        assert_eq!(in_range.height, 600);
    }

    #[test]
    fn negotiation_is_deterministic() {
        let support = support_with(
            vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            basic_caps(),
        );

        let first = negotiate(&support, DESIRED_IMAGE_COUNT, 800, 600).unwrap();
        let second = negotiate(&support, DESIRED_IMAGE_COUNT, 800, 600).unwrap();

        // Build -> tear down -> build must land on the same configuration.
        assert_eq!(first, second);
        assert_eq!(first.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(first.image_count, 3);
    }

    #[test]
    fn negotiation_fails_without_srgb_format() {
        let support = support_with(
            vec![vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            }],
            vec![vk::PresentModeKHR::FIFO],
            basic_caps(),
        );

        assert!(negotiate(&support, DESIRED_IMAGE_COUNT, 800, 600).is_err());
    }
}
