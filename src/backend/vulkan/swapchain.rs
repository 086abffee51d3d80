// Window surfaces - VkSurfaceKHR + swapchain
//
// Format, present mode, extent and image count are negotiated against what
// the surface reports; the request is a preference, not a demand.

use super::{present_mode, surface_format, vk_format, vk_present_mode, VkResultExt, VulkanCore};
use crate::driver::Backend;
use crate::error::{Error, Result};
use crate::surface::{Extent, PresentMode, SurfaceConfig, SurfaceFormat, SurfaceInfo, WindowTarget};
use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;

const OPERATION: &str = "create window surface";

pub struct WindowSurface {
    image_views: Vec<vk::ImageView>,
    images: Vec<vk::Image>,
    swapchain: vk::SwapchainKHR,
    swapchain_loader: Option<khr::Swapchain>,
    surface: vk::SurfaceKHR,
    format: SurfaceFormat,
    present_mode: PresentMode,
    extent: Extent,
    core: Arc<VulkanCore>,
}

impl WindowSurface {
    pub fn new(
        core: Arc<VulkanCore>,
        config: &SurfaceConfig,
        target: WindowTarget,
    ) -> Result<Self> {
        let surface_loader = core.surface_loader.clone().ok_or_else(|| {
            Error::backend(
                Backend::Vulkan,
                OPERATION,
                Some(vk::Result::ERROR_EXTENSION_NOT_PRESENT.as_raw()),
                "instance created without VK_KHR_surface; build the driver config with_display",
            )
        })?;
        if !core.has_device_extension(khr::Swapchain::name()) {
            return Err(Error::backend(
                Backend::Vulkan,
                OPERATION,
                Some(vk::Result::ERROR_EXTENSION_NOT_PRESENT.as_raw()),
                "device does not expose VK_KHR_swapchain",
            ));
        }

        // Handle validity and window lifetime are guaranteed by whoever
        // built the target through `SurfaceTarget::window`
        let surface = unsafe {
            ash_window::create_surface(
                &core.entry,
                &core.instance,
                target.display(),
                target.window(),
                None,
            )
        }
        .or_backend("vkCreateSurfaceKHR")?;

        // From here on Drop owns cleanup, including the VkSurfaceKHR
        let mut window_surface = Self {
            image_views: Vec::new(),
            images: Vec::new(),
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader: None,
            surface,
            format: config.format,
            present_mode: config.present_mode,
            extent: config.extent,
            core,
        };
        window_surface.create_swapchain(&surface_loader, config)?;
        Ok(window_surface)
    }

    fn create_swapchain(&mut self, surface_loader: &khr::Surface, config: &SurfaceConfig) -> Result<()> {
        let core = Arc::clone(&self.core);
        let physical_device = core.physical_device;

        // Verify the GPU supports presenting to this surface
        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                physical_device,
                core.graphics_queue_family,
                self.surface,
            )
        }
        .or_backend("vkGetPhysicalDeviceSurfaceSupportKHR")?;
        if !supported {
            return Err(Error::backend(
                Backend::Vulkan,
                OPERATION,
                None,
                "presentation not supported on the selected queue family",
            ));
        }

        let caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .or_backend("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, self.surface)
        }
        .or_backend("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, self.surface)
        }
        .or_backend("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let (surface_format, format) = choose_surface_format(&formats, config.format)?;
        let mode = choose_present_mode(&present_modes, config.present_mode);
        let extent = choose_extent(&caps, config.extent)?;
        let usage = choose_image_usage(&caps);
        let image_count = choose_image_count(&caps, config.image_count);

        log::info!(
            "Creating swapchain: {}x{} {:?} {:?} ({} images)",
            extent.width,
            extent.height,
            surface_format.format,
            mode,
            image_count
        );

        let swapchain_loader = khr::Swapchain::new(&core.instance, &core.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(mode)
            .clipped(true);

        self.swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .or_backend("vkCreateSwapchainKHR")?;
        self.swapchain_loader = Some(swapchain_loader.clone());

        self.images = unsafe { swapchain_loader.get_swapchain_images(self.swapchain) }
            .or_backend("vkGetSwapchainImagesKHR")?;

        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { core.device.create_image_view(&create_info, None) }
                .or_backend("vkCreateImageView")?;
            self.image_views.push(view);
        }

        self.format = format;
        self.present_mode = present_mode(mode);
        self.extent = Extent::new(extent.width, extent.height);
        Ok(())
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn info(&self) -> SurfaceInfo {
        SurfaceInfo {
            backend: Backend::Vulkan,
            extent: self.extent,
            format: self.format,
            present_mode: Some(self.present_mode),
            image_count: self.images.len() as u32,
            presentable: true,
        }
    }
}

impl Drop for WindowSurface {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.core.device.destroy_image_view(view, None);
            }
            if let Some(loader) = &self.swapchain_loader {
                loader.destroy_swapchain(self.swapchain, None);
            }
            if let Some(loader) = &self.core.surface_loader {
                loader.destroy_surface(self.surface, None);
            }
        }
    }
}

/// Requested format if offered, else the first offered format glimmer can name
pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: SurfaceFormat,
) -> Result<(vk::SurfaceFormatKHR, SurfaceFormat)> {
    let wanted = vk_format(preferred);
    formats
        .iter()
        .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .map(|f| (*f, preferred))
        .or_else(|| {
            formats
                .iter()
                .find_map(|f| surface_format(f.format).map(|known| (*f, known)))
        })
        .ok_or_else(|| {
            Error::backend(
                Backend::Vulkan,
                OPERATION,
                Some(vk::Result::ERROR_FORMAT_NOT_SUPPORTED.as_raw()),
                "no supported surface format",
            )
        })
}

/// Requested mode if offered, else FIFO (always supported)
pub(crate) fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: PresentMode,
) -> vk::PresentModeKHR {
    let wanted = vk_present_mode(preferred);
    modes
        .iter()
        .copied()
        .find(|&mode| mode == wanted)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface extent if the surface fixes one, else the request clamped to the
/// supported range. A zero-sized surface (minimized window) cannot hold a
/// swapchain.
pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: Extent) -> Result<vk::Extent2D> {
    let extent = if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: requested
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: requested
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    };

    if extent.width == 0 || extent.height == 0 {
        return Err(Error::backend(
            Backend::Vulkan,
            OPERATION,
            None,
            format!("surface extent is {}x{} (window minimized?)", extent.width, extent.height),
        ));
    }
    Ok(extent)
}

/// Color attachment, plus transfer destination when the surface allows it
pub(crate) fn choose_image_usage(caps: &vk::SurfaceCapabilitiesKHR) -> vk::ImageUsageFlags {
    (vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST) & caps.supported_usage_flags
}

/// Clamp to [min, max]; a max of 0 means unbounded
pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let mut count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 && count > caps.max_image_count {
        count = caps.max_image_count;
    }
    count
}
