// Vulkan driver - reference backend over ash
//
// Design: configuration is fixed when the driver is constructed
// (`VulkanDriverConfig`), bring-up happens in `init_driver`, and every native
// handle is owned here. Surfaces keep an `Arc<VulkanCore>`, so dropping the
// driver tears surfaces down before the device.

pub mod device;
pub mod offscreen;
pub mod swapchain;

pub use device::VulkanCore;

use crate::driver::{Backend, Capabilities, Driver};
use crate::error::{Error, Result};
use crate::surface::{PresentMode, SurfaceConfig, SurfaceFormat, SurfaceId, SurfaceInfo, SurfaceTarget};
use ash::vk;
use offscreen::OffscreenSurface;
use raw_window_handle::RawDisplayHandle;
use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::Arc;
use swapchain::WindowSurface;

/// Converts native results into `BackendFailure`, keeping the VkResult code
pub(crate) trait VkResultExt<T> {
    fn or_backend(self, operation: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn or_backend(self, operation: &'static str) -> Result<T> {
        self.map_err(|code| {
            Error::backend(Backend::Vulkan, operation, Some(code.as_raw()), format!("{code:?}"))
        })
    }
}

/// Settings the Vulkan driver is constructed with
#[derive(Debug, Clone, PartialEq)]
pub struct VulkanDriverConfig {
    pub app_name: String,
    /// Packed Vulkan version (`vk::make_api_version`)
    pub api_version: u32,
    /// Enable VK_LAYER_KHRONOS_validation when it is installed
    pub validation: bool,
    /// Instance extensions, including the window system's required list
    pub instance_extensions: Vec<String>,
    /// Enable every extension the device exposes (otherwise only swapchain)
    pub enable_all_device_extensions: bool,
    /// Skip scoring and use this physical device index
    pub preferred_device: Option<usize>,
}

impl Default for VulkanDriverConfig {
    fn default() -> Self {
        Self {
            app_name: "glimmer".to_string(),
            api_version: vk::API_VERSION_1_2,
            validation: cfg!(debug_assertions),
            instance_extensions: Vec::new(),
            enable_all_device_extensions: true,
            preferred_device: None,
        }
    }
}

impl VulkanDriverConfig {
    pub fn with_instance_extension(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.instance_extensions.contains(&name) {
            self.instance_extensions.push(name);
        }
        self
    }

    /// Append the instance extensions the window system needs to present to
    /// windows on `display`.
    pub fn with_display(mut self, display: RawDisplayHandle) -> Result<Self> {
        let required = ash_window::enumerate_required_extensions(display)
            .or_backend("enumerate window-system extensions")?;

        for &ptr in required {
            let name = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
            self = self.with_instance_extension(name);
        }
        Ok(self)
    }
}

/// Backend data for one surface
enum VulkanSurface {
    Offscreen(OffscreenSurface),
    Window(WindowSurface),
}

impl VulkanSurface {
    fn info(&self) -> SurfaceInfo {
        match self {
            VulkanSurface::Offscreen(surface) => surface.info(),
            VulkanSurface::Window(surface) => surface.info(),
        }
    }
}

pub struct VulkanDriver {
    config: VulkanDriverConfig,
    // Declared before `core` so surfaces are released first
    surfaces: HashMap<SurfaceId, VulkanSurface>,
    core: Option<Arc<VulkanCore>>,
}

impl VulkanDriver {
    pub fn new(config: VulkanDriverConfig) -> Self {
        Self {
            config,
            surfaces: HashMap::new(),
            core: None,
        }
    }

    pub fn config(&self) -> &VulkanDriverConfig {
        &self.config
    }

    /// Adjust settings before activation. Changes apply on the next bring-up.
    pub fn config_mut(&mut self) -> &mut VulkanDriverConfig {
        &mut self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.core.is_some()
    }

    /// Native handles, for backend-specific extensions
    pub fn core(&self) -> Option<&VulkanCore> {
        self.core.as_deref()
    }

    pub fn device_name(&self) -> Option<String> {
        self.core.as_ref().map(|core| core.device_name())
    }

    /// Release every surface and the device so the next `init_driver`
    /// starts over with the current config.
    pub fn release(&mut self) {
        if !self.surfaces.is_empty() {
            log::warn!("Releasing {} Vulkan surfaces", self.surfaces.len());
        }
        self.surfaces.clear();
        self.core = None;
    }

    fn core_arc(&self) -> Result<Arc<VulkanCore>> {
        self.core
            .clone()
            .ok_or_else(|| Error::not_initialized("Vulkan driver has not been initialized"))
    }
}

impl Driver for VulkanDriver {
    fn backend(&self) -> Backend {
        Backend::Vulkan
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUIRED | Capabilities::SURFACES
    }

    fn init_driver(&mut self) -> Result<()> {
        if self.core.is_some() {
            log::debug!("Vulkan driver already initialized");
            return Ok(());
        }
        self.core = Some(Arc::new(VulkanCore::new(&self.config)?));
        Ok(())
    }

    fn create_surface(&mut self, id: SurfaceId, config: &SurfaceConfig) -> Result<()> {
        if self.surfaces.contains_key(&id) {
            return Err(Error::invalid_state(format!("{} already exists", id)));
        }
        let core = self.core_arc()?;

        let surface = match config.target {
            SurfaceTarget::Offscreen => VulkanSurface::Offscreen(OffscreenSurface::new(core, config)?),
            SurfaceTarget::Window(target) => {
                VulkanSurface::Window(WindowSurface::new(core, config, target)?)
            }
        };

        self.surfaces.insert(id, surface);
        Ok(())
    }

    fn destroy_surface(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self
            .surfaces
            .remove(&id)
            .ok_or_else(|| Error::invalid_state(format!("{} is unknown to the Vulkan driver", id)))?;
        drop(surface);
        Ok(())
    }

    fn surface_info(&self, id: SurfaceId) -> Result<SurfaceInfo> {
        self.surfaces
            .get(&id)
            .map(VulkanSurface::info)
            .ok_or_else(|| Error::invalid_state(format!("{} is unknown to the Vulkan driver", id)))
    }
}

pub(crate) fn vk_format(format: SurfaceFormat) -> vk::Format {
    match format {
        SurfaceFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        SurfaceFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        SurfaceFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        SurfaceFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        SurfaceFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
    }
}

pub(crate) fn surface_format(format: vk::Format) -> Option<SurfaceFormat> {
    match format {
        vk::Format::B8G8R8A8_SRGB => Some(SurfaceFormat::Bgra8Srgb),
        vk::Format::B8G8R8A8_UNORM => Some(SurfaceFormat::Bgra8Unorm),
        vk::Format::R8G8B8A8_SRGB => Some(SurfaceFormat::Rgba8Srgb),
        vk::Format::R8G8B8A8_UNORM => Some(SurfaceFormat::Rgba8Unorm),
        vk::Format::R16G16B16A16_SFLOAT => Some(SurfaceFormat::Rgba16Float),
        _ => None,
    }
}

pub(crate) fn vk_present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

pub(crate) fn present_mode(mode: vk::PresentModeKHR) -> PresentMode {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => PresentMode::Immediate,
        vk::PresentModeKHR::MAILBOX => PresentMode::Mailbox,
        vk::PresentModeKHR::FIFO_RELAXED => PresentMode::FifoRelaxed,
        _ => PresentMode::Fifo,
    }
}
