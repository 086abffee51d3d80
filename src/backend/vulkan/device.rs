// Vulkan core - instance, device, queue and command pool
//
// Responsibilities:
// - Instance creation with window-system extensions and validation layers
// - Physical device selection (prefer discrete GPU, require a graphics queue)
// - Logical device with every available device extension (configurable)
// - Command pool on the graphics queue family
//
// Bring-up goes through `PartialCore`, whose Drop releases whatever was
// created when a later step fails.

use super::{VkResultExt, VulkanDriverConfig};
use crate::driver::Backend;
use crate::error::{Error, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

pub(crate) const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Everything `init_driver` brings up. Shared with surfaces through `Arc`,
/// so the device outlives every swapchain and image created from it.
pub struct VulkanCore {
    pub(crate) device: ash::Device,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) instance: ash::Instance,
    pub(crate) entry: Entry,

    pub(crate) graphics_queue: vk::Queue,
    pub(crate) graphics_queue_family: u32,
    pub(crate) command_pool: vk::CommandPool,

    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    /// Present only when VK_KHR_surface was enabled on the instance
    pub(crate) surface_loader: Option<khr::Surface>,
    pub(crate) device_extensions: Vec<CString>,

    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanCore {
    pub fn new(config: &VulkanDriverConfig) -> Result<Self> {
        log::info!("Creating Vulkan core: {}", config.app_name);

        let entry = unsafe { Entry::load() }.map_err(|e| {
            Error::backend(
                Backend::Vulkan,
                "load Vulkan library",
                None,
                format!("{e}. Is Vulkan installed?"),
            )
        })?;

        let mut partial = PartialCore::new(entry);

        let validation = config.validation && validation_layer_available(&partial.entry);
        let instance_extensions = instance_extension_names(config, validation)?;
        partial.create_instance(config, validation, &instance_extensions)?;

        if validation {
            partial.setup_debug_messenger()?;
        }

        let instance = partial.instance()?.clone();
        let physical_devices =
            unsafe { instance.enumerate_physical_devices() }.or_backend("enumerate physical devices")?;

        let candidates = physical_devices
            .iter()
            .map(|&pd| DeviceCandidate::query(&instance, pd))
            .collect::<Vec<_>>();
        let (index, graphics_queue_family) = select_device(&candidates, config.preferred_device)?;
        let physical_device = physical_devices[index];

        let device_extensions =
            device_extension_names(&instance, physical_device, config.enable_all_device_extensions)?;
        partial.create_logical_device(physical_device, graphics_queue_family, &device_extensions)?;
        partial.create_command_pool(graphics_queue_family)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!("Selected GPU: {}", candidates[index].name);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::debug!("Enabled {} device extensions", device_extensions.len());

        let surface_loader = instance_extensions
            .iter()
            .any(|name| name.as_c_str() == khr::Surface::name())
            .then(|| khr::Surface::new(&partial.entry, &instance));

        partial.finish(
            physical_device,
            graphics_queue_family,
            surface_loader,
            device_extensions,
            properties,
            memory_properties,
        )
    }

    pub fn device_name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn graphics_queue(&self) -> (vk::Queue, u32) {
        (self.graphics_queue, self.graphics_queue_family)
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn has_device_extension(&self, name: &CStr) -> bool {
        self.device_extensions.iter().any(|ext| ext.as_c_str() == name)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.or_backend("vkDeviceWaitIdle")
    }
}

impl Drop for VulkanCore {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan core...");
        let _ = self.wait_idle();

        // Reverse order of creation
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Native handles created so far during bring-up
struct PartialCore {
    entry: Entry,
    instance: Option<ash::Instance>,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    device: Option<(ash::Device, vk::Queue)>,
    command_pool: Option<vk::CommandPool>,
}

impl PartialCore {
    fn new(entry: Entry) -> Self {
        Self {
            entry,
            instance: None,
            debug_utils: None,
            device: None,
            command_pool: None,
        }
    }

    fn instance(&self) -> Result<&ash::Instance> {
        self.instance
            .as_ref()
            .ok_or_else(|| Error::invalid_state("Vulkan instance not created"))
    }

    fn create_instance(
        &mut self,
        config: &VulkanDriverConfig,
        validation: bool,
        extensions: &[CString],
    ) -> Result<()> {
        let app_name = CString::new(config.app_name.as_str())
            .map_err(|_| Error::invalid_argument("application name contains a NUL byte"))?;
        let engine_name = c"glimmer";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(config.api_version);

        let extension_ptrs = extensions.iter().map(|e| e.as_ptr()).collect::<Vec<_>>();
        let layer_names: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { self.entry.create_instance(&create_info, None) }
            .or_backend("vkCreateInstance")?;
        self.instance = Some(instance);
        Ok(())
    }

    fn setup_debug_messenger(&mut self) -> Result<()> {
        let debug_utils = DebugUtils::new(&self.entry, self.instance()?);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .or_backend("vkCreateDebugUtilsMessengerEXT")?;
        self.debug_utils = Some((debug_utils, messenger));
        Ok(())
    }

    fn create_logical_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
        extensions: &[CString],
    ) -> Result<()> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extension_ptrs = extensions.iter().map(|e| e.as_ptr()).collect::<Vec<_>>();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extension_ptrs);

        let device = unsafe { self.instance()?.create_device(physical_device, &create_info, None) }
            .or_backend("vkCreateDevice")?;
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        self.device = Some((device, graphics_queue));
        Ok(())
    }

    fn create_command_pool(&mut self, graphics_queue_family: u32) -> Result<()> {
        let (device, _) = self
            .device
            .as_ref()
            .ok_or_else(|| Error::invalid_state("Vulkan device not created"))?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.create_command_pool(&pool_info, None) }
            .or_backend("vkCreateCommandPool")?;
        self.command_pool = Some(pool);
        Ok(())
    }

    fn finish(
        mut self,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
        surface_loader: Option<khr::Surface>,
        device_extensions: Vec<CString>,
        properties: vk::PhysicalDeviceProperties,
        memory_properties: vk::PhysicalDeviceMemoryProperties,
    ) -> Result<VulkanCore> {
        let incomplete = || Error::invalid_state("Vulkan bring-up incomplete");
        if self.instance.is_none() || self.device.is_none() || self.command_pool.is_none() {
            return Err(incomplete());
        }

        let command_pool = self.command_pool.take().ok_or_else(incomplete)?;
        let (device, graphics_queue) = self.device.take().ok_or_else(incomplete)?;
        let instance = self.instance.take().ok_or_else(incomplete)?;

        Ok(VulkanCore {
            device,
            physical_device,
            instance,
            entry: self.entry.clone(),
            graphics_queue,
            graphics_queue_family,
            command_pool,
            debug_utils: self.debug_utils.take(),
            surface_loader,
            device_extensions,
            properties,
            memory_properties,
        })
    }
}

impl Drop for PartialCore {
    fn drop(&mut self) {
        if self.instance.is_none() {
            return;
        }
        log::debug!("Releasing partially initialized Vulkan handles");

        unsafe {
            if let Some((device, _)) = self.device.take() {
                if let Some(pool) = self.command_pool.take() {
                    device.destroy_command_pool(pool, None);
                }
                device.destroy_device(None);
            }
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            if let Some(instance) = self.instance.take() {
                instance.destroy_instance(None);
            }
        }
    }
}

fn validation_layer_available(entry: &Entry) -> bool {
    let layers = match entry.enumerate_instance_layer_properties() {
        Ok(layers) => layers,
        Err(e) => {
            log::warn!("Could not enumerate instance layers ({:?}), validation disabled", e);
            return false;
        }
    };

    let available = layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
    if !available {
        log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
    }
    available
}

fn instance_extension_names(config: &VulkanDriverConfig, validation: bool) -> Result<Vec<CString>> {
    let mut names = config
        .instance_extensions
        .iter()
        .map(|name| {
            CString::new(name.as_str()).map_err(|_| {
                Error::invalid_argument(format!("instance extension {name:?} contains a NUL byte"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if validation && !names.iter().any(|n| n.as_c_str() == DebugUtils::name()) {
        names.push(DebugUtils::name().to_owned());
    }
    Ok(names)
}

fn device_extension_names(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    enable_all: bool,
) -> Result<Vec<CString>> {
    let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .or_backend("vkEnumerateDeviceExtensionProperties")?;

    let names = available
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned());

    if enable_all {
        Ok(names.collect())
    } else {
        Ok(names.filter(|name| name.as_c_str() == khr::Swapchain::name()).collect())
    }
}

/// What device selection needs to know about a physical device
#[derive(Debug, Clone)]
pub(crate) struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_flags: Vec<vk::QueueFlags>,
}

impl DeviceCandidate {
    fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        Self {
            name: unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            device_type: props.device_type,
            queue_flags: families.iter().map(|f| f.queue_flags).collect(),
        }
    }

    pub fn graphics_family(&self) -> Option<u32> {
        self.queue_flags
            .iter()
            .position(|flags| flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32)
    }

    pub fn score(&self) -> u32 {
        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
            _ => 1,
        }
    }
}

/// Pick a device and its graphics queue family.
///
/// With `preferred` set, only that index is considered. Otherwise the
/// highest scoring device with a graphics queue wins; ties go to the
/// lower index.
pub(crate) fn select_device(
    candidates: &[DeviceCandidate],
    preferred: Option<usize>,
) -> Result<(usize, u32)> {
    const OPERATION: &str = "select physical device";

    if candidates.is_empty() {
        return Err(Error::backend(
            Backend::Vulkan,
            OPERATION,
            None,
            "no suitable physical device: none enumerated",
        ));
    }

    if let Some(index) = preferred {
        let candidate = candidates.get(index).ok_or_else(|| {
            Error::backend(
                Backend::Vulkan,
                OPERATION,
                None,
                format!("preferred device {index} not present ({} enumerated)", candidates.len()),
            )
        })?;
        let family = candidate.graphics_family().ok_or_else(|| {
            Error::backend(
                Backend::Vulkan,
                OPERATION,
                None,
                format!("preferred device `{}` has no graphics queue family", candidate.name),
            )
        })?;
        return Ok((index, family));
    }

    let mut best: Option<(usize, u32, u32)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let Some(family) = candidate.graphics_family() else {
            log::warn!("Skipping physical device `{}`: no graphics queue", candidate.name);
            continue;
        };
        let score = candidate.score();
        if best.map_or(true, |(_, _, best_score)| score > best_score) {
            best = Some((index, family, score));
        }
    }

    best.map(|(index, family, _)| (index, family)).ok_or_else(|| {
        Error::backend(
            Backend::Vulkan,
            OPERATION,
            None,
            format!(
                "no suitable physical device: none of {} exposes a graphics queue family",
                candidates.len()
            ),
        )
    })
}

// Validation layer messages go to the log
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, device_type: vk::PhysicalDeviceType, queues: &[vk::QueueFlags]) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            device_type,
            queue_flags: queues.to_vec(),
        }
    }

    #[test]
    fn zero_devices_is_backend_failure() {
        let err = select_device(&[], None).unwrap_err();
        match err {
            Error::BackendFailure { backend, message, .. } => {
                assert_eq!(backend, Backend::Vulkan);
                assert!(message.contains("no suitable physical device"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn devices_without_graphics_queue_are_skipped() {
        let compute_only = candidate(
            "compute",
            vk::PhysicalDeviceType::DISCRETE_GPU,
            &[vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER],
        );
        let err = select_device(&[compute_only.clone()], None).unwrap_err();
        assert!(err.to_string().contains("no suitable physical device"));

        let integrated = candidate(
            "igpu",
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            &[vk::QueueFlags::TRANSFER, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE],
        );
        assert_eq!(select_device(&[compute_only, integrated], None).unwrap(), (1, 1));
    }

    #[test]
    fn discrete_gpu_beats_integrated() {
        let devices = [
            candidate("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU, &[vk::QueueFlags::GRAPHICS]),
            candidate("cpu", vk::PhysicalDeviceType::CPU, &[vk::QueueFlags::GRAPHICS]),
            candidate("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU, &[vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS]),
        ];
        assert_eq!(select_device(&devices, None).unwrap(), (2, 1));
    }

    #[test]
    fn equal_scores_keep_first_device() {
        let devices = [
            candidate("a", vk::PhysicalDeviceType::INTEGRATED_GPU, &[vk::QueueFlags::GRAPHICS]),
            candidate("b", vk::PhysicalDeviceType::INTEGRATED_GPU, &[vk::QueueFlags::GRAPHICS]),
        ];
        assert_eq!(select_device(&devices, None).unwrap(), (0, 0));
    }

    #[test]
    fn preferred_device_overrides_scoring() {
        let devices = [
            candidate("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU, &[vk::QueueFlags::GRAPHICS]),
            candidate("cpu", vk::PhysicalDeviceType::CPU, &[vk::QueueFlags::GRAPHICS]),
        ];
        assert_eq!(select_device(&devices, Some(1)).unwrap(), (1, 0));
        assert!(matches!(
            select_device(&devices, Some(5)),
            Err(Error::BackendFailure { .. })
        ));

        let no_graphics = [candidate("c", vk::PhysicalDeviceType::CPU, &[vk::QueueFlags::COMPUTE])];
        assert!(select_device(&no_graphics, Some(0)).is_err());
    }
}
