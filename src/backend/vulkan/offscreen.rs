// Offscreen surfaces - render targets with no presentation engine
//
// One device-local color image plus view per requested image. Handles are
// recorded as soon as they exist, so Drop cleans up a half-built surface.

use super::{vk_format, VkResultExt, VulkanCore};
use crate::driver::Backend;
use crate::error::{Error, Result};
use crate::surface::{Extent, SurfaceConfig, SurfaceFormat, SurfaceInfo};
use ash::vk;
use std::sync::Arc;

pub struct OffscreenSurface {
    views: Vec<vk::ImageView>,
    images: Vec<vk::Image>,
    memory: Vec<vk::DeviceMemory>,
    extent: Extent,
    format: SurfaceFormat,
    core: Arc<VulkanCore>,
}

impl OffscreenSurface {
    pub fn new(core: Arc<VulkanCore>, config: &SurfaceConfig) -> Result<Self> {
        let format = vk_format(config.format);
        log::debug!(
            "Creating offscreen surface: {} x{} {:?}",
            config.extent,
            config.image_count,
            format
        );

        let props = unsafe {
            core.instance
                .get_physical_device_format_properties(core.physical_device, format)
        };
        if !props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::COLOR_ATTACHMENT)
        {
            return Err(Error::backend(
                Backend::Vulkan,
                "create offscreen surface",
                Some(vk::Result::ERROR_FORMAT_NOT_SUPPORTED.as_raw()),
                format!("{:?} cannot be used as a color attachment", format),
            ));
        }

        let mut surface = Self {
            views: Vec::new(),
            images: Vec::new(),
            memory: Vec::new(),
            extent: config.extent,
            format: config.format,
            core,
        };

        for _ in 0..config.image_count {
            surface.push_image(format)?;
        }
        Ok(surface)
    }

    fn push_image(&mut self, format: vk::Format) -> Result<()> {
        let device = &self.core.device;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.create_image(&image_info, None) }.or_backend("vkCreateImage")?;
        self.images.push(image);

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = find_memory_type(
            &self.core.memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory =
            unsafe { device.allocate_memory(&alloc_info, None) }.or_backend("vkAllocateMemory")?;
        self.memory.push(memory);

        unsafe { device.bind_image_memory(image, memory, 0) }.or_backend("vkBindImageMemory")?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view =
            unsafe { device.create_image_view(&view_info, None) }.or_backend("vkCreateImageView")?;
        self.views.push(view);
        Ok(())
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn info(&self) -> SurfaceInfo {
        SurfaceInfo {
            backend: Backend::Vulkan,
            extent: self.extent,
            format: self.format,
            present_mode: None,
            image_count: self.images.len() as u32,
            presentable: false,
        }
    }
}

impl Drop for OffscreenSurface {
    fn drop(&mut self) {
        let device = &self.core.device;
        unsafe {
            for &view in &self.views {
                device.destroy_image_view(view, None);
            }
            for &image in &self.images {
                device.destroy_image(image, None);
            }
            for &memory in &self.memory {
                device.free_memory(memory, None);
            }
        }
    }
}

/// Find a memory type index allowed by `type_filter` with all of `properties`
pub(crate) fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    for i in 0..memory_properties.memory_type_count {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);

        if has_type && has_properties {
            return Ok(i);
        }
    }

    Err(Error::backend(
        Backend::Vulkan,
        "find memory type",
        None,
        format!("no memory type matches filter {type_filter:#b} with {properties:?}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &property_flags) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = property_flags;
        }
        props
    }

    #[test]
    fn memory_type_respects_filter_and_flags() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        assert_eq!(find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b100, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 2);
    }

    #[test]
    fn missing_memory_type_is_backend_failure() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let err = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap_err();
        assert!(matches!(err, Error::BackendFailure { backend: Backend::Vulkan, .. }));
    }
}
