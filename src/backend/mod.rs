// Backend module - concrete drivers
//
// Which one to use is the application's call; nothing here probes or ranks
// backends.

pub mod null;
pub mod vulkan;

pub use null::NullDriver;
pub use vulkan::{VulkanDriver, VulkanDriverConfig};
