/*!
# Engine Core - Vulkan Backend

Vulkan implementation of the engine core pipeline layer.

This crate implements the `Device` and `CommandList` traits of `engine_core`
with the Ash library for Vulkan bindings, and gpu-allocator for the memory of
the buffers and textures it creates.

Instance and device are created headless (no surface, no swapchain): the
backend only builds pipelines, descriptor sets and command buffers. Presenting
and submitting are left to the application.

## Example

```no_run
use engine_core::ecore::render::Config;
use engine_core_renderer_vulkan::{VulkanContext, VulkanDevice};

let ctx = VulkanContext::new(&Config::default())?;
let device = VulkanDevice::new(ctx);
let mut cmd = device.create_command_list()?;
# Ok::<(), engine_core::ecore::Error>(())
```
*/

// Vulkan implementation modules
mod vulkan_context;
mod vulkan_convert;
mod vulkan_device;
mod vulkan_command_list;
mod vulkan_shader;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_sampler;
#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
mod debug;

pub use vulkan_context::VulkanContext;
pub use vulkan_device::VulkanDevice;
pub use vulkan_command_list::VulkanCommandList;
pub use vulkan_shader::VulkanShader;
pub use vulkan_buffer::VulkanBuffer;
pub use vulkan_texture::VulkanTexture;
pub use vulkan_sampler::{VulkanSampler, SamplerPreset};

// Re-export debug utilities
pub use debug::{get_validation_stats, print_validation_stats_report};
