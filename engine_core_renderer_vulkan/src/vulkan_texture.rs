/// VulkanTexture - Vulkan implementation of the Texture trait
///
/// Single-mip 2D image in device memory with a view over all of its aspects.

use ash::vk::{self, Handle};
use engine_core::ecore::render::{Format, ImageHandle, ImageViewHandle, Texture};
use engine_core::ecore::{Error, Result};
use engine_core::{engine_bail_err, engine_err, engine_error};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::vulkan_context::VulkanContext;
use crate::vulkan_convert::{format_aspect, format_to_vk};

const SOURCE: &str = "ecore::vulkan";

/// Vulkan texture implementation
pub struct VulkanTexture {
    ctx: Arc<VulkanContext>,
    /// Vulkan image
    pub(crate) image: vk::Image,
    /// Vulkan image view (null until created)
    pub(crate) view: vk::ImageView,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    format: Format,
    width: u32,
    height: u32,
}

impl VulkanTexture {
    pub(crate) fn new(
        ctx: Arc<VulkanContext>,
        width: u32,
        height: u32,
        format: Format,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> Result<Self> {
        if width == 0 || height == 0 || format == Format::Undefined {
            engine_bail_err!(SOURCE, Error::InvalidResource(format!(
                "Texture '{}': invalid size {}x{} or undefined format",
                name, width, height
            )));
        }

        let vk_format = format_to_vk(format);

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(vk_format)
                .extent(vk::Extent3D { width, height, depth: 1 })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create texture image '{}': {:?}", name, e))?;

            let requirements = ctx.device.get_image_memory_requirements(image);
            let allocation = match ctx.allocator.lock() {
                Ok(mut allocator) => allocator.allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                }).ok(),
                Err(_) => None,
            };
            let Some(allocation) = allocation else {
                ctx.device.destroy_image(image, None);
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                engine_error!(SOURCE, "Out of GPU memory for texture '{}' ({}x{}, {:.2} MB)", name, width, height, size_mb);
                return Err(Error::OutOfMemory);
            };

            // Owned from here on: Drop releases whatever was created
            let mut texture = Self {
                ctx,
                image,
                view: vk::ImageView::null(),
                allocation: Some(allocation),
                format,
                width,
                height,
            };

            if let Some(allocation) = &texture.allocation {
                texture.ctx.device
                    .bind_image_memory(image, allocation.memory(), allocation.offset())
                    .map_err(|e| engine_err!(SOURCE, "Failed to bind memory of texture '{}': {:?}", name, e))?;
            }

            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(vk_format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: format_aspect(format),
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            texture.view = texture.ctx.device.create_image_view(&view_create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create view of texture '{}': {:?}", name, e))?;

            texture.ctx.set_object_name(image, name);
            texture.ctx.set_object_name(texture.view, name);

            Ok(texture)
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Texture for VulkanTexture {
    fn image(&self) -> ImageHandle {
        ImageHandle::from_raw(self.image.as_raw())
    }

    fn view(&self) -> ImageViewHandle {
        ImageViewHandle::from_raw(self.view.as_raw())
    }

    fn format(&self) -> Format {
        self.format
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.ctx.device.destroy_image_view(self.view, None);
            }

            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }

            self.ctx.device.destroy_image(self.image, None);
        }
    }
}
