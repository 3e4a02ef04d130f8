/// VulkanBuffer - Vulkan implementation of the Buffer trait
///
/// Host-visible buffer (uniform, storage, vertex or index data) written
/// directly through its persistent mapping.

use ash::vk::{self, Handle};
use engine_core::ecore::render::{Buffer, BufferHandle};
use engine_core::ecore::{Error, Result};
use engine_core::{engine_bail_err, engine_err, engine_error};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::vulkan_context::VulkanContext;

const SOURCE: &str = "ecore::vulkan";

/// Vulkan buffer implementation
pub struct VulkanBuffer {
    /// Shared context (device, allocator)
    ctx: Arc<VulkanContext>,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    /// Buffer size
    size: u64,
}

impl VulkanBuffer {
    pub(crate) fn new(
        ctx: Arc<VulkanContext>,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Self> {
        if size == 0 {
            engine_bail_err!(SOURCE, Error::InvalidResource(format!("Buffer '{}' has a size of 0", name)));
        }

        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage | vk::BufferUsageFlags::TRANSFER_DST)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create buffer '{}' of {} bytes: {:?}", name, size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let allocation = {
                let mut allocator = match ctx.allocator.lock() {
                    Ok(allocator) => allocator,
                    Err(_) => {
                        ctx.device.destroy_buffer(buffer, None);
                        return Err(engine_err!(SOURCE, "GPU allocator lock poisoned"));
                    }
                };
                allocator.allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
            };
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(_) => {
                    ctx.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!(SOURCE, "Out of GPU memory for buffer '{}' (required: {:.2} MB)", name, size_mb);
                    return Err(Error::OutOfMemory);
                }
            };

            // Owned from here on: Drop releases both on the error path
            let vulkan_buffer = Self {
                ctx,
                buffer,
                allocation: Some(allocation),
                size,
            };
            if let Some(allocation) = &vulkan_buffer.allocation {
                vulkan_buffer.ctx.device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                    .map_err(|e| engine_err!(SOURCE, "Failed to bind memory of buffer '{}': {:?}", name, e))?;
            }
            vulkan_buffer.ctx.set_object_name(buffer, name);

            Ok(vulkan_buffer)
        }
    }

    /// Write `data` at `offset` through the persistent mapping
    pub fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let in_range = offset
            .checked_add(data.len() as u64)
            .is_some_and(|end| end <= self.size);
        if !in_range {
            engine_bail_err!(SOURCE, Error::InvalidResource(format!(
                "Buffer update out of range (offset {}, {} bytes, buffer size {})",
                offset,
                data.len(),
                self.size
            )));
        }

        let Some(allocation) = &self.allocation else {
            engine_error!(SOURCE, "Buffer update failed: no GPU allocation");
            return Err(Error::BackendError("Buffer has no allocation".to_string()));
        };
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| engine_err!(SOURCE, "Buffer is not CPU-accessible"))?
            .as_ptr() as *mut u8;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr.add(offset as usize), data.len());
        }
        Ok(())
    }
}

impl Buffer for VulkanBuffer {
    fn handle(&self) -> BufferHandle {
        BufferHandle::from_raw(self.buffer.as_raw())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            // Free GPU memory
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if lock fails - we still need to destroy the buffer
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }

            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
