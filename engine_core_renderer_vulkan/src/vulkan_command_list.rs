/// VulkanCommandList - Vulkan implementation of the CommandList trait
///
/// Records into one primary command buffer allocated from its own pool.
/// Rendering uses dynamic rendering and barriers use synchronization2.
/// Submitting the recorded buffer is left to the application.

use ash::vk::{self, Handle};
use engine_core::ecore::render::{
    BufferHandle, CommandList, DescriptorSetHandle, ImageBarrier, IndexType, PipelineBindPoint,
    PipelineHandle, PipelineLayoutHandle, Rect2D, RenderingInfo, ShaderStageFlags, Viewport,
};
use engine_core::ecore::{Error, Result};
use engine_core::engine_error;
use std::sync::Arc;

use crate::vulkan_context::VulkanContext;
use crate::vulkan_convert::*;

const SOURCE: &str = "ecore::vulkan";

/// Vulkan command list implementation
pub struct VulkanCommandList {
    ctx: Arc<VulkanContext>,
    /// Command pool owning the command buffer
    command_pool: vk::CommandPool,
    /// Command buffer for recording
    command_buffer: vk::CommandBuffer,
    /// Whether the command list is currently recording
    is_recording: bool,
    /// Whether we're inside a begin/end rendering span
    in_rendering: bool,
}

impl VulkanCommandList {
    pub(crate) fn new(ctx: Arc<VulkanContext>) -> Result<Self> {
        unsafe {
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = ctx.device.create_command_pool(&command_pool_create_info, None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create command pool: {:?}", e);
                    Error::BackendError(format!("Failed to create command pool: {:?}", e))
                })?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffers = match ctx.device.allocate_command_buffers(&allocate_info) {
                Ok(command_buffers) => command_buffers,
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    engine_error!(SOURCE, "Failed to allocate command buffer: {:?}", e);
                    return Err(Error::BackendError(format!("Failed to allocate command buffer: {:?}", e)));
                }
            };

            Ok(Self {
                ctx,
                command_pool,
                command_buffer: command_buffers[0],
                is_recording: false,
                in_rendering: false,
            })
        }
    }

    /// Get the underlying Vulkan command buffer
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn in_rendering(&self) -> bool {
        self.in_rendering
    }

    fn check_recording(&self) -> Result<()> {
        if !self.is_recording {
            return Err(Error::BackendError("Command list not recording".to_string()));
        }
        Ok(())
    }

    fn check_in_rendering(&self) -> Result<()> {
        self.check_recording()?;
        if !self.in_rendering {
            return Err(Error::BackendError("Not inside a rendering span".to_string()));
        }
        Ok(())
    }

    fn check_outside_rendering(&self, command: &str) -> Result<()> {
        self.check_recording()?;
        if self.in_rendering {
            return Err(Error::BackendError(format!("{} is not allowed inside a rendering span", command)));
        }
        Ok(())
    }
}

impl CommandList for VulkanCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(Error::BackendError("Command list already recording".to_string()));
        }

        unsafe {
            self.ctx.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| Error::BackendError(format!("Failed to reset command buffer: {:?}", e)))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            self.ctx.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| Error::BackendError(format!("Failed to begin command buffer: {:?}", e)))?;
        }

        self.is_recording = true;
        self.in_rendering = false;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.check_recording()?;
        if self.in_rendering {
            return Err(Error::BackendError("Rendering not ended before ending command list".to_string()));
        }

        unsafe {
            self.ctx.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| Error::BackendError(format!("Failed to end command buffer: {:?}", e)))?;
        }

        self.is_recording = false;
        Ok(())
    }

    fn bind_pipeline(&mut self, bind_point: PipelineBindPoint, pipeline: PipelineHandle) -> Result<()> {
        self.check_recording()?;
        unsafe {
            self.ctx.device.cmd_bind_pipeline(
                self.command_buffer,
                bind_point_to_vk(bind_point),
                vk::Pipeline::from_raw(pipeline.as_raw()),
            );
        }
        Ok(())
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) -> Result<()> {
        self.check_recording()?;

        let vk_sets: Vec<vk::DescriptorSet> = sets
            .iter()
            .map(|set| vk::DescriptorSet::from_raw(set.as_raw()))
            .collect();

        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                bind_point_to_vk(bind_point),
                vk::PipelineLayout::from_raw(layout.as_raw()),
                first_set,
                &vk_sets,
                &[], // dynamic_offsets
            );
        }
        Ok(())
    }

    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.check_recording()?;
        unsafe {
            self.ctx.device.cmd_push_constants(
                self.command_buffer,
                vk::PipelineLayout::from_raw(layout.as_raw()),
                stage_flags_to_vk(stages),
                offset,
                data,
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) -> Result<()> {
        self.check_recording()?;
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(
                self.command_buffer,
                binding,
                &[vk::Buffer::from_raw(buffer.as_raw())],
                &[offset],
            );
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) -> Result<()> {
        self.check_recording()?;
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(
                self.command_buffer,
                vk::Buffer::from_raw(buffer.as_raw()),
                offset,
                index_type_to_vk(index_type),
            );
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.check_recording()?;
        unsafe {
            self.ctx.device.cmd_set_viewport(self.command_buffer, 0, &[viewport_to_vk(viewport)]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: &Rect2D) -> Result<()> {
        self.check_recording()?;
        unsafe {
            self.ctx.device.cmd_set_scissor(self.command_buffer, 0, &[rect_to_vk(scissor)]);
        }
        Ok(())
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.check_in_rendering()?;
        unsafe {
            self.ctx.device.cmd_draw(
                self.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.check_in_rendering()?;
        unsafe {
            self.ctx.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
        Ok(())
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()> {
        self.check_outside_rendering("dispatch")?;
        unsafe {
            self.ctx.device.cmd_dispatch(self.command_buffer, group_count_x, group_count_y, group_count_z);
        }
        Ok(())
    }

    fn pipeline_barrier(&mut self, barriers: &[ImageBarrier]) -> Result<()> {
        self.check_outside_rendering("pipeline barrier")?;
        if barriers.is_empty() {
            return Ok(());
        }

        let image_barriers: Vec<vk::ImageMemoryBarrier2> = barriers
            .iter()
            .map(|barrier| {
                vk::ImageMemoryBarrier2::default()
                    .src_stage_mask(pipeline_stage_to_vk(barrier.src_stage))
                    .src_access_mask(access_to_vk(barrier.src_access))
                    .dst_stage_mask(pipeline_stage_to_vk(barrier.dst_stage))
                    .dst_access_mask(access_to_vk(barrier.dst_access))
                    .old_layout(image_layout_to_vk(barrier.old_layout))
                    .new_layout(image_layout_to_vk(barrier.new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(vk::Image::from_raw(barrier.image.as_raw()))
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: aspect_to_vk(barrier.aspect),
                        base_mip_level: barrier.base_mip_level,
                        level_count: barrier.level_count,
                        base_array_layer: barrier.base_array_layer,
                        layer_count: barrier.layer_count,
                    })
            })
            .collect();

        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&image_barriers);
        unsafe {
            self.ctx.device.cmd_pipeline_barrier2(self.command_buffer, &dependency_info);
        }
        Ok(())
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()> {
        self.check_outside_rendering("begin rendering")?;

        let color_attachments: Vec<vk::RenderingAttachmentInfo> =
            info.color_attachments.iter().map(attachment_to_vk).collect();
        let depth_attachment = info.depth_attachment.as_ref().map(attachment_to_vk);
        let stencil_attachment = info.stencil_attachment.as_ref().map(attachment_to_vk);

        let mut rendering_info = vk::RenderingInfo::default()
            .flags(rendering_flags_to_vk(info.flags))
            .render_area(rect_to_vk(&info.render_area))
            .layer_count(info.layer_count)
            .view_mask(info.view_mask)
            .color_attachments(&color_attachments);
        if let Some(depth) = &depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        if let Some(stencil) = &stencil_attachment {
            rendering_info = rendering_info.stencil_attachment(stencil);
        }

        unsafe {
            self.ctx.device.cmd_begin_rendering(self.command_buffer, &rendering_info);
        }
        self.in_rendering = true;
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        self.check_in_rendering()?;
        unsafe {
            self.ctx.device.cmd_end_rendering(self.command_buffer);
        }
        self.in_rendering = false;
        Ok(())
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees the command buffer
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
