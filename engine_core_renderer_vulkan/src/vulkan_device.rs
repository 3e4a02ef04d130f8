/// VulkanDevice - Vulkan implementation of the Device trait
///
/// Turns the core's creation descriptors into Vulkan objects and hands back
/// their raw handles. Also the factory for the concrete resources (shaders,
/// buffers, textures, samplers) and command lists of this backend.

use ash::vk::{self, Handle};
use engine_core::ecore::render::{
    DescriptorPoolDesc, DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutDesc,
    DescriptorSetLayoutHandle, DescriptorType, DescriptorWrite, Device, Format, FormatFeature,
    ComputePipelineDesc, GraphicsPipelineDesc, PipelineHandle, PipelineLayoutDesc,
    PipelineLayoutHandle, RayTracingPipelineDesc, ResolvedDescriptor, ShaderGroup, ShaderStage,
    ShaderStageDesc,
};
use engine_core::ecore::{Error, Result};
use engine_core::{engine_bail, engine_bail_err, engine_debug, engine_err, engine_error};
use std::ffi::CString;
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_context::VulkanContext;
use crate::vulkan_convert::*;
use crate::vulkan_sampler::{SamplerPreset, VulkanSampler};
use crate::vulkan_shader::VulkanShader;
use crate::vulkan_texture::VulkanTexture;

const SOURCE: &str = "ecore::vulkan";

/// Vulkan device
///
/// Shared by pipelines through `Arc<dyn Device>`; every handle it returns
/// must be destroyed through it before the context goes away.
pub struct VulkanDevice {
    ctx: Arc<VulkanContext>,
}

impl VulkanDevice {
    pub fn new(ctx: Arc<VulkanContext>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    pub fn context(&self) -> &Arc<VulkanContext> {
        &self.ctx
    }

    // ===== RESOURCE FACTORY =====

    /// Create a shader module from SPIR-V bytes
    pub fn create_shader(
        &self,
        stage: ShaderStage,
        code: &[u8],
        entry_point: &str,
        name: &str,
    ) -> Result<Arc<VulkanShader>> {
        VulkanShader::new(Arc::clone(&self.ctx), stage, code, entry_point, name).map(Arc::new)
    }

    /// Create a host-visible buffer
    pub fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags, name: &str) -> Result<Arc<VulkanBuffer>> {
        VulkanBuffer::new(Arc::clone(&self.ctx), size, usage, name).map(Arc::new)
    }

    /// Create a 2D texture in device memory
    pub fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: Format,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> Result<Arc<VulkanTexture>> {
        VulkanTexture::new(Arc::clone(&self.ctx), width, height, format, usage, name).map(Arc::new)
    }

    pub fn create_sampler(&self, preset: SamplerPreset) -> Result<Arc<VulkanSampler>> {
        VulkanSampler::new(Arc::clone(&self.ctx), preset).map(Arc::new)
    }

    /// Create a primary command list with its own command pool
    pub fn create_command_list(&self) -> Result<VulkanCommandList> {
        VulkanCommandList::new(Arc::clone(&self.ctx))
    }

    // ===== DESCRIPTOR WRITES =====

    /// Native descriptor infos of one write, checked against its descriptor type
    fn write_payload(write: &DescriptorWrite) -> Result<WritePayload> {
        if write.descriptors.is_empty() {
            engine_bail_err!(SOURCE, Error::InvalidBinding(format!(
                "empty descriptor write at binding {}", write.binding
            )));
        }

        let mismatch = |descriptor: &ResolvedDescriptor| {
            let message = format!(
                "binding {} is declared {:?} but got {:?}",
                write.binding, write.descriptor_type, descriptor
            );
            engine_error!(SOURCE, "{}", message);
            Error::InvalidBinding(message)
        };

        let payload = match write.descriptor_type {
            DescriptorType::UniformBuffer | DescriptorType::StorageBuffer => WritePayload::Buffers(
                write.descriptors.iter().map(|descriptor| match *descriptor {
                    ResolvedDescriptor::Buffer { buffer, offset, range } => Ok(vk::DescriptorBufferInfo {
                        buffer: vk::Buffer::from_raw(buffer.as_raw()),
                        offset,
                        range,
                    }),
                    _ => Err(mismatch(descriptor)),
                }).collect::<Result<_>>()?,
            ),
            DescriptorType::StorageImage | DescriptorType::SampledImage => WritePayload::Images(
                write.descriptors.iter().map(|descriptor| match *descriptor {
                    ResolvedDescriptor::Image { view, layout, .. } => Ok(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: vk::ImageView::from_raw(view.as_raw()),
                        image_layout: image_layout_to_vk(layout),
                    }),
                    _ => Err(mismatch(descriptor)),
                }).collect::<Result<_>>()?,
            ),
            DescriptorType::CombinedImageSampler => WritePayload::Images(
                write.descriptors.iter().map(|descriptor| match *descriptor {
                    ResolvedDescriptor::Image { view, layout, sampler: Some(sampler) } => Ok(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::from_raw(sampler.as_raw()),
                        image_view: vk::ImageView::from_raw(view.as_raw()),
                        image_layout: image_layout_to_vk(layout),
                    }),
                    _ => Err(mismatch(descriptor)),
                }).collect::<Result<_>>()?,
            ),
            DescriptorType::Sampler => WritePayload::Images(
                write.descriptors.iter().map(|descriptor| match *descriptor {
                    ResolvedDescriptor::Sampler(sampler) => Ok(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::from_raw(sampler.as_raw()),
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    }),
                    _ => Err(mismatch(descriptor)),
                }).collect::<Result<_>>()?,
            ),
            DescriptorType::AccelerationStructure => WritePayload::AccelerationStructures(
                write.descriptors.iter().map(|descriptor| match *descriptor {
                    ResolvedDescriptor::AccelerationStructure(handle) => {
                        Ok(vk::AccelerationStructureKHR::from_raw(handle.as_raw()))
                    }
                    _ => Err(mismatch(descriptor)),
                }).collect::<Result<_>>()?,
            ),
        };
        Ok(payload)
    }
}

/// Native descriptor infos backing one `vk::WriteDescriptorSet`
enum WritePayload {
    Buffers(Vec<vk::DescriptorBufferInfo>),
    Images(Vec<vk::DescriptorImageInfo>),
    AccelerationStructures(Vec<vk::AccelerationStructureKHR>),
}

/// Owned data of one shader stage (entry point and specialization)
struct StageData {
    stage: vk::ShaderStageFlags,
    module: vk::ShaderModule,
    entry_point: CString,
    map_entries: Vec<vk::SpecializationMapEntry>,
    data: Vec<u8>,
}

impl StageData {
    fn new(desc: &ShaderStageDesc) -> Result<Self> {
        let entry_point = CString::new(desc.entry_point.as_str()).map_err(|_| {
            engine_error!(SOURCE, "Entry point '{}' contains a NUL byte", desc.entry_point);
            Error::InvalidConfiguration(format!("invalid entry point '{}'", desc.entry_point))
        })?;

        let map_entries = desc
            .specialization
            .entries
            .iter()
            .map(|entry| vk::SpecializationMapEntry {
                constant_id: entry.constant_id,
                offset: entry.offset,
                size: entry.size,
            })
            .collect();

        Ok(Self {
            stage: shader_stage_to_vk(desc.stage),
            module: vk::ShaderModule::from_raw(desc.module.as_raw()),
            entry_point,
            map_entries,
            data: desc.specialization.data.clone(),
        })
    }

    fn specialization_info(&self) -> vk::SpecializationInfo<'_> {
        vk::SpecializationInfo::default()
            .map_entries(&self.map_entries)
            .data(&self.data)
    }
}

/// Stage create infos; specialization is attached only when constants exist
fn stage_create_infos<'a>(
    stages: &'a [StageData],
    specializations: &'a [vk::SpecializationInfo<'a>],
) -> Vec<vk::PipelineShaderStageCreateInfo<'a>> {
    stages
        .iter()
        .zip(specializations)
        .map(|(stage, specialization)| {
            let info = vk::PipelineShaderStageCreateInfo::default()
                .stage(stage.stage)
                .module(stage.module)
                .name(&stage.entry_point);
            if stage.map_entries.is_empty() {
                info
            } else {
                info.specialization_info(specialization)
            }
        })
        .collect()
}

impl Device for VulkanDevice {
    fn supports_format(&self, format: Format, feature: FormatFeature) -> bool {
        if format == Format::Undefined {
            return false;
        }
        let properties = unsafe {
            self.ctx
                .instance
                .get_physical_device_format_properties(self.ctx.physical_device, format_to_vk(format))
        };
        match feature {
            FormatFeature::VertexBuffer => {
                properties.buffer_features.contains(vk::FormatFeatureFlags::VERTEX_BUFFER)
            }
            FormatFeature::ColorAttachment => {
                properties.optimal_tiling_features.contains(vk::FormatFeatureFlags::COLOR_ATTACHMENT)
            }
            FormatFeature::DepthStencilAttachment => properties
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT),
            FormatFeature::SampledImage => {
                properties.optimal_tiling_features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE)
            }
            FormatFeature::StorageImage => {
                properties.optimal_tiling_features.contains(vk::FormatFeatureFlags::STORAGE_IMAGE)
            }
        }
    }

    fn supports_ray_tracing(&self) -> bool {
        self.ctx.capabilities.ray_tracing
    }

    fn create_descriptor_set_layout(&self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle> {
        if !self.ctx.capabilities.ray_tracing
            && desc.bindings.iter().any(|b| b.descriptor_type == DescriptorType::AccelerationStructure)
        {
            engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                "{}: acceleration structure bindings need ray tracing support", desc.name
            )));
        }

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(descriptor_type_to_vk(binding.descriptor_type))
                    .descriptor_count(binding.count)
                    .stage_flags(stage_flags_to_vk(binding.stages))
            })
            .collect();

        // Sets may be bound with only part of their array elements written
        let binding_flags = vec![
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING;
            bindings.len()
        ];
        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default()
            .binding_flags(&binding_flags);

        let mut create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        if self.ctx.capabilities.descriptor_indexing && !bindings.is_empty() {
            create_info = create_info.push_next(&mut flags_info);
        }

        let layout = unsafe { self.ctx.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create {}: {:?}", desc.name, e))?;
        self.ctx.set_object_name(layout, &desc.name);

        Ok(DescriptorSetLayoutHandle::from_raw(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        unsafe {
            self.ctx
                .device
                .destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(layout.as_raw()), None);
        }
    }

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = desc
            .set_layouts
            .iter()
            .map(|layout| vk::DescriptorSetLayout::from_raw(layout.as_raw()))
            .collect();
        let push_constant_ranges: Vec<vk::PushConstantRange> = desc
            .push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: stage_flags_to_vk(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        let layout = unsafe { self.ctx.device.create_pipeline_layout(&create_info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create {}: {:?}", desc.name, e))?;
        self.ctx.set_object_name(layout, &desc.name);

        Ok(PipelineLayoutHandle::from_raw(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        unsafe {
            self.ctx
                .device
                .destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.as_raw()), None);
        }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        let config = desc.config;

        let stage_data = [StageData::new(&desc.vertex)?, StageData::new(&desc.fragment)?];
        let specializations: Vec<_> = stage_data.iter().map(StageData::specialization_info).collect();
        let shader_stages = stage_create_infos(&stage_data, &specializations);

        // Vertex input state
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = config
            .vertex_layout
            .bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: vertex_input_rate_to_vk(binding.input_rate),
            })
            .collect();
        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = config
            .vertex_layout
            .attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(config.topology))
            .primitive_restart_enable(false);

        // Static viewport and scissor (ignored when declared dynamic)
        let viewports = [viewport_to_vk(&config.viewport)];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: config.viewport.x as i32, y: config.viewport.y as i32 },
            extent: {
                let extent = config.viewport.to_extent();
                vk::Extent2D { width: extent.width, height: extent.height }
            },
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = &config.rasterization;
        let rasterization_state = {
            let mut info = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(polygon_mode_to_vk(rasterization.polygon_mode))
                .line_width(rasterization.line_width)
                .cull_mode(cull_mode_to_vk(rasterization.cull_mode))
                .front_face(front_face_to_vk(rasterization.front_face));
            if let Some(bias) = rasterization.depth_bias {
                info = info
                    .depth_bias_enable(true)
                    .depth_bias_constant_factor(bias.constant_factor)
                    .depth_bias_slope_factor(bias.slope_factor)
                    .depth_bias_clamp(bias.clamp);
            }
            info
        };

        let depth_stencil = &config.depth_stencil;
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_stencil.depth_test_enable)
            .depth_write_enable(depth_stencil.depth_write_enable)
            .depth_compare_op(compare_op_to_vk(depth_stencil.depth_compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(depth_stencil.stencil_test_enable)
            .front(stencil_op_state_to_vk(&depth_stencil.front))
            .back(stencil_op_state_to_vk(&depth_stencil.back));

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(sample_count_to_vk(config.multisample.sample_count))
            .alpha_to_coverage_enable(config.multisample.alpha_to_coverage);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> =
            desc.blend_states.iter().map(blend_attachment_to_vk).collect();
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states: Vec<vk::DynamicState> =
            config.dynamic_states.iter().copied().map(dynamic_state_to_vk).collect();
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats: Vec<vk::Format> = config.color_formats.iter().copied().map(format_to_vk).collect();
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(format_to_vk(config.depth_format))
            .stencil_attachment_format(format_to_vk(config.stencil_format));

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .depth_stencil_state(&depth_stencil_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(vk::PipelineLayout::from_raw(desc.layout.as_raw()));

        create_info = match (config.use_dynamic_rendering, config.render_pass) {
            (true, _) => create_info.push_next(&mut rendering_info),
            (false, Some(render_pass)) => create_info
                .render_pass(vk::RenderPass::from_raw(render_pass.as_raw()))
                .subpass(0),
            (false, None) => {
                engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                    "{}: no render pass and dynamic rendering disabled", desc.name
                )));
            }
        };

        let pipelines = unsafe {
            self.ctx
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| engine_err!(SOURCE, "Failed to create {}: {:?}", desc.name, e))?;

        let pipeline = pipelines[0];
        self.ctx.set_object_name(pipeline, desc.name);
        engine_debug!(SOURCE, "Created {} ({} color attachment(s))", desc.name, color_formats.len());

        Ok(PipelineHandle::from_raw(pipeline.as_raw()))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<PipelineHandle> {
        let stage_data = [StageData::new(&desc.compute)?];
        let specializations: Vec<_> = stage_data.iter().map(StageData::specialization_info).collect();
        let shader_stages = stage_create_infos(&stage_data, &specializations);

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(shader_stages[0])
            .layout(vk::PipelineLayout::from_raw(desc.layout.as_raw()));

        let pipelines = unsafe {
            self.ctx
                .device
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| engine_err!(SOURCE, "Failed to create {}: {:?}", desc.name, e))?;

        let pipeline = pipelines[0];
        self.ctx.set_object_name(pipeline, desc.name);
        engine_debug!(SOURCE, "Created {}", desc.name);

        Ok(PipelineHandle::from_raw(pipeline.as_raw()))
    }

    fn create_ray_tracing_pipeline(&self, desc: &RayTracingPipelineDesc) -> Result<PipelineHandle> {
        let Some(loader) = &self.ctx.ray_tracing_loader else {
            engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                "{}: ray tracing is not enabled on this device", desc.name
            )));
        };

        let stage_data = desc.stages.iter().map(StageData::new).collect::<Result<Vec<_>>>()?;
        let specializations: Vec<_> = stage_data.iter().map(StageData::specialization_info).collect();
        let shader_stages = stage_create_infos(&stage_data, &specializations);

        let groups: Vec<vk::RayTracingShaderGroupCreateInfoKHR> = desc
            .groups
            .iter()
            .map(|group| {
                let (ty, general, closest_hit) = match *group {
                    ShaderGroup::General { shader } => {
                        (vk::RayTracingShaderGroupTypeKHR::GENERAL, shader, vk::SHADER_UNUSED_KHR)
                    }
                    ShaderGroup::TrianglesHit { closest_hit } => (
                        vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP,
                        vk::SHADER_UNUSED_KHR,
                        closest_hit,
                    ),
                };
                vk::RayTracingShaderGroupCreateInfoKHR::default()
                    .ty(ty)
                    .general_shader(general)
                    .closest_hit_shader(closest_hit)
                    .any_hit_shader(vk::SHADER_UNUSED_KHR)
                    .intersection_shader(vk::SHADER_UNUSED_KHR)
            })
            .collect();

        let create_info = vk::RayTracingPipelineCreateInfoKHR::default()
            .stages(&shader_stages)
            .groups(&groups)
            .max_pipeline_ray_recursion_depth(desc.max_recursion_depth)
            .layout(vk::PipelineLayout::from_raw(desc.layout.as_raw()));

        let pipelines = unsafe {
            loader.create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                &[create_info],
                None,
            )
        }
        .map_err(|(_, e)| engine_err!(SOURCE, "Failed to create {}: {:?}", desc.name, e))?;

        let pipeline = pipelines[0];
        self.ctx.set_object_name(pipeline, desc.name);
        engine_debug!(SOURCE, "Created {} ({} stage(s), {} group(s))",
            desc.name, shader_stages.len(), groups.len());

        Ok(PipelineHandle::from_raw(pipeline.as_raw()))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        unsafe {
            self.ctx
                .device
                .destroy_pipeline(vk::Pipeline::from_raw(pipeline.as_raw()), None);
        }
    }

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = desc
            .pool_sizes
            .iter()
            .filter(|size| size.count > 0)
            .map(|size| vk::DescriptorPoolSize {
                ty: descriptor_type_to_vk(size.descriptor_type),
                descriptor_count: size.count,
            })
            .collect();

        // Sets are never freed individually: destroying the pool releases them
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(desc.max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { self.ctx.device.create_descriptor_pool(&create_info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create {}: {:?}", desc.name, e))?;
        self.ctx.set_object_name(pool, &desc.name);

        Ok(DescriptorPoolHandle::from_raw(pool.as_raw()))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        unsafe {
            self.ctx
                .device
                .destroy_descriptor_pool(vk::DescriptorPool::from_raw(pool.as_raw()), None);
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        name: &str,
    ) -> Result<DescriptorSetHandle> {
        let set_layouts = [vk::DescriptorSetLayout::from_raw(layout.as_raw())];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(vk::DescriptorPool::from_raw(pool.as_raw()))
            .set_layouts(&set_layouts);

        let sets = match unsafe { self.ctx.device.allocate_descriptor_sets(&allocate_info) } {
            Ok(sets) => sets,
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                engine_bail_err!(SOURCE, Error::DescriptorPoolExhausted(format!(
                    "no room left for '{}'", name
                )));
            }
            Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => {
                engine_error!(SOURCE, "Out of memory allocating descriptor set '{}'", name);
                return Err(Error::OutOfMemory);
            }
            Err(e) => engine_bail!(SOURCE, "Failed to allocate descriptor set '{}': {:?}", name, e),
        };

        let set = sets[0];
        self.ctx.set_object_name(set, name);
        Ok(DescriptorSetHandle::from_raw(set.as_raw()))
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let payloads = writes.iter().map(Self::write_payload).collect::<Result<Vec<_>>>()?;

        // Acceleration structures are chained, not referenced by pointer
        let mut acceleration_structure_writes: Vec<vk::WriteDescriptorSetAccelerationStructureKHR> = payloads
            .iter()
            .filter_map(|payload| match payload {
                WritePayload::AccelerationStructures(handles) => Some(
                    vk::WriteDescriptorSetAccelerationStructureKHR::default().acceleration_structures(handles),
                ),
                _ => None,
            })
            .collect();
        let mut chained = acceleration_structure_writes.iter_mut();

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .zip(&payloads)
            .map(|(write, payload)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(vk::DescriptorSet::from_raw(write.set.as_raw()))
                    .dst_binding(write.binding)
                    .dst_array_element(write.first_array_element)
                    .descriptor_type(descriptor_type_to_vk(write.descriptor_type));
                match payload {
                    WritePayload::Buffers(infos) => base.buffer_info(infos),
                    WritePayload::Images(infos) => base.image_info(infos),
                    WritePayload::AccelerationStructures(handles) => {
                        let base = base.descriptor_count(handles.len() as u32);
                        match chained.next() {
                            Some(next) => base.push_next(next),
                            None => base,
                        }
                    }
                }
            })
            .collect();

        unsafe {
            self.ctx.device.update_descriptor_sets(&vk_writes, &[]);
        }
        Ok(())
    }
}
