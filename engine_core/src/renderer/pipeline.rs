/// Pipeline - pipeline state object plus everything needed to feed it
///
/// A `Pipeline` owns, for exactly one kind (graphics, compute or ray tracing):
/// - one descriptor set layout per set index
/// - the pipeline layout (set layouts + push constant ranges)
/// - the pipeline object
/// - the descriptor pool and the replicas allocated from it
///
/// Usage order:
/// 1. `Pipeline::new` (declarations are fixed from here on)
/// 2. `allocate_descriptors` (once)
/// 3. `bind_resource` / `bind_resources`, then `update_descriptor_sets`
/// 4. per frame: `bind`, `bind_descriptor_sets`, draw or dispatch
///
/// Every owned device object is destroyed exactly once when the pipeline is
/// dropped. Shaders and bound resources are never owned.

use std::sync::{Arc, Weak};
use bytemuck::Pod;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::renderer::{
    binding_table::ResourceBindingTable, descriptor_pool::DescriptorPoolManager, BindingResource,
    BindingSlot, Buffer, ColorBlendState, CommandList, ComputePipelineDesc,
    DescriptorLayoutBuilder, DescriptorPoolSizing, DescriptorSetHandle, DescriptorSetLayoutHandle,
    Device, Format, FormatFeature, GraphicsPipelineConfig, GraphicsPipelineDesc, IndexType,
    PipelineConfig, PipelineHandle, PipelineKind, PipelineLayoutDesc, PipelineLayoutHandle,
    PushConstantRange, RayTracingPipelineConfig, RayTracingPipelineDesc, ResolvedDescriptor,
    SetAndCount, SetAndReplica, SetDescriptor, Shader, ShaderGroup, ShaderStage, ShaderStageDesc,
    ShaderStageFlags, SpecializationConstants,
};
use crate::{engine_bail_err, engine_debug, engine_info};

const SOURCE: &str = "ecore::pipeline";

/// Kind-specific data resolved before any device object is created
enum PreparedStages {
    Graphics {
        vertex: ShaderStageDesc,
        fragment: ShaderStageDesc,
        blend_states: Vec<ColorBlendState>,
    },
    Compute {
        compute: ShaderStageDesc,
    },
    RayTracing {
        stages: Vec<ShaderStageDesc>,
        groups: Vec<ShaderGroup>,
    },
}

pub struct Pipeline {
    device: Arc<dyn Device>,
    name: String,
    kind: PipelineKind,
    sets: Vec<SetDescriptor>,
    /// Indexed by set number (gaps hold empty layouts)
    set_layouts: Vec<DescriptorSetLayoutHandle>,
    layout: PipelineLayoutHandle,
    handle: PipelineHandle,
    push_constants: Vec<PushConstantRange>,
    /// None until `allocate_descriptors`
    pool: Option<DescriptorPoolManager>,
    bindings: ResourceBindingTable,
}

impl Pipeline {
    // ===== CONSTRUCTION =====

    /// Build the set layouts, the pipeline layout and the pipeline object
    ///
    /// The configuration is fully validated before the first device object is
    /// created. If a device call fails, objects created so far are destroyed.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration`: duplicate set or binding, zero count, bad
    ///   push constant ranges, stage mismatch, missing render pass, blend
    ///   state count mismatch, bad specialization data, no ray tracing support
    /// - `ShaderReleased`: a shader of the configuration has been dropped
    /// - `UnsupportedFormat`: vertex or attachment format not supported
    /// - backend errors forwarded from the device
    pub fn new(device: Arc<dyn Device>, config: impl Into<PipelineConfig>, name: &str) -> Result<Self> {
        let config = config.into();
        let kind = config.kind();

        DescriptorLayoutBuilder::validate(config.sets())?;
        if let Err(error) = PushConstantRange::validate_all(config.push_constants()) {
            engine_bail_err!(SOURCE, error);
        }

        let prepared = match &config {
            PipelineConfig::Graphics(graphics) => Self::prepare_graphics(device.as_ref(), graphics, name)?,
            PipelineConfig::Compute(compute) => PreparedStages::Compute {
                compute: Self::resolve_stage(
                    name,
                    "compute",
                    &compute.compute_shader,
                    ShaderStage::Compute,
                    &compute.specialization,
                )?,
            },
            PipelineConfig::RayTracing(rt) => Self::prepare_ray_tracing(device.as_ref(), rt, name)?,
        };

        let mut set_layouts = DescriptorLayoutBuilder::build(device.as_ref(), config.sets(), name)?;

        let layout = match device.create_pipeline_layout(&PipelineLayoutDesc {
            name: format!("pipeline layout: {}", name),
            set_layouts: set_layouts.clone(),
            push_constant_ranges: config.push_constants().to_vec(),
        }) {
            Ok(layout) => layout,
            Err(e) => {
                DescriptorLayoutBuilder::destroy(device.as_ref(), &mut set_layouts);
                return Err(e);
            }
        };

        let pipeline_name = format!("{} pipeline: {}", kind.label(), name);
        let created = match (&config, prepared) {
            (PipelineConfig::Graphics(graphics), PreparedStages::Graphics { vertex, fragment, blend_states }) => {
                device.create_graphics_pipeline(&GraphicsPipelineDesc {
                    name: &pipeline_name,
                    layout,
                    vertex,
                    fragment,
                    blend_states,
                    config: graphics,
                })
            }
            (PipelineConfig::Compute(compute_config), PreparedStages::Compute { compute }) => {
                device.create_compute_pipeline(&ComputePipelineDesc {
                    name: &pipeline_name,
                    layout,
                    compute,
                    config: compute_config,
                })
            }
            (PipelineConfig::RayTracing(rt), PreparedStages::RayTracing { stages, groups }) => {
                device.create_ray_tracing_pipeline(&RayTracingPipelineDesc {
                    name: &pipeline_name,
                    layout,
                    stages,
                    groups,
                    max_recursion_depth: rt.max_recursion_depth,
                })
            }
            _ => Err(Error::InvalidConfiguration(format!(
                "pipeline '{}': configuration and shader stages disagree on the pipeline kind",
                name
            ))),
        };

        let handle = match created {
            Ok(handle) => handle,
            Err(e) => {
                device.destroy_pipeline_layout(layout);
                DescriptorLayoutBuilder::destroy(device.as_ref(), &mut set_layouts);
                return Err(e);
            }
        };

        engine_info!(SOURCE, "Created {} pipeline '{}' ({} set layout(s), {} push constant range(s))",
            kind.label(), name, set_layouts.len(), config.push_constants().len());

        let sets = config.sets().to_vec();
        let bindings = ResourceBindingTable::new(name, &sets);
        Ok(Self {
            device,
            name: name.to_string(),
            kind,
            sets,
            set_layouts,
            layout,
            handle,
            push_constants: config.push_constants().to_vec(),
            pool: None,
            bindings,
        })
    }

    fn prepare_graphics(device: &dyn Device, config: &GraphicsPipelineConfig, name: &str) -> Result<PreparedStages> {
        let vertex = Self::resolve_stage(
            name,
            "vertex",
            &config.vertex_shader,
            ShaderStage::Vertex,
            &config.vertex_specialization,
        )?;
        let fragment = Self::resolve_stage(
            name,
            "fragment",
            &config.fragment_shader,
            ShaderStage::Fragment,
            &config.fragment_specialization,
        )?;

        if !config.use_dynamic_rendering && config.render_pass.is_none() {
            engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                "pipeline '{}': a render pass is required without dynamic rendering", name
            )));
        }

        for attribute in &config.vertex_layout.attributes {
            Self::check_format(device, name, attribute.format, FormatFeature::VertexBuffer)?;
        }
        for format in &config.color_formats {
            Self::check_format(device, name, *format, FormatFeature::ColorAttachment)?;
        }
        for format in [config.depth_format, config.stencil_format] {
            if format != Format::Undefined {
                Self::check_format(device, name, format, FormatFeature::DepthStencilAttachment)?;
            }
        }

        let blend_states = match config.resolved_blend_states() {
            Ok(states) => states,
            Err(error) => engine_bail_err!(SOURCE, error),
        };

        Ok(PreparedStages::Graphics { vertex, fragment, blend_states })
    }

    fn prepare_ray_tracing(device: &dyn Device, config: &RayTracingPipelineConfig, name: &str) -> Result<PreparedStages> {
        if !device.supports_ray_tracing() {
            engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                "pipeline '{}': the device does not support ray tracing", name
            )));
        }

        let none = SpecializationConstants::default();
        let mut stages = Vec::with_capacity(1 + config.miss_shaders.len() + config.closest_hit_shaders.len());
        stages.push(Self::resolve_stage(name, "ray-gen", &config.ray_gen_shader, ShaderStage::RayGen, &none)?);
        for shader in &config.miss_shaders {
            stages.push(Self::resolve_stage(name, "miss", shader, ShaderStage::Miss, &none)?);
        }
        for shader in &config.closest_hit_shaders {
            stages.push(Self::resolve_stage(name, "closest-hit", shader, ShaderStage::ClosestHit, &none)?);
        }

        Ok(PreparedStages::RayTracing { stages, groups: config.shader_groups() })
    }

    /// Upgrade a shader reference and check its stage and specialization data
    fn resolve_stage(
        name: &str,
        role: &str,
        shader: &Weak<dyn Shader>,
        expected: ShaderStage,
        specialization: &SpecializationConstants,
    ) -> Result<ShaderStageDesc> {
        let Some(shader) = shader.upgrade() else {
            engine_bail_err!(SOURCE, Error::ShaderReleased(format!(
                "pipeline '{}': {} shader", name, role
            )));
        };
        if shader.stage() != expected {
            engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                "pipeline '{}': {} shader was compiled for stage {:?}", name, role, shader.stage()
            )));
        }
        if let Err(error) = specialization.validate() {
            engine_bail_err!(SOURCE, error);
        }

        Ok(ShaderStageDesc {
            stage: expected,
            module: shader.module_handle(),
            entry_point: shader.entry_point().to_string(),
            specialization: specialization.clone(),
        })
    }

    fn check_format(device: &dyn Device, name: &str, format: Format, feature: FormatFeature) -> Result<()> {
        if !device.supports_format(format, feature) {
            engine_bail_err!(SOURCE, Error::UnsupportedFormat(format!(
                "pipeline '{}': {:?} cannot be used as {:?}", name, format, feature
            )));
        }
        Ok(())
    }

    // ===== DESCRIPTORS =====

    /// Create the descriptor pool and allocate every requested replica
    ///
    /// Must be called exactly once. The pool is sized for exactly the
    /// requested replicas and never grows.
    pub fn allocate_descriptors(&mut self, requests: &[SetAndCount]) -> Result<()> {
        if self.bindings.is_allocated() {
            engine_bail_err!(SOURCE, Error::DescriptorsAlreadyAllocated(format!(
                "pipeline '{}'", self.name
            )));
        }

        for (i, request) in requests.iter().enumerate() {
            if !self.sets.iter().any(|s| s.set == request.set) {
                engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                    "pipeline '{}': cannot allocate undeclared set {}", self.name, request.set
                )));
            }
            if requests[..i].iter().any(|r| r.set == request.set) {
                engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                    "pipeline '{}': set {} requested twice", self.name, request.set
                )));
            }
            if request.count == 0 {
                engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                    "pipeline '{}': set {} requested with 0 replicas", self.name, request.set
                )));
            }
        }

        let sizing = DescriptorPoolSizing::compute(&self.sets, requests)?;
        let mut pool = DescriptorPoolManager::create(self.device.as_ref(), sizing, &self.name)?;

        let mut replicas: FxHashMap<u32, Vec<DescriptorSetHandle>> = FxHashMap::default();
        for request in requests {
            let layout = self.set_layouts[request.set as usize];
            let mut handles = Vec::with_capacity(request.count as usize);
            for replica in 0..request.count {
                let set_name = format!("descriptor set: {} {}", request.name, replica);
                match pool.allocate(self.device.as_ref(), layout, &set_name) {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        pool.destroy(self.device.as_ref());
                        return Err(e);
                    }
                }
            }
            replicas.insert(request.set, handles);
        }

        engine_info!(SOURCE, "Allocated {} descriptor set(s) for '{}' ({} descriptor(s))",
            pool.allocated(), self.name, pool.sizing().total_descriptors());

        self.bindings.set_replicas(replicas);
        self.pool = Some(pool);
        Ok(())
    }

    /// Stage one resource at `slot`
    ///
    /// Nothing reaches the GPU-visible set until `update_descriptor_sets`.
    pub fn bind_resource(&self, slot: BindingSlot, resource: BindingResource) -> Result<()> {
        self.bindings.stage(slot, &[resource]).map(|_| ())
    }

    /// Stage consecutive array elements starting at `slot.array_element`
    pub fn bind_resources(&self, slot: BindingSlot, resources: &[BindingResource]) -> Result<()> {
        self.bindings.stage(slot, resources).map(|_| ())
    }

    /// Push every staged binding to the descriptor sets in one batched update
    ///
    /// Returns the number of descriptor writes issued (0 when nothing was staged).
    pub fn update_descriptor_sets(&self) -> Result<usize> {
        let writes = self.bindings.flush(self.device.as_ref())?;
        if writes > 0 {
            engine_debug!(SOURCE, "Updated descriptor sets of '{}' ({} write(s))", self.name, writes);
        }
        Ok(writes)
    }

    // ===== RECORDING =====

    /// Flush staged bindings, then bind the pipeline at its kind's bind point
    pub fn bind(&self, cmd: &mut dyn CommandList) -> Result<()> {
        self.update_descriptor_sets()?;
        cmd.bind_pipeline(self.kind.bind_point(), self.handle)
    }

    /// Bind one replica per entry at that entry's set index
    ///
    /// Consecutive set indices are bound with a single command.
    pub fn bind_descriptor_sets(&self, cmd: &mut dyn CommandList, sets: &[SetAndReplica]) -> Result<()> {
        let mut resolved = Vec::with_capacity(sets.len());
        for entry in sets {
            let handle = self.bindings.descriptor_set(entry.set, entry.replica)?;
            self.check_flushed(*entry)?;
            resolved.push((entry.set, handle));
        }

        let bind_point = self.kind.bind_point();
        let mut start = 0;
        while start < resolved.len() {
            let mut end = start + 1;
            while end < resolved.len() && resolved[end].0 == resolved[end - 1].0 + 1 {
                end += 1;
            }
            let handles: Vec<DescriptorSetHandle> = resolved[start..end].iter().map(|(_, h)| *h).collect();
            cmd.bind_descriptor_sets(bind_point, self.layout, resolved[start].0, &handles)?;
            start = end;
        }
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn check_flushed(&self, entry: SetAndReplica) -> Result<()> {
        if self.bindings.is_dirty(entry.set, entry.replica) {
            engine_bail_err!(SOURCE, Error::UnflushedDescriptorWrites(format!(
                "pipeline '{}': set {} replica {} has staged writes, call update_descriptor_sets first",
                self.name, entry.set, entry.replica
            )));
        }
        Ok(())
    }

    #[cfg(not(debug_assertions))]
    fn check_flushed(&self, _entry: SetAndReplica) -> Result<()> {
        Ok(())
    }

    /// Bind `buffer` as vertex buffer 0
    pub fn bind_vertex_buffer(&self, cmd: &mut dyn CommandList, buffer: &dyn Buffer) -> Result<()> {
        cmd.bind_vertex_buffer(0, buffer.handle(), 0)
    }

    pub fn bind_index_buffer(&self, cmd: &mut dyn CommandList, buffer: &dyn Buffer, index_type: IndexType) -> Result<()> {
        cmd.bind_index_buffer(buffer.handle(), 0, index_type)
    }

    /// Record a push constant update for the range declared with exactly `stages`
    ///
    /// `data` is written at the range's offset. Its length must be a non-zero
    /// multiple of 4 no larger than the range.
    pub fn update_push_constant(&self, cmd: &mut dyn CommandList, stages: ShaderStageFlags, data: &[u8]) -> Result<()> {
        let Some(range) = self.push_constants.iter().find(|r| r.stages == stages) else {
            engine_bail_err!(SOURCE, Error::InvalidPushConstant(format!(
                "pipeline '{}': no push constant range declared for stages {:?}", self.name, stages
            )));
        };
        if data.is_empty() || data.len() % 4 != 0 {
            engine_bail_err!(SOURCE, Error::InvalidPushConstant(format!(
                "pipeline '{}': {} bytes is not a non-zero multiple of 4", self.name, data.len()
            )));
        }
        if data.len() > range.size as usize {
            engine_bail_err!(SOURCE, Error::InvalidPushConstant(format!(
                "pipeline '{}': {} bytes exceed the {} byte range for stages {:?}",
                self.name, data.len(), range.size, stages
            )));
        }

        cmd.push_constants(self.layout, stages, range.offset, data)
    }

    /// `update_push_constant` with the bytes of a plain-old-data value
    pub fn update_push_constant_pod<T: Pod>(&self, cmd: &mut dyn CommandList, stages: ShaderStageFlags, value: &T) -> Result<()> {
        self.update_push_constant(cmd, stages, bytemuck::bytes_of(value))
    }

    // ===== ACCESSORS =====

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared set indices, ascending
    pub fn set_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.sets.iter().map(|s| s.set).collect();
        indices.sort_unstable();
        indices
    }

    /// Number of allocated replicas of `set` (0 before `allocate_descriptors`)
    pub fn replica_count(&self, set: u32) -> u32 {
        self.bindings.replica_count(set)
    }

    pub fn descriptor_set(&self, set: u32, replica: u32) -> Result<DescriptorSetHandle> {
        self.bindings.descriptor_set(set, replica)
    }

    pub fn descriptor_set_layout(&self, set: u32) -> Option<DescriptorSetLayoutHandle> {
        self.set_layouts.get(set as usize).copied()
    }

    /// Descriptor visible in the GPU set at `slot` after the last flush
    pub fn bound_resource(&self, slot: BindingSlot) -> Option<ResolvedDescriptor> {
        self.bindings.committed(slot)
    }

    pub fn pending_write_count(&self) -> usize {
        self.bindings.pending_count()
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constants
    }

    pub fn layout(&self) -> PipelineLayoutHandle {
        self.layout
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    /// Pool capacity, once descriptors are allocated
    pub fn pool_sizing(&self) -> Option<&DescriptorPoolSizing> {
        self.pool.as_ref().map(|p| p.sizing())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.as_mut() {
            pool.destroy(self.device.as_ref());
        }
        self.device.destroy_pipeline(self.handle);
        self.device.destroy_pipeline_layout(self.layout);
        DescriptorLayoutBuilder::destroy(self.device.as_ref(), &mut self.set_layouts);
        engine_debug!(SOURCE, "Destroyed pipeline '{}'", self.name);
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
