/// Mock Device and CommandList for unit tests (no GPU required)
///
/// MockDevice hands out increasing handles, keeps track of live objects so
/// tests can check nothing leaks, and mirrors descriptor set contents so
/// flushed writes can be inspected. MockCommandList records commands and
/// enforces begin/end pairing the way a validation layer would.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::renderer::{
    AccelerationStructure, AccelerationStructureHandle, Buffer, BufferHandle, ColorBlendState,
    CommandList, ComputePipelineDesc, DescriptorPoolDesc, DescriptorPoolHandle,
    DescriptorSetHandle, DescriptorSetLayoutDesc, DescriptorSetLayoutHandle, DescriptorWrite,
    Device, Format, FormatFeature, GraphicsPipelineDesc, ImageBarrier, ImageHandle,
    ImageViewHandle, IndexType, PipelineBindPoint, PipelineHandle, PipelineLayoutDesc,
    PipelineLayoutHandle, RayTracingPipelineDesc, Rect2D, RenderingInfo, ResolvedDescriptor,
    Sampler, SamplerHandle, Shader, ShaderGroup, ShaderModuleHandle, ShaderStage,
    ShaderStageFlags, Texture, Viewport,
};
use crate::engine_bail;

// ============================================================================
// Mock resources
// ============================================================================

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(10_000);

fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

pub struct MockShader {
    pub stage: ShaderStage,
    pub module: ShaderModuleHandle,
    pub entry_point: String,
}

impl MockShader {
    pub fn new(stage: ShaderStage) -> Arc<dyn Shader> {
        Arc::new(Self {
            stage,
            module: ShaderModuleHandle::from_raw(next_resource_id()),
            entry_point: "main".to_string(),
        })
    }
}

impl Shader for MockShader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn module_handle(&self) -> ShaderModuleHandle {
        self.module
    }
}

pub struct MockTexture {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub format: Format,
}

impl MockTexture {
    pub fn new() -> Self {
        Self {
            image: ImageHandle::from_raw(next_resource_id()),
            view: ImageViewHandle::from_raw(next_resource_id()),
            format: Format::R8G8B8A8Unorm,
        }
    }
}

impl Texture for MockTexture {
    fn image(&self) -> ImageHandle {
        self.image
    }

    fn view(&self) -> ImageViewHandle {
        self.view
    }

    fn format(&self) -> Format {
        self.format
    }
}

pub struct MockBuffer {
    pub handle: BufferHandle,
    pub size: u64,
}

impl MockBuffer {
    pub fn new(size: u64) -> Self {
        Self { handle: BufferHandle::from_raw(next_resource_id()), size }
    }
}

impl Buffer for MockBuffer {
    fn handle(&self) -> BufferHandle {
        self.handle
    }

    fn size(&self) -> u64 {
        self.size
    }
}

pub struct MockSampler {
    pub handle: SamplerHandle,
}

impl MockSampler {
    pub fn new() -> Self {
        Self { handle: SamplerHandle::from_raw(next_resource_id()) }
    }
}

impl Sampler for MockSampler {
    fn handle(&self) -> SamplerHandle {
        self.handle
    }
}

pub struct MockAccelerationStructure {
    pub handle: AccelerationStructureHandle,
}

impl MockAccelerationStructure {
    pub fn new() -> Self {
        Self { handle: AccelerationStructureHandle::from_raw(next_resource_id()) }
    }
}

impl AccelerationStructure for MockAccelerationStructure {
    fn handle(&self) -> AccelerationStructureHandle {
        self.handle
    }
}

// ============================================================================
// Mock Device
// ============================================================================

struct MockPool {
    max_sets: u32,
    allocated: Vec<u64>,
}

#[derive(Default)]
struct MockDeviceState {
    /// handle -> object kind
    live: FxHashMap<u64, &'static str>,
    set_layouts: FxHashMap<u64, DescriptorSetLayoutDesc>,
    pools: FxHashMap<u64, MockPool>,
    /// descriptor set -> layout
    set_to_layout: FxHashMap<u64, u64>,
    /// (descriptor set, binding, element) -> descriptor
    contents: FxHashMap<(u64, u32, u32), ResolvedDescriptor>,
    pipeline_layouts: Vec<PipelineLayoutDesc>,
    pool_descs: Vec<DescriptorPoolDesc>,
    set_names: Vec<String>,
    blend_states: Vec<ColorBlendState>,
    ray_tracing_groups: Vec<ShaderGroup>,
    unsupported: Vec<(Format, FormatFeature)>,
}

pub struct MockDevice {
    next_handle: AtomicU64,
    ray_tracing: bool,
    fail_next_pipeline: AtomicBool,
    update_calls: AtomicUsize,
    state: Mutex<MockDeviceState>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    pub fn with_ray_tracing() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    fn build(ray_tracing: bool) -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            ray_tracing,
            fail_next_pipeline: AtomicBool::new(false),
            update_calls: AtomicUsize::new(0),
            state: Mutex::new(MockDeviceState::default()),
        }
    }

    fn create(&self, kind: &'static str) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.state.lock().unwrap().live.insert(handle, kind);
        handle
    }

    fn destroy(&self, handle: u64) {
        self.state.lock().unwrap().live.remove(&handle);
    }

    // ===== Test controls =====

    pub fn mark_unsupported(&self, format: Format, feature: FormatFeature) {
        self.state.lock().unwrap().unsupported.push((format, feature));
    }

    pub fn fail_next_pipeline(&self) {
        self.fail_next_pipeline.store(true, Ordering::Relaxed);
    }

    // ===== Inspection =====

    /// Number of live objects of `kind` ("set layout", "pipeline layout", "pipeline", "pool", "set")
    pub fn live_count(&self, kind: &str) -> usize {
        self.state.lock().unwrap().live.values().filter(|k| **k == kind).count()
    }

    pub fn live_total(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn update_call_count(&self) -> usize {
        self.update_calls.load(Ordering::Relaxed)
    }

    /// Descriptor written in the GPU-side set
    pub fn content(&self, set: DescriptorSetHandle, binding: u32, element: u32) -> Option<ResolvedDescriptor> {
        self.state.lock().unwrap().contents.get(&(set.as_raw(), binding, element)).copied()
    }

    /// Number of written descriptors in `set`
    pub fn content_count(&self, set: DescriptorSetHandle) -> usize {
        self.state.lock().unwrap().contents.keys().filter(|(s, _, _)| *s == set.as_raw()).count()
    }

    pub fn set_layout_descs(&self) -> Vec<DescriptorSetLayoutDesc> {
        let state = self.state.lock().unwrap();
        let mut descs: Vec<_> = state.set_layouts.values().cloned().collect();
        descs.sort_by_key(|d| d.set);
        descs
    }

    pub fn last_pipeline_layout(&self) -> Option<PipelineLayoutDesc> {
        self.state.lock().unwrap().pipeline_layouts.last().cloned()
    }

    pub fn last_pool_desc(&self) -> Option<DescriptorPoolDesc> {
        self.state.lock().unwrap().pool_descs.last().cloned()
    }

    pub fn set_names(&self) -> Vec<String> {
        self.state.lock().unwrap().set_names.clone()
    }

    pub fn last_blend_states(&self) -> Vec<ColorBlendState> {
        self.state.lock().unwrap().blend_states.clone()
    }

    pub fn last_ray_tracing_groups(&self) -> Vec<ShaderGroup> {
        self.state.lock().unwrap().ray_tracing_groups.clone()
    }

    fn take_pipeline_failure(&self) -> Result<()> {
        if self.fail_next_pipeline.swap(false, Ordering::Relaxed) {
            engine_bail!("ecore::mock", "pipeline creation failed (injected)");
        }
        Ok(())
    }
}

impl Device for MockDevice {
    fn supports_format(&self, format: Format, feature: FormatFeature) -> bool {
        !self.state.lock().unwrap().unsupported.contains(&(format, feature))
    }

    fn supports_ray_tracing(&self) -> bool {
        self.ray_tracing
    }

    fn create_descriptor_set_layout(&self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle> {
        let handle = self.create("set layout");
        self.state.lock().unwrap().set_layouts.insert(handle, desc.clone());
        Ok(DescriptorSetLayoutHandle::from_raw(handle))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        self.destroy(layout.as_raw());
    }

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle> {
        let handle = self.create("pipeline layout");
        self.state.lock().unwrap().pipeline_layouts.push(desc.clone());
        Ok(PipelineLayoutHandle::from_raw(handle))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        self.destroy(layout.as_raw());
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        self.take_pipeline_failure()?;
        self.state.lock().unwrap().blend_states = desc.blend_states.clone();
        Ok(PipelineHandle::from_raw(self.create("pipeline")))
    }

    fn create_compute_pipeline(&self, _desc: &ComputePipelineDesc) -> Result<PipelineHandle> {
        self.take_pipeline_failure()?;
        Ok(PipelineHandle::from_raw(self.create("pipeline")))
    }

    fn create_ray_tracing_pipeline(&self, desc: &RayTracingPipelineDesc) -> Result<PipelineHandle> {
        self.take_pipeline_failure()?;
        self.state.lock().unwrap().ray_tracing_groups = desc.groups.clone();
        Ok(PipelineHandle::from_raw(self.create("pipeline")))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        self.destroy(pipeline.as_raw());
    }

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        let handle = self.create("pool");
        let mut state = self.state.lock().unwrap();
        state.pools.insert(handle, MockPool { max_sets: desc.max_sets, allocated: Vec::new() });
        state.pool_descs.push(desc.clone());
        Ok(DescriptorPoolHandle::from_raw(handle))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        let mut state = self.state.lock().unwrap();
        if let Some(mock_pool) = state.pools.remove(&pool.as_raw()) {
            for set in mock_pool.allocated {
                state.live.remove(&set);
                state.set_to_layout.remove(&set);
                state.contents.retain(|(s, _, _), _| *s != set);
            }
        }
        state.live.remove(&pool.as_raw());
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        name: &str,
    ) -> Result<DescriptorSetHandle> {
        {
            let state = self.state.lock().unwrap();
            match state.pools.get(&pool.as_raw()) {
                Some(p) if (p.allocated.len() as u32) < p.max_sets => {}
                Some(_) => engine_bail!("ecore::mock", "VK_ERROR_OUT_OF_POOL_MEMORY"),
                None => engine_bail!("ecore::mock", "unknown pool {:?}", pool),
            }
        }
        let handle = self.create("set");
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.pools.get_mut(&pool.as_raw()) {
            p.allocated.push(handle);
        }
        state.set_to_layout.insert(handle, layout.as_raw());
        state.set_names.push(name.to_string());
        Ok(DescriptorSetHandle::from_raw(handle))
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        // Validate the whole batch against the set layouts before applying it
        for write in writes {
            let Some(layout) = state.set_to_layout.get(&write.set.as_raw()) else {
                engine_bail!("ecore::mock", "write to unknown descriptor set {:?}", write.set);
            };
            let Some(binding) = state
                .set_layouts
                .get(layout)
                .and_then(|l| l.bindings.iter().find(|b| b.binding == write.binding))
            else {
                engine_bail!("ecore::mock", "write to undeclared binding {}", write.binding);
            };
            if binding.descriptor_type != write.descriptor_type {
                engine_bail!("ecore::mock", "descriptor type mismatch at binding {}", write.binding);
            }
            if write.first_array_element as usize + write.descriptors.len() > binding.count as usize {
                engine_bail!("ecore::mock", "array overflow at binding {}", write.binding);
            }
        }
        for write in writes {
            for (i, descriptor) in write.descriptors.iter().enumerate() {
                state.contents.insert(
                    (write.set.as_raw(), write.binding, write.first_array_element + i as u32),
                    *descriptor,
                );
            }
        }
        self.update_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BindPipeline(PipelineBindPoint, PipelineHandle),
    BindDescriptorSets {
        bind_point: PipelineBindPoint,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: Vec<DescriptorSetHandle>,
    },
    PushConstants {
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffer { binding: u32, buffer: BufferHandle, offset: u64 },
    BindIndexBuffer { buffer: BufferHandle, offset: u64, index_type: IndexType },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    Dispatch(u32, u32, u32),
    Barrier(ImageBarrier),
    BeginRendering(RenderingInfo),
    EndRendering,
}

#[derive(Default)]
pub struct MockCommandList {
    pub commands: Vec<RecordedCommand>,
    recording: bool,
    in_rendering: bool,
}

impl MockCommandList {
    /// Command list already in the recording state
    pub fn recording() -> Self {
        Self { commands: Vec::new(), recording: true, in_rendering: false }
    }

    pub fn count(&self, pred: impl Fn(&RecordedCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    fn record(&mut self, command: RecordedCommand) -> Result<()> {
        if !self.recording {
            return Err(Error::BackendError("Command list not recording".to_string()));
        }
        self.commands.push(command);
        Ok(())
    }

    fn record_in_rendering(&mut self, command: RecordedCommand) -> Result<()> {
        if !self.in_rendering {
            return Err(Error::BackendError("Draw outside of a rendering span".to_string()));
        }
        self.record(command)
    }
}

impl CommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.recording {
            return Err(Error::BackendError("Command list already recording".to_string()));
        }
        self.recording = true;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if !self.recording || self.in_rendering {
            return Err(Error::BackendError("Cannot end command list".to_string()));
        }
        self.recording = false;
        Ok(())
    }

    fn bind_pipeline(&mut self, bind_point: PipelineBindPoint, pipeline: PipelineHandle) -> Result<()> {
        self.record(RecordedCommand::BindPipeline(bind_point, pipeline))
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) -> Result<()> {
        self.record(RecordedCommand::BindDescriptorSets {
            bind_point,
            layout,
            first_set,
            sets: sets.to_vec(),
        })
    }

    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.record(RecordedCommand::PushConstants { layout, stages, offset, data: data.to_vec() })
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) -> Result<()> {
        self.record(RecordedCommand::BindVertexBuffer { binding, buffer, offset })
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) -> Result<()> {
        self.record(RecordedCommand::BindIndexBuffer { buffer, offset, index_type })
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.record(RecordedCommand::SetViewport(*viewport))
    }

    fn set_scissor(&mut self, scissor: &Rect2D) -> Result<()> {
        self.record(RecordedCommand::SetScissor(*scissor))
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) -> Result<()> {
        self.record_in_rendering(RecordedCommand::Draw { vertex_count, instance_count })
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) -> Result<()> {
        self.record_in_rendering(RecordedCommand::DrawIndexed { index_count, instance_count })
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        if self.in_rendering {
            return Err(Error::BackendError("Dispatch inside a rendering span".to_string()));
        }
        self.record(RecordedCommand::Dispatch(x, y, z))
    }

    fn pipeline_barrier(&mut self, barriers: &[ImageBarrier]) -> Result<()> {
        for barrier in barriers {
            self.record(RecordedCommand::Barrier(*barrier))?;
        }
        Ok(())
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()> {
        if self.in_rendering {
            return Err(Error::BackendError("Rendering already begun".to_string()));
        }
        self.record(RecordedCommand::BeginRendering(info.clone()))?;
        self.in_rendering = true;
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        if !self.in_rendering {
            return Err(Error::BackendError("No rendering to end".to_string()));
        }
        self.record(RecordedCommand::EndRendering)?;
        self.in_rendering = false;
        Ok(())
    }
}
