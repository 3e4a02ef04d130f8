/// Device trait - object creation interface implemented by backends
///
/// The core describes what to create with plain descriptors; the backend
/// turns them into native objects and returns opaque handles. Every create
/// call has a matching destroy call, and pipelines call them exactly once.

use crate::error::Result;
use crate::renderer::{
    BindingDescriptor, ColorBlendState, ComputePipelineConfig, DescriptorPoolHandle,
    DescriptorPoolSize, DescriptorSetHandle, DescriptorSetLayoutHandle, DescriptorWrite,
    Format, FormatFeature, GraphicsPipelineConfig, PipelineHandle, PipelineLayoutHandle,
    PushConstantRange, ShaderGroup, ShaderModuleHandle, ShaderStage,
    SpecializationConstants,
};

// ============================================================================
// Creation descriptors
// ============================================================================

/// Descriptor set layout for one set index
#[derive(Debug, Clone)]
pub struct DescriptorSetLayoutDesc {
    /// Debug name
    pub name: String,
    pub set: u32,
    /// Sorted by binding index; empty for placeholder layouts filling gaps
    pub bindings: Vec<BindingDescriptor>,
}

#[derive(Debug, Clone)]
pub struct PipelineLayoutDesc {
    pub name: String,
    /// Indexed by set number
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// Shader stage resolved from a live shader module
#[derive(Debug, Clone)]
pub struct ShaderStageDesc {
    pub stage: ShaderStage,
    pub module: ShaderModuleHandle,
    pub entry_point: String,
    pub specialization: SpecializationConstants,
}

pub struct GraphicsPipelineDesc<'a> {
    pub name: &'a str,
    pub layout: PipelineLayoutHandle,
    pub vertex: ShaderStageDesc,
    pub fragment: ShaderStageDesc,
    /// One blend state per color attachment
    pub blend_states: Vec<ColorBlendState>,
    pub config: &'a GraphicsPipelineConfig,
}

pub struct ComputePipelineDesc<'a> {
    pub name: &'a str,
    pub layout: PipelineLayoutHandle,
    pub compute: ShaderStageDesc,
    pub config: &'a ComputePipelineConfig,
}

pub struct RayTracingPipelineDesc<'a> {
    pub name: &'a str,
    pub layout: PipelineLayoutHandle,
    /// Ray-gen, misses, closest hits, in that order
    pub stages: Vec<ShaderStageDesc>,
    pub groups: Vec<ShaderGroup>,
    pub max_recursion_depth: u32,
}

#[derive(Debug, Clone)]
pub struct DescriptorPoolDesc {
    pub name: String,
    pub max_sets: u32,
    pub pool_sizes: Vec<DescriptorPoolSize>,
}

// ============================================================================
// Device trait
// ============================================================================

/// Backend device
///
/// Implemented by backend-specific devices (e.g. VulkanDevice). Shared by
/// pipelines through `Arc<dyn Device>`.
pub trait Device: Send + Sync {
    /// Whether `format` can be used for `feature`
    fn supports_format(&self, format: Format, feature: FormatFeature) -> bool;

    /// Whether ray tracing pipelines can be created
    fn supports_ray_tracing(&self) -> bool;

    fn create_descriptor_set_layout(
        &self,
        desc: &DescriptorSetLayoutDesc,
    ) -> Result<DescriptorSetLayoutHandle>;

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle>;

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle>;

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<PipelineHandle>;

    fn create_ray_tracing_pipeline(&self, desc: &RayTracingPipelineDesc) -> Result<PipelineHandle>;

    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle>;

    /// Destroying a pool frees every set allocated from it
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
        name: &str,
    ) -> Result<DescriptorSetHandle>;

    /// Apply a batch of descriptor writes in a single call
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) -> Result<()>;
}
