/// Declarative descriptor set description and binding types
///
/// A pipeline declares its descriptor sets once as a list of `SetDescriptor`.
/// Resources are then bound per (set, replica, binding, array element) slot
/// and pushed to the GPU-visible sets in one batched update.

use crate::renderer::{
    AccelerationStructure, AccelerationStructureHandle, Buffer, BufferHandle,
    DescriptorSetHandle, ImageLayout, ImageViewHandle, Sampler, SamplerHandle,
    ShaderStageFlags, Texture,
};

// ============================================================================
// Layout description
// ============================================================================

/// Kind of resource a binding holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    StorageImage,
    /// Texture without sampler
    SampledImage,
    /// Sampler without texture
    Sampler,
    CombinedImageSampler,
    AccelerationStructure,
}

/// One binding of a descriptor set (`layout(set = S, binding = N)`)
#[derive(Debug, Clone, PartialEq)]
pub struct BindingDescriptor {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    /// Number of array elements (1 for non-arrays)
    pub count: u32,
    pub stages: ShaderStageFlags,
}

impl BindingDescriptor {
    pub fn new(
        binding: u32,
        descriptor_type: DescriptorType,
        count: u32,
        stages: ShaderStageFlags,
    ) -> Self {
        Self { binding, descriptor_type, count, stages }
    }
}

/// One descriptor set of a pipeline
///
/// Set indices need not be contiguous across a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SetDescriptor {
    pub set: u32,
    pub bindings: Vec<BindingDescriptor>,
}

impl SetDescriptor {
    pub fn new(set: u32, bindings: Vec<BindingDescriptor>) -> Self {
        Self { set, bindings }
    }

    pub fn binding(&self, binding: u32) -> Option<&BindingDescriptor> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}

/// Request to allocate `count` replicas of `set`, named `name` for debugging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAndCount {
    pub set: u32,
    pub count: u32,
    pub name: String,
}

impl SetAndCount {
    pub fn new(set: u32, count: u32, name: impl Into<String>) -> Self {
        Self { set, count, name: name.into() }
    }
}

/// Which replica of a set to bind at that set's index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetAndReplica {
    pub set: u32,
    pub replica: u32,
}

impl SetAndReplica {
    pub fn new(set: u32, replica: u32) -> Self {
        Self { set, replica }
    }
}

// ============================================================================
// Binding
// ============================================================================

/// Target slot of a binding operation
///
/// For array bindings `array_element` is the first element written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingSlot {
    pub set: u32,
    pub binding: u32,
    pub replica: u32,
    pub array_element: u32,
}

impl BindingSlot {
    pub fn new(set: u32, binding: u32) -> Self {
        Self { set, binding, replica: 0, array_element: 0 }
    }

    pub fn replica(mut self, replica: u32) -> Self {
        self.replica = replica;
        self
    }

    pub fn element(mut self, array_element: u32) -> Self {
        self.array_element = array_element;
        self
    }
}

/// Resource handed to `Pipeline::bind_resource`
///
/// The variant must agree with the declared descriptor type of the slot:
/// - `Buffer` / `BufferRange`: uniform or storage buffer
/// - `Texture`: sampled image (shader read-only layout) or storage image (general layout)
/// - `CombinedImageSampler`: combined image sampler
/// - `Sampler`: sampler
/// - `AccelerationStructure`: acceleration structure
#[derive(Clone, Copy)]
pub enum BindingResource<'a> {
    Buffer(&'a dyn Buffer),
    BufferRange {
        buffer: &'a dyn Buffer,
        offset: u64,
        range: u64,
    },
    Texture(&'a dyn Texture),
    CombinedImageSampler(&'a dyn Texture, &'a dyn Sampler),
    Sampler(&'a dyn Sampler),
    AccelerationStructure(&'a dyn AccelerationStructure),
}

impl BindingResource<'_> {
    /// Short name used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            BindingResource::Buffer(_) => "buffer",
            BindingResource::BufferRange { .. } => "buffer range",
            BindingResource::Texture(_) => "texture",
            BindingResource::CombinedImageSampler(..) => "texture + sampler",
            BindingResource::Sampler(_) => "sampler",
            BindingResource::AccelerationStructure(_) => "acceleration structure",
        }
    }
}

/// Binding resource reduced to native handles
///
/// This is what the binding table stores and what backends write into sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedDescriptor {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        range: u64,
    },
    Image {
        view: ImageViewHandle,
        layout: ImageLayout,
        sampler: Option<SamplerHandle>,
    },
    Sampler(SamplerHandle),
    AccelerationStructure(AccelerationStructureHandle),
}

/// One batched descriptor write: consecutive array elements of one binding
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorWrite {
    pub set: DescriptorSetHandle,
    pub binding: u32,
    pub first_array_element: u32,
    pub descriptor_type: DescriptorType,
    pub descriptors: Vec<ResolvedDescriptor>,
}

/// Pool capacity for one descriptor type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolSize {
    pub descriptor_type: DescriptorType,
    pub count: u32,
}
