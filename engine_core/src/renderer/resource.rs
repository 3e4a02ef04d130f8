/// Resource traits referenced by pipelines
///
/// Pipelines never own these resources: they only read the native handles
/// when a binding is staged. Keeping the resource alive until the GPU is done
/// with it is the caller's job.

use crate::renderer::{
    AccelerationStructureHandle, BufferHandle, Format, ImageHandle, ImageViewHandle,
    SamplerHandle,
};

/// GPU image + default view
pub trait Texture: Send + Sync {
    fn image(&self) -> ImageHandle;

    /// View used when the texture is bound to a descriptor or an attachment
    fn view(&self) -> ImageViewHandle;

    fn format(&self) -> Format;
}

/// GPU buffer
pub trait Buffer: Send + Sync {
    fn handle(&self) -> BufferHandle;

    /// Size in bytes
    fn size(&self) -> u64;
}

/// Texture sampler
pub trait Sampler: Send + Sync {
    fn handle(&self) -> SamplerHandle;
}

/// Ray tracing acceleration structure
pub trait AccelerationStructure: Send + Sync {
    fn handle(&self) -> AccelerationStructureHandle;
}

/// Image layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    PresentSrc,
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    U16,
    #[default]
    U32,
}
