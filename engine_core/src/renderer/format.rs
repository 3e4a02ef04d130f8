//! Pixel and vertex attribute formats

/// Formats used for vertex attributes and attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Undefined,
    // 8-bit
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    // 16-bit float
    R16Sfloat,
    R16G16Sfloat,
    R16G16B16A16Sfloat,
    // 32-bit float
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32Sfloat,
    R32G32B32A32Sfloat,
    // 32-bit integer
    R32Uint,
    R32G32Uint,
    R32G32B32A32Uint,
    R32Sint,
    // Packed
    A2B10G10R10UnormPack32,
    B10G11R11UfloatPack32,
    // Depth / stencil
    D16Unorm,
    D32Sfloat,
    D24UnormS8Uint,
    D32SfloatS8Uint,
    S8Uint,
}

impl Format {
    /// True for formats with a depth component
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D16Unorm | Format::D32Sfloat | Format::D24UnormS8Uint | Format::D32SfloatS8Uint
        )
    }

    /// True for formats with a stencil component
    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32SfloatS8Uint | Format::S8Uint)
    }
}

/// What a format is going to be used for, when asking the device about support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFeature {
    VertexBuffer,
    ColorAttachment,
    DepthStencilAttachment,
    SampledImage,
    StorageImage,
}
