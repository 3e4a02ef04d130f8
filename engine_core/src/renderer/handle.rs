/// Native object handles
///
/// Backends hand out raw 64-bit handles (Vulkan non-dispatchable handles fit
/// in a u64). The core never dereferences them; each kind gets its own newtype
/// so a descriptor set can't be passed where a pipeline layout is expected.

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(u64);

        impl $name {
            /// The null handle
            pub const NULL: Self = Self(0);

            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub fn as_raw(self) -> u64 {
                self.0
            }

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

define_handle!(
    /// Pipeline state object
    PipelineHandle
);
define_handle!(
    /// Pipeline layout
    PipelineLayoutHandle
);
define_handle!(
    /// Descriptor set layout
    DescriptorSetLayoutHandle
);
define_handle!(
    /// Descriptor pool
    DescriptorPoolHandle
);
define_handle!(
    /// Allocated descriptor set
    DescriptorSetHandle
);
define_handle!(
    /// Shader module
    ShaderModuleHandle
);
define_handle!(BufferHandle);
define_handle!(ImageHandle);
define_handle!(ImageViewHandle);
define_handle!(SamplerHandle);
define_handle!(
    /// Top- or bottom-level acceleration structure
    AccelerationStructureHandle
);
define_handle!(
    /// Externally owned render pass (pipelines built without dynamic rendering)
    RenderPassHandle
);
