/// CommandList trait and the recording-side types it takes
///
/// Command lists are owned and submitted by the caller; pipelines and the
/// dynamic rendering helper only record into them.

use bitflags::bitflags;
use crate::error::Result;
use crate::renderer::{
    BufferHandle, DescriptorSetHandle, ImageHandle, ImageLayout, ImageViewHandle, IndexType,
    PipelineBindPoint, PipelineHandle, PipelineLayoutHandle, Rect2D, ShaderStageFlags, Viewport,
};

// ============================================================================
// Barriers
// ============================================================================

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStageFlags: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_SHADER = 1 << 1;
        const FRAGMENT_SHADER = 1 << 2;
        const EARLY_FRAGMENT_TESTS = 1 << 3;
        const LATE_FRAGMENT_TESTS = 1 << 4;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 5;
        const COMPUTE_SHADER = 1 << 6;
        const TRANSFER = 1 << 7;
        const BOTTOM_OF_PIPE = 1 << 8;
        const RAY_TRACING_SHADER = 1 << 9;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const SHADER_READ = 1 << 0;
        const SHADER_WRITE = 1 << 1;
        const COLOR_ATTACHMENT_READ = 1 << 2;
        const COLOR_ATTACHMENT_WRITE = 1 << 3;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 5;
        const TRANSFER_READ = 1 << 6;
        const TRANSFER_WRITE = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspectFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_stage: PipelineStageFlags,
    pub dst_stage: PipelineStageFlags,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub aspect: ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

// ============================================================================
// Dynamic rendering
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOp {
    Load,
    Clear,
    #[default]
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreOp {
    Store,
    #[default]
    DontCare,
}

/// Multisample resolve mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    #[default]
    None,
    SampleZero,
    Average,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl Default for ClearValue {
    fn default() -> Self {
        ClearValue::Color([0.0, 0.0, 0.0, 1.0])
    }
}

/// One attachment of a dynamic rendering span
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentDescription {
    pub image_view: ImageViewHandle,
    pub image_layout: ImageLayout,
    pub resolve_mode: ResolveMode,
    pub resolve_image_view: Option<ImageViewHandle>,
    pub resolve_image_layout: ImageLayout,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: ClearValue,
}

impl AttachmentDescription {
    /// Color attachment in `ColorAttachmentOptimal` without resolve
    pub fn color(image_view: ImageViewHandle, load_op: LoadOp, store_op: StoreOp) -> Self {
        Self {
            image_view,
            image_layout: ImageLayout::ColorAttachmentOptimal,
            resolve_mode: ResolveMode::None,
            resolve_image_view: None,
            resolve_image_layout: ImageLayout::Undefined,
            load_op,
            store_op,
            clear_value: ClearValue::default(),
        }
    }

    /// Depth (or stencil) attachment in `DepthStencilAttachmentOptimal`
    pub fn depth(image_view: ImageViewHandle, load_op: LoadOp, store_op: StoreOp) -> Self {
        Self {
            image_layout: ImageLayout::DepthStencilAttachmentOptimal,
            clear_value: ClearValue::DepthStencil { depth: 1.0, stencil: 0 },
            ..Self::color(image_view, load_op, store_op)
        }
    }

    pub fn with_clear_value(mut self, clear_value: ClearValue) -> Self {
        self.clear_value = clear_value;
        self
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderingFlags: u32 {
        const CONTENTS_SECONDARY_COMMAND_BUFFERS = 1 << 0;
        const SUSPENDING = 1 << 1;
        const RESUMING = 1 << 2;
    }
}

/// Parameters of `CommandList::begin_rendering`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo {
    pub flags: RenderingFlags,
    pub render_area: Rect2D,
    pub layer_count: u32,
    pub view_mask: u32,
    pub color_attachments: Vec<AttachmentDescription>,
    pub depth_attachment: Option<AttachmentDescription>,
    pub stencil_attachment: Option<AttachmentDescription>,
}

// ============================================================================
// CommandList trait
// ============================================================================

/// Command list trait for recording GPU commands
///
/// Implemented by backend-specific command lists (e.g. VulkanCommandList).
pub trait CommandList: Send {
    /// Begin recording
    fn begin(&mut self) -> Result<()>;

    /// End recording
    fn end(&mut self) -> Result<()>;

    fn bind_pipeline(&mut self, bind_point: PipelineBindPoint, pipeline: PipelineHandle) -> Result<()>;

    /// Bind `sets` starting at set index `first_set`
    fn bind_descriptor_sets(
        &mut self,
        bind_point: PipelineBindPoint,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) -> Result<()>;

    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()>;

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) -> Result<()>;

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) -> Result<()>;

    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()>;

    fn set_scissor(&mut self, scissor: &Rect2D) -> Result<()>;

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()>;

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()>;

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> Result<()>;

    fn pipeline_barrier(&mut self, barriers: &[ImageBarrier]) -> Result<()>;

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()>;

    fn end_rendering(&mut self) -> Result<()>;
}
