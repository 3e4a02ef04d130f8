/// DynamicRendering - rendering spans without a render pass object
///
/// Stateless helper: `begin_rendering_cmd` turns attachment descriptions into
/// a `RenderingInfo` and, when the primary image changes layout, records the
/// color transition barrier first. `end_rendering_cmd` ends the span and
/// records the symmetric barrier.

use crate::error::{Error, Result};
use crate::renderer::{
    AccessFlags, AttachmentDescription, CommandList, ImageAspectFlags, ImageBarrier, ImageHandle,
    ImageLayout, PipelineStageFlags, Rect2D, RenderingFlags, RenderingInfo,
};
use crate::{engine_bail_err, engine_trace};

const SOURCE: &str = "ecore::dynamic_rendering";

/// Parameters of `DynamicRendering::begin_rendering_cmd`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingBegin {
    /// Primary image, the one transitioned from `old_layout` to `new_layout`
    pub image: ImageHandle,
    pub flags: RenderingFlags,
    pub render_area: Rect2D,
    pub layer_count: u32,
    pub view_mask: u32,
    pub color_attachments: Vec<AttachmentDescription>,
    pub depth_attachment: Option<AttachmentDescription>,
    pub stencil_attachment: Option<AttachmentDescription>,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
}

impl RenderingBegin {
    /// No attachments yet, one layer, `Undefined -> ColorAttachmentOptimal`
    pub fn new(image: ImageHandle, render_area: Rect2D) -> Self {
        Self {
            image,
            flags: RenderingFlags::empty(),
            render_area,
            layer_count: 1,
            view_mask: 0,
            color_attachments: Vec::new(),
            depth_attachment: None,
            stencil_attachment: None,
            old_layout: ImageLayout::Undefined,
            new_layout: ImageLayout::ColorAttachmentOptimal,
        }
    }

    pub fn with_color(mut self, attachment: AttachmentDescription) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth(mut self, attachment: AttachmentDescription) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    pub fn with_stencil(mut self, attachment: AttachmentDescription) -> Self {
        self.stencil_attachment = Some(attachment);
        self
    }

    /// Set both layouts; equal layouts record no barrier
    pub fn with_layouts(mut self, old_layout: ImageLayout, new_layout: ImageLayout) -> Self {
        self.old_layout = old_layout;
        self.new_layout = new_layout;
        self
    }
}

/// Parameters of `DynamicRendering::end_rendering_cmd`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderingEnd {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
}

impl RenderingEnd {
    /// `ColorAttachmentOptimal -> PresentSrc`
    pub fn new(image: ImageHandle) -> Self {
        Self {
            image,
            old_layout: ImageLayout::ColorAttachmentOptimal,
            new_layout: ImageLayout::PresentSrc,
        }
    }

    pub fn with_layouts(mut self, old_layout: ImageLayout, new_layout: ImageLayout) -> Self {
        self.old_layout = old_layout;
        self.new_layout = new_layout;
        self
    }
}

pub struct DynamicRendering;

impl DynamicRendering {
    /// Instance extensions dynamic rendering depends on
    pub fn instance_extensions() -> &'static [&'static str] {
        &["VK_KHR_get_physical_device_properties2"]
    }

    /// Device extensions to enable on devices older than Vulkan 1.3
    pub fn device_extensions() -> &'static [&'static str] {
        &["VK_KHR_dynamic_rendering"]
    }

    /// Translate `begin` into the `RenderingInfo` handed to the command list
    pub fn rendering_info(begin: &RenderingBegin) -> RenderingInfo {
        RenderingInfo {
            flags: begin.flags,
            render_area: begin.render_area,
            layer_count: begin.layer_count,
            view_mask: begin.view_mask,
            color_attachments: begin.color_attachments.clone(),
            depth_attachment: begin.depth_attachment,
            stencil_attachment: begin.stencil_attachment,
        }
    }

    /// Barrier recorded before a span: top-of-pipe to color attachment output
    pub fn begin_barrier(image: ImageHandle, old_layout: ImageLayout, new_layout: ImageLayout) -> ImageBarrier {
        ImageBarrier {
            src_stage: PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access: AccessFlags::empty(),
            dst_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Self::color_barrier(image, old_layout, new_layout)
        }
    }

    /// Barrier recorded after a span: color attachment output to bottom-of-pipe
    pub fn end_barrier(image: ImageHandle, old_layout: ImageLayout, new_layout: ImageLayout) -> ImageBarrier {
        ImageBarrier {
            src_stage: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: PipelineStageFlags::BOTTOM_OF_PIPE,
            src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access: AccessFlags::empty(),
            ..Self::color_barrier(image, old_layout, new_layout)
        }
    }

    fn color_barrier(image: ImageHandle, old_layout: ImageLayout, new_layout: ImageLayout) -> ImageBarrier {
        ImageBarrier {
            image,
            old_layout,
            new_layout,
            src_stage: PipelineStageFlags::empty(),
            dst_stage: PipelineStageFlags::empty(),
            src_access: AccessFlags::empty(),
            dst_access: AccessFlags::empty(),
            aspect: ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    /// Record the layout transition (if any) then begin rendering
    pub fn begin_rendering_cmd(cmd: &mut dyn CommandList, begin: &RenderingBegin) -> Result<()> {
        // layer_count is ignored under multiview
        if begin.layer_count == 0 && begin.view_mask == 0 {
            engine_bail_err!(SOURCE, Error::InvalidConfiguration(
                "rendering span with a layer count of 0 and no view mask".to_string()
            ));
        }

        if begin.old_layout != begin.new_layout {
            cmd.pipeline_barrier(&[Self::begin_barrier(begin.image, begin.old_layout, begin.new_layout)])?;
        }
        cmd.begin_rendering(&Self::rendering_info(begin))?;

        engine_trace!(SOURCE, "Begin rendering: {} color attachment(s), depth: {}, stencil: {}",
            begin.color_attachments.len(),
            begin.depth_attachment.is_some(),
            begin.stencil_attachment.is_some());
        Ok(())
    }

    /// End rendering then record the layout transition (if any)
    pub fn end_rendering_cmd(cmd: &mut dyn CommandList, end: &RenderingEnd) -> Result<()> {
        cmd.end_rendering()?;
        if end.old_layout != end.new_layout {
            cmd.pipeline_barrier(&[Self::end_barrier(end.image, end.old_layout, end.new_layout)])?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "dynamic_rendering_tests.rs"]
mod tests;
