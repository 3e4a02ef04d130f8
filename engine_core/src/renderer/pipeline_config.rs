/// Pipeline configurations (graphics, compute, ray tracing)
///
/// A configuration is everything needed to build a `Pipeline`: the declared
/// descriptor sets, the push constant ranges, weak references to the shader
/// modules and the kind-specific fixed-function state.

use std::sync::{Arc, Weak};
use crate::error::{Error, Result};
use crate::renderer::{
    ColorBlendState, DepthStencilState, DynamicState, Format, MultisampleState,
    PrimitiveTopology, RasterizationState, RenderPassHandle, SetDescriptor, Shader,
    ShaderStageFlags, SpecializationConstants, VertexLayout, Viewport,
};

/// Default ray recursion depth for ray tracing pipelines
pub const DEFAULT_MAX_RAY_RECURSION_DEPTH: u32 = 10;

// ============================================================================
// Kind / bind point
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
    RayTracing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
    RayTracing,
}

impl PipelineKind {
    pub fn bind_point(self) -> PipelineBindPoint {
        match self {
            PipelineKind::Graphics => PipelineBindPoint::Graphics,
            PipelineKind::Compute => PipelineBindPoint::Compute,
            PipelineKind::RayTracing => PipelineBindPoint::RayTracing,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PipelineKind::Graphics => "graphics",
            PipelineKind::Compute => "compute",
            PipelineKind::RayTracing => "ray tracing",
        }
    }
}

// ============================================================================
// Push constants
// ============================================================================

/// Push constant range
///
/// At most one range per stage mask. Offset and size are multiples of 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

impl PushConstantRange {
    pub fn new(stages: ShaderStageFlags, offset: u32, size: u32) -> Self {
        Self { stages, offset, size }
    }

    /// Check a full list of ranges
    pub fn validate_all(ranges: &[PushConstantRange]) -> Result<()> {
        for (i, range) in ranges.iter().enumerate() {
            if range.stages.is_empty() {
                return Err(Error::InvalidConfiguration(format!(
                    "push constant range {} has no shader stage",
                    i
                )));
            }
            if range.size == 0 || range.size % 4 != 0 || range.offset % 4 != 0 {
                return Err(Error::InvalidConfiguration(format!(
                    "push constant range {} (offset {}, size {}) must have a non-zero size \
                     and 4-byte aligned offset and size",
                    i, range.offset, range.size
                )));
            }
            if ranges[..i].iter().any(|r| r.stages == range.stages) {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate push constant range for stages {:?}",
                    range.stages
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Graphics
// ============================================================================

/// Graphics pipeline configuration
///
/// Built with `GraphicsPipelineConfig::new` then adjusted field by field.
/// Without dynamic rendering, `render_pass` must name an externally owned
/// render pass.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub sets: Vec<SetDescriptor>,
    pub vertex_shader: Weak<dyn Shader>,
    pub fragment_shader: Weak<dyn Shader>,
    pub push_constants: Vec<PushConstantRange>,
    pub dynamic_states: Vec<DynamicState>,

    pub use_dynamic_rendering: bool,
    pub render_pass: Option<RenderPassHandle>,
    pub color_formats: Vec<Format>,
    /// Format::Undefined when there is no depth attachment
    pub depth_format: Format,
    /// Format::Undefined when there is no stencil attachment
    pub stencil_format: Format,

    pub topology: PrimitiveTopology,
    pub vertex_layout: VertexLayout,
    pub viewport: Viewport,
    pub rasterization: RasterizationState,
    pub depth_stencil: DepthStencilState,
    pub multisample: MultisampleState,

    /// Used for every color attachment when `blend_states` is empty
    pub blend_enable: bool,
    /// One entry per color attachment, or empty
    pub blend_states: Vec<ColorBlendState>,

    pub vertex_specialization: SpecializationConstants,
    pub fragment_specialization: SpecializationConstants,
}

impl GraphicsPipelineConfig {
    pub fn new(vertex_shader: &Arc<dyn Shader>, fragment_shader: &Arc<dyn Shader>) -> Self {
        Self {
            sets: Vec::new(),
            vertex_shader: Arc::downgrade(vertex_shader),
            fragment_shader: Arc::downgrade(fragment_shader),
            push_constants: Vec::new(),
            dynamic_states: Vec::new(),
            use_dynamic_rendering: false,
            render_pass: None,
            color_formats: Vec::new(),
            depth_format: Format::Undefined,
            stencil_format: Format::Undefined,
            topology: PrimitiveTopology::TriangleList,
            vertex_layout: VertexLayout::default(),
            viewport: Viewport::default(),
            rasterization: RasterizationState::default(),
            depth_stencil: DepthStencilState::default(),
            multisample: MultisampleState::default(),
            blend_enable: false,
            blend_states: Vec::new(),
            vertex_specialization: SpecializationConstants::default(),
            fragment_specialization: SpecializationConstants::default(),
        }
    }

    pub fn with_sets(mut self, sets: Vec<SetDescriptor>) -> Self {
        self.sets = sets;
        self
    }

    pub fn with_push_constants(mut self, ranges: Vec<PushConstantRange>) -> Self {
        self.push_constants = ranges;
        self
    }

    /// Switch to dynamic rendering with the given attachment formats
    pub fn with_dynamic_rendering(
        mut self,
        color_formats: Vec<Format>,
        depth_format: Format,
        stencil_format: Format,
    ) -> Self {
        self.use_dynamic_rendering = true;
        self.render_pass = None;
        self.color_formats = color_formats;
        self.depth_format = depth_format;
        self.stencil_format = stencil_format;
        self
    }

    /// Use an externally owned render pass
    pub fn with_render_pass(mut self, render_pass: RenderPassHandle, color_formats: Vec<Format>) -> Self {
        self.use_dynamic_rendering = false;
        self.render_pass = Some(render_pass);
        self.color_formats = color_formats;
        self
    }

    /// Blend state per color attachment: the explicit list, or the default
    /// alpha-blend state replicated for every color attachment
    pub fn resolved_blend_states(&self) -> Result<Vec<ColorBlendState>> {
        if self.blend_states.is_empty() {
            return Ok(vec![
                ColorBlendState::alpha_blended(self.blend_enable);
                self.color_formats.len()
            ]);
        }
        if self.blend_states.len() != self.color_formats.len() {
            return Err(Error::InvalidConfiguration(format!(
                "{} blend states given for {} color attachments",
                self.blend_states.len(),
                self.color_formats.len()
            )));
        }
        Ok(self.blend_states.clone())
    }
}

// ============================================================================
// Compute
// ============================================================================

#[derive(Clone)]
pub struct ComputePipelineConfig {
    pub sets: Vec<SetDescriptor>,
    pub compute_shader: Weak<dyn Shader>,
    pub push_constants: Vec<PushConstantRange>,
    pub specialization: SpecializationConstants,
}

impl ComputePipelineConfig {
    pub fn new(compute_shader: &Arc<dyn Shader>) -> Self {
        Self {
            sets: Vec::new(),
            compute_shader: Arc::downgrade(compute_shader),
            push_constants: Vec::new(),
            specialization: SpecializationConstants::default(),
        }
    }

    pub fn with_sets(mut self, sets: Vec<SetDescriptor>) -> Self {
        self.sets = sets;
        self
    }

    pub fn with_push_constants(mut self, ranges: Vec<PushConstantRange>) -> Self {
        self.push_constants = ranges;
        self
    }
}

// ============================================================================
// Ray tracing
// ============================================================================

#[derive(Clone)]
pub struct RayTracingPipelineConfig {
    pub sets: Vec<SetDescriptor>,
    pub ray_gen_shader: Weak<dyn Shader>,
    pub miss_shaders: Vec<Weak<dyn Shader>>,
    pub closest_hit_shaders: Vec<Weak<dyn Shader>>,
    pub push_constants: Vec<PushConstantRange>,
    pub max_recursion_depth: u32,
}

impl RayTracingPipelineConfig {
    pub fn new(ray_gen_shader: &Arc<dyn Shader>) -> Self {
        Self {
            sets: Vec::new(),
            ray_gen_shader: Arc::downgrade(ray_gen_shader),
            miss_shaders: Vec::new(),
            closest_hit_shaders: Vec::new(),
            push_constants: Vec::new(),
            max_recursion_depth: DEFAULT_MAX_RAY_RECURSION_DEPTH,
        }
    }

    pub fn with_sets(mut self, sets: Vec<SetDescriptor>) -> Self {
        self.sets = sets;
        self
    }

    pub fn with_miss_shader(mut self, shader: &Arc<dyn Shader>) -> Self {
        self.miss_shaders.push(Arc::downgrade(shader));
        self
    }

    pub fn with_closest_hit_shader(mut self, shader: &Arc<dyn Shader>) -> Self {
        self.closest_hit_shaders.push(Arc::downgrade(shader));
        self
    }

    /// Shader groups in stage order: ray-gen, then misses, then closest hits
    ///
    /// Stage indices refer to the same order.
    pub fn shader_groups(&self) -> Vec<ShaderGroup> {
        let mut groups = Vec::with_capacity(1 + self.miss_shaders.len() + self.closest_hit_shaders.len());
        groups.push(ShaderGroup::General { shader: 0 });
        let mut stage = 1;
        for _ in &self.miss_shaders {
            groups.push(ShaderGroup::General { shader: stage });
            stage += 1;
        }
        for _ in &self.closest_hit_shaders {
            groups.push(ShaderGroup::TrianglesHit { closest_hit: stage });
            stage += 1;
        }
        groups
    }
}

/// Ray tracing shader group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderGroup {
    /// Ray-gen or miss shader
    General { shader: u32 },
    /// Triangle hit group with a closest-hit shader
    TrianglesHit { closest_hit: u32 },
}

// ============================================================================
// Configuration enum
// ============================================================================

/// Configuration of exactly one pipeline kind
#[derive(Clone)]
pub enum PipelineConfig {
    Graphics(GraphicsPipelineConfig),
    Compute(ComputePipelineConfig),
    RayTracing(RayTracingPipelineConfig),
}

impl PipelineConfig {
    pub fn kind(&self) -> PipelineKind {
        match self {
            PipelineConfig::Graphics(_) => PipelineKind::Graphics,
            PipelineConfig::Compute(_) => PipelineKind::Compute,
            PipelineConfig::RayTracing(_) => PipelineKind::RayTracing,
        }
    }

    pub fn sets(&self) -> &[SetDescriptor] {
        match self {
            PipelineConfig::Graphics(c) => &c.sets,
            PipelineConfig::Compute(c) => &c.sets,
            PipelineConfig::RayTracing(c) => &c.sets,
        }
    }

    pub fn push_constants(&self) -> &[PushConstantRange] {
        match self {
            PipelineConfig::Graphics(c) => &c.push_constants,
            PipelineConfig::Compute(c) => &c.push_constants,
            PipelineConfig::RayTracing(c) => &c.push_constants,
        }
    }
}

impl From<GraphicsPipelineConfig> for PipelineConfig {
    fn from(config: GraphicsPipelineConfig) -> Self {
        PipelineConfig::Graphics(config)
    }
}

impl From<ComputePipelineConfig> for PipelineConfig {
    fn from(config: ComputePipelineConfig) -> Self {
        PipelineConfig::Compute(config)
    }
}

impl From<RayTracingPipelineConfig> for PipelineConfig {
    fn from(config: RayTracingPipelineConfig) -> Self {
        PipelineConfig::RayTracing(config)
    }
}

#[cfg(test)]
#[path = "pipeline_config_tests.rs"]
mod tests;
