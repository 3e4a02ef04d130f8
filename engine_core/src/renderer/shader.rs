/// Shader trait, stages and specialization constants

use bitflags::bitflags;
use bytemuck::Pod;
use crate::error::{Error, Result};
use crate::renderer::ShaderModuleHandle;

/// Single shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    RayGen,
    Miss,
    ClosestHit,
}

impl ShaderStage {
    /// Stage as a single-bit mask
    pub fn flag(self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
            ShaderStage::RayGen => ShaderStageFlags::RAYGEN,
            ShaderStage::Miss => ShaderStageFlags::MISS,
            ShaderStage::ClosestHit => ShaderStageFlags::CLOSEST_HIT,
        }
    }
}

bitflags! {
    /// Shader stage visibility mask (descriptor bindings, push constant ranges)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const RAYGEN = 1 << 3;
        const MISS = 1 << 4;
        const CLOSEST_HIT = 1 << 5;
        const ANY_HIT = 1 << 6;
        const INTERSECTION = 1 << 7;

        const VERTEX_FRAGMENT = Self::VERTEX.bits() | Self::FRAGMENT.bits();
        const ALL_RAY_TRACING = Self::RAYGEN.bits()
            | Self::MISS.bits()
            | Self::CLOSEST_HIT.bits()
            | Self::ANY_HIT.bits()
            | Self::INTERSECTION.bits();
    }
}

/// Compiled shader module
///
/// Pipelines only keep a `Weak` reference to shaders: the module must be alive
/// while the pipeline is being built and may be released afterwards.
pub trait Shader: Send + Sync {
    /// Stage this module was compiled for
    fn stage(&self) -> ShaderStage;

    /// Entry point name (usually "main")
    fn entry_point(&self) -> &str;

    /// Native module handle
    fn module_handle(&self) -> ShaderModuleHandle;
}

// ============================================================================
// Specialization constants
// ============================================================================

/// One specialization constant (`layout(constant_id = N)`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecializationEntry {
    pub constant_id: u32,
    /// Byte offset into the data blob
    pub offset: u32,
    /// Size in bytes
    pub size: usize,
}

/// Specialization constants for one shader stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecializationConstants {
    pub entries: Vec<SpecializationEntry>,
    pub data: Vec<u8>,
}

impl SpecializationConstants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constant, packing its bytes at the end of the data blob
    pub fn with<T: Pod>(mut self, constant_id: u32, value: T) -> Self {
        let bytes = bytemuck::bytes_of(&value);
        self.entries.push(SpecializationEntry {
            constant_id,
            offset: self.data.len() as u32,
            size: bytes.len(),
        });
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes the entries require (end of the furthest entry)
    pub fn required_size(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.offset as usize + e.size)
            .max()
            .unwrap_or(0)
    }

    /// Entries must fit in the data blob and constant ids must be unique
    pub fn validate(&self) -> Result<()> {
        if self.required_size() > self.data.len() {
            return Err(Error::InvalidConfiguration(format!(
                "specialization data is {} bytes but entries need {}",
                self.data.len(),
                self.required_size()
            )));
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if self.entries[..i].iter().any(|e| e.constant_id == entry.constant_id) {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate specialization constant_id {}",
                    entry.constant_id
                )));
            }
        }
        Ok(())
    }
}
