/// VulkanShader - Vulkan implementation of the Shader trait

use ash::vk::{self, Handle};
use engine_core::ecore::render::{Shader, ShaderModuleHandle, ShaderStage};
use engine_core::ecore::{Error, Result};
use engine_core::{engine_bail_err, engine_err};
use std::io::Cursor;
use std::sync::Arc;

use crate::vulkan_context::VulkanContext;

const SOURCE: &str = "ecore::vulkan";

/// Vulkan shader module
pub struct VulkanShader {
    /// Shared context (for cleanup)
    ctx: Arc<VulkanContext>,
    /// Vulkan shader module
    pub(crate) module: vk::ShaderModule,
    stage: ShaderStage,
    /// Entry point name
    entry_point: String,
}

impl VulkanShader {
    /// Create a shader module from SPIR-V bytes
    ///
    /// The byte length must be a multiple of 4; the words are read in the
    /// byte order of the SPIR-V magic number.
    pub(crate) fn new(
        ctx: Arc<VulkanContext>,
        stage: ShaderStage,
        code: &[u8],
        entry_point: &str,
        name: &str,
    ) -> Result<Self> {
        if code.is_empty() || code.len() % 4 != 0 {
            engine_bail_err!(SOURCE, Error::InvalidResource(format!(
                "Shader '{}': SPIR-V size must be a non-zero multiple of 4 (got {} bytes)",
                name,
                code.len()
            )));
        }

        let words = ash::util::read_spv(&mut Cursor::new(code))
            .map_err(|e| engine_err!(SOURCE, "Shader '{}': invalid SPIR-V: {}", name, e))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { ctx.device.create_shader_module(&create_info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create shader module '{}': {:?}", name, e))?;
        ctx.set_object_name(module, name);

        Ok(Self {
            ctx,
            module,
            stage,
            entry_point: entry_point.to_string(),
        })
    }
}

impl Shader for VulkanShader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn module_handle(&self) -> ShaderModuleHandle {
        ShaderModuleHandle::from_raw(self.module.as_raw())
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.module, None);
        }
    }
}
