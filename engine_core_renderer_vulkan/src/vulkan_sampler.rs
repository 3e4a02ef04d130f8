/// VulkanSampler - Vulkan implementation of the Sampler trait
///
/// Samplers come from a small set of presets covering what render passes
/// usually need (filtered, point, shadow comparison).

use ash::vk::{self, Handle};
use engine_core::ecore::render::{Sampler, SamplerHandle};
use engine_core::ecore::Result;
use engine_core::engine_err;
use std::sync::Arc;

use crate::vulkan_context::VulkanContext;

const SOURCE: &str = "ecore::vulkan";

/// Maximum anisotropy used by the filtered presets
const MAX_ANISOTROPY: f32 = 16.0;

/// Sampler configuration presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerPreset {
    /// Trilinear, repeat addressing, anisotropic when supported
    LinearRepeat,
    /// Trilinear, clamp to edge, anisotropic when supported
    LinearClamp,
    NearestRepeat,
    NearestClamp,
    /// Depth comparison (less or equal), white border
    Shadow,
}

/// Vulkan sampler implementation
pub struct VulkanSampler {
    ctx: Arc<VulkanContext>,
    pub(crate) sampler: vk::Sampler,
    preset: SamplerPreset,
}

impl VulkanSampler {
    pub(crate) fn new(ctx: Arc<VulkanContext>, preset: SamplerPreset) -> Result<Self> {
        let create_info = Self::create_info(preset, ctx.capabilities.sampler_anisotropy);
        let sampler = unsafe { ctx.device.create_sampler(&create_info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create {:?} sampler: {:?}", preset, e))?;
        ctx.set_object_name(sampler, &format!("{:?}", preset));

        Ok(Self { ctx, sampler, preset })
    }

    pub fn preset(&self) -> SamplerPreset {
        self.preset
    }

    pub(crate) fn create_info(preset: SamplerPreset, anisotropy_supported: bool) -> vk::SamplerCreateInfo<'static> {
        let (filter, mipmap, address, anisotropic, border, compare) = match preset {
            SamplerPreset::LinearRepeat => (
                vk::Filter::LINEAR,
                vk::SamplerMipmapMode::LINEAR,
                vk::SamplerAddressMode::REPEAT,
                true,
                vk::BorderColor::FLOAT_OPAQUE_BLACK,
                false,
            ),
            SamplerPreset::LinearClamp => (
                vk::Filter::LINEAR,
                vk::SamplerMipmapMode::LINEAR,
                vk::SamplerAddressMode::CLAMP_TO_EDGE,
                true,
                vk::BorderColor::FLOAT_OPAQUE_BLACK,
                false,
            ),
            SamplerPreset::NearestRepeat => (
                vk::Filter::NEAREST,
                vk::SamplerMipmapMode::NEAREST,
                vk::SamplerAddressMode::REPEAT,
                false,
                vk::BorderColor::FLOAT_OPAQUE_BLACK,
                false,
            ),
            SamplerPreset::NearestClamp => (
                vk::Filter::NEAREST,
                vk::SamplerMipmapMode::NEAREST,
                vk::SamplerAddressMode::CLAMP_TO_EDGE,
                false,
                vk::BorderColor::FLOAT_OPAQUE_BLACK,
                false,
            ),
            SamplerPreset::Shadow => (
                vk::Filter::LINEAR,
                vk::SamplerMipmapMode::NEAREST,
                vk::SamplerAddressMode::CLAMP_TO_BORDER,
                false,
                vk::BorderColor::FLOAT_OPAQUE_WHITE,
                true,
            ),
        };

        let anisotropic = anisotropic && anisotropy_supported;
        vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap)
            .address_mode_u(address)
            .address_mode_v(address)
            .address_mode_w(address)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(border)
            .compare_enable(compare)
            .compare_op(if compare { vk::CompareOp::LESS_OR_EQUAL } else { vk::CompareOp::ALWAYS })
            .anisotropy_enable(anisotropic)
            .max_anisotropy(if anisotropic { MAX_ANISOTROPY } else { 1.0 })
    }
}

impl Sampler for VulkanSampler {
    fn handle(&self) -> SamplerHandle {
        SamplerHandle::from_raw(self.sampler.as_raw())
    }
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_sampler(self.sampler, None);
        }
    }
}
