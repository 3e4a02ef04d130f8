/// DescriptorLayoutBuilder - set layouts derived from declared SetDescriptors

use std::collections::BTreeMap;
use crate::error::{Error, Result};
use crate::renderer::{
    DescriptorSetLayoutDesc, DescriptorSetLayoutHandle, Device, SetDescriptor,
};
use crate::{engine_bail_err, engine_debug};

const SOURCE: &str = "ecore::descriptor";

/// Highest set index + 1 a pipeline may declare
pub const MAX_DESCRIPTOR_SETS: u32 = 32;

/// Builds one descriptor set layout per set index
pub struct DescriptorLayoutBuilder;

impl DescriptorLayoutBuilder {
    /// Check set and binding uniqueness, counts and stage masks
    pub fn validate(sets: &[SetDescriptor]) -> Result<()> {
        for (i, set) in sets.iter().enumerate() {
            if set.set >= MAX_DESCRIPTOR_SETS {
                engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                    "set index {} exceeds the limit of {} sets", set.set, MAX_DESCRIPTOR_SETS
                )));
            }
            if sets[..i].iter().any(|s| s.set == set.set) {
                engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                    "set {} is declared twice", set.set
                )));
            }
            for (j, binding) in set.bindings.iter().enumerate() {
                if set.bindings[..j].iter().any(|b| b.binding == binding.binding) {
                    engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                        "set {}: binding {} is declared twice", set.set, binding.binding
                    )));
                }
                if binding.count == 0 {
                    engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                        "set {}: binding {} has a count of 0", set.set, binding.binding
                    )));
                }
                if binding.stages.is_empty() {
                    engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                        "set {}: binding {} is visible to no shader stage", set.set, binding.binding
                    )));
                }
            }
        }
        Ok(())
    }

    /// Layout descriptors ordered by set index
    ///
    /// Gaps between declared set indices get empty layouts so that the
    /// position in the result is the set number.
    pub fn layout_descs(sets: &[SetDescriptor], name: &str) -> Vec<DescriptorSetLayoutDesc> {
        let by_index: BTreeMap<u32, &SetDescriptor> = sets.iter().map(|s| (s.set, s)).collect();
        let count = by_index.keys().next_back().map_or(0, |last| last + 1);

        (0..count)
            .map(|index| {
                let mut bindings = by_index
                    .get(&index)
                    .map(|s| s.bindings.clone())
                    .unwrap_or_default();
                bindings.sort_by_key(|b| b.binding);
                DescriptorSetLayoutDesc {
                    name: format!("descriptor set layout {}: {}", index, name),
                    set: index,
                    bindings,
                }
            })
            .collect()
    }

    /// Create the layouts on `device`
    ///
    /// On failure every layout created so far is destroyed.
    pub fn build(
        device: &dyn Device,
        sets: &[SetDescriptor],
        name: &str,
    ) -> Result<Vec<DescriptorSetLayoutHandle>> {
        Self::validate(sets)?;

        let descs = Self::layout_descs(sets, name);
        let mut layouts = Vec::with_capacity(descs.len());
        for desc in &descs {
            match device.create_descriptor_set_layout(desc) {
                Ok(layout) => layouts.push(layout),
                Err(e) => {
                    Self::destroy(device, &mut layouts);
                    return Err(e);
                }
            }
        }

        engine_debug!(SOURCE, "Created {} descriptor set layout(s) for '{}'", layouts.len(), name);
        Ok(layouts)
    }

    pub fn destroy(device: &dyn Device, layouts: &mut Vec<DescriptorSetLayoutHandle>) {
        for layout in layouts.drain(..) {
            device.destroy_descriptor_set_layout(layout);
        }
    }
}

#[cfg(test)]
#[path = "descriptor_layout_tests.rs"]
mod tests;
