/// DescriptorPoolManager - one exactly-sized pool per pipeline
///
/// The pool is sized from the declared bindings multiplied by the replica
/// count requested for each set, then every replica is allocated from it.
/// The pool never grows: an allocation past its capacity is an error.

use std::collections::BTreeMap;
use crate::error::{Error, Result};
use crate::renderer::{
    DescriptorPoolDesc, DescriptorPoolHandle, DescriptorPoolSize, DescriptorSetHandle,
    DescriptorSetLayoutHandle, DescriptorType, Device, SetAndCount, SetDescriptor,
};
use crate::{engine_bail_err, engine_debug, engine_trace};

const SOURCE: &str = "ecore::descriptor";

/// Capacity of a descriptor pool
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorPoolSizing {
    /// Sum of requested replica counts
    pub max_sets: u32,
    /// Per descriptor type: sum of binding count x replica count
    pub pool_sizes: Vec<DescriptorPoolSize>,
}

impl DescriptorPoolSizing {
    /// Compute the sizing for `requests` against the declared `sets`
    ///
    /// Requests naming undeclared sets are ignored here; callers validate first.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when a total does not fit in a `u32`.
    pub fn compute(sets: &[SetDescriptor], requests: &[SetAndCount]) -> Result<Self> {
        let mut per_type: BTreeMap<DescriptorType, u32> = BTreeMap::new();
        let mut max_sets: u32 = 0;

        for request in requests {
            let Some(set) = sets.iter().find(|s| s.set == request.set) else {
                continue;
            };
            max_sets = match max_sets.checked_add(request.count) {
                Some(total) => total,
                None => {
                    engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                        "descriptor set count overflows for set {} x {}", request.set, request.count
                    )));
                }
            };
            for binding in &set.bindings {
                let total = per_type.entry(binding.descriptor_type).or_insert(0);
                let sum = binding
                    .count
                    .checked_mul(request.count)
                    .and_then(|count| total.checked_add(count));
                *total = match sum {
                    Some(sum) => sum,
                    None => {
                        engine_bail_err!(SOURCE, Error::InvalidConfiguration(format!(
                            "{:?} descriptor count overflows for set {} binding {} ({} x {})",
                            binding.descriptor_type, request.set, binding.binding, binding.count, request.count
                        )));
                    }
                };
            }
        }

        Ok(Self {
            max_sets,
            pool_sizes: per_type
                .into_iter()
                .map(|(descriptor_type, count)| DescriptorPoolSize { descriptor_type, count })
                .collect(),
        })
    }

    /// Number of descriptors of `descriptor_type` the pool can hold
    pub fn capacity_of(&self, descriptor_type: DescriptorType) -> u32 {
        self.pool_sizes
            .iter()
            .find(|s| s.descriptor_type == descriptor_type)
            .map_or(0, |s| s.count)
    }

    /// Total number of writable descriptor slots
    pub fn total_descriptors(&self) -> u32 {
        self.pool_sizes.iter().map(|s| s.count).sum()
    }
}

/// Owner of a pipeline's descriptor pool
pub(crate) struct DescriptorPoolManager {
    /// None when no descriptors were requested
    pool: Option<DescriptorPoolHandle>,
    sizing: DescriptorPoolSizing,
    allocated: u32,
}

impl DescriptorPoolManager {
    /// Create a pool with exactly `sizing` capacity
    pub fn create(device: &dyn Device, sizing: DescriptorPoolSizing, name: &str) -> Result<Self> {
        let pool = if sizing.max_sets == 0 {
            None
        } else {
            let handle = device.create_descriptor_pool(&DescriptorPoolDesc {
                name: format!("descriptor pool: {}", name),
                max_sets: sizing.max_sets,
                pool_sizes: sizing.pool_sizes.clone(),
            })?;
            engine_debug!(SOURCE, "Created descriptor pool for '{}': {} set(s), {} descriptor(s)",
                name, sizing.max_sets, sizing.total_descriptors());
            Some(handle)
        };

        Ok(Self { pool, sizing, allocated: 0 })
    }

    /// Allocate one set; fails once `max_sets` sets have been handed out
    pub fn allocate(
        &mut self,
        device: &dyn Device,
        layout: DescriptorSetLayoutHandle,
        name: &str,
    ) -> Result<DescriptorSetHandle> {
        let pool = match self.pool {
            Some(pool) if self.allocated < self.sizing.max_sets => pool,
            _ => {
                engine_bail_err!(SOURCE, Error::DescriptorPoolExhausted(format!(
                    "cannot allocate '{}': {} of {} set(s) already allocated",
                    name, self.allocated, self.sizing.max_sets
                )));
            }
        };

        let set = device.allocate_descriptor_set(pool, layout, name)?;
        self.allocated += 1;
        engine_trace!(SOURCE, "Allocated descriptor set '{}' ({}/{})",
            name, self.allocated, self.sizing.max_sets);
        Ok(set)
    }

    pub fn sizing(&self) -> &DescriptorPoolSizing {
        &self.sizing
    }

    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Destroy the pool and with it every allocated set
    pub fn destroy(&mut self, device: &dyn Device) {
        if let Some(pool) = self.pool.take() {
            device.destroy_descriptor_pool(pool);
        }
        self.allocated = 0;
    }
}

#[cfg(test)]
#[path = "descriptor_pool_tests.rs"]
mod tests;
