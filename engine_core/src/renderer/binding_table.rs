/// ResourceBindingTable - staged descriptor writes and their committed mirror
///
/// Binding a resource only records a pending write keyed by
/// (set, replica, binding, array element). Staging the same slot twice keeps
/// the last value. `flush` turns every pending write into one batched device
/// update and clears the pending list.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use crate::error::{Error, Result};
use crate::renderer::{
    BindingDescriptor, BindingResource, BindingSlot, DescriptorSetHandle, DescriptorType,
    DescriptorWrite, Device, ImageLayout, ResolvedDescriptor, SetDescriptor,
};
use crate::{engine_bail_err, engine_err, engine_trace};

const SOURCE: &str = "ecore::descriptor";

/// (set, replica, binding, array element)
type SlotKey = (u32, u32, u32, u32);

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    descriptor_type: DescriptorType,
    descriptor: ResolvedDescriptor,
}

#[derive(Default)]
struct BindingState {
    pending: BTreeMap<SlotKey, PendingWrite>,
    committed: FxHashMap<SlotKey, ResolvedDescriptor>,
    /// (set, replica) pairs with pending writes
    dirty: FxHashSet<(u32, u32)>,
}

pub(crate) struct ResourceBindingTable {
    pipeline_name: String,
    /// set -> binding -> declaration
    declared: FxHashMap<u32, FxHashMap<u32, BindingDescriptor>>,
    /// set -> one descriptor set per replica
    replicas: FxHashMap<u32, Vec<DescriptorSetHandle>>,
    allocated: bool,
    state: Mutex<BindingState>,
}

impl ResourceBindingTable {
    pub fn new(pipeline_name: &str, sets: &[SetDescriptor]) -> Self {
        let declared = sets
            .iter()
            .map(|set| {
                let bindings = set.bindings.iter().map(|b| (b.binding, b.clone())).collect();
                (set.set, bindings)
            })
            .collect();

        Self {
            pipeline_name: pipeline_name.to_string(),
            declared,
            replicas: FxHashMap::default(),
            allocated: false,
            state: Mutex::new(BindingState::default()),
        }
    }

    /// Record the allocated replicas; called once by `Pipeline::allocate_descriptors`
    pub fn set_replicas(&mut self, replicas: FxHashMap<u32, Vec<DescriptorSetHandle>>) {
        self.replicas = replicas;
        self.allocated = true;
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    pub fn replica_count(&self, set: u32) -> u32 {
        self.replicas.get(&set).map_or(0, |r| r.len() as u32)
    }

    /// Descriptor set of (set, replica), validated
    pub fn descriptor_set(&self, set: u32, replica: u32) -> Result<DescriptorSetHandle> {
        if !self.allocated {
            engine_bail_err!(SOURCE, Error::DescriptorsNotAllocated(format!(
                "pipeline '{}': allocate_descriptors has not been called", self.pipeline_name
            )));
        }
        let Some(replicas) = self.replicas.get(&set) else {
            engine_bail_err!(SOURCE, Error::InvalidBinding(format!(
                "pipeline '{}': set {} has no allocated replicas", self.pipeline_name, set
            )));
        };
        match replicas.get(replica as usize) {
            Some(handle) => Ok(*handle),
            None => {
                engine_bail_err!(SOURCE, Error::InvalidBinding(format!(
                    "pipeline '{}': replica {} of set {} out of range ({} allocated)",
                    self.pipeline_name, replica, set, replicas.len()
                )));
            }
        }
    }

    /// Validate and stage `resources` into consecutive elements starting at `slot`
    ///
    /// Nothing is staged if any resource is rejected.
    pub fn stage(&self, slot: BindingSlot, resources: &[BindingResource]) -> Result<usize> {
        let Some(bindings) = self.declared.get(&slot.set) else {
            engine_bail_err!(SOURCE, Error::InvalidBinding(format!(
                "pipeline '{}': set {} is not declared", self.pipeline_name, slot.set
            )));
        };
        let Some(declaration) = bindings.get(&slot.binding) else {
            engine_bail_err!(SOURCE, Error::InvalidBinding(format!(
                "pipeline '{}': set {} has no binding {}", self.pipeline_name, slot.set, slot.binding
            )));
        };
        self.descriptor_set(slot.set, slot.replica)?;

        if resources.is_empty() {
            engine_bail_err!(SOURCE, Error::InvalidBinding(format!(
                "pipeline '{}': set {} binding {}: no resource given",
                self.pipeline_name, slot.set, slot.binding
            )));
        }
        let end = slot.array_element as u64 + resources.len() as u64;
        if end > declaration.count as u64 {
            engine_bail_err!(SOURCE, Error::InvalidBinding(format!(
                "pipeline '{}': set {} binding {}: elements {}..{} out of range (count {})",
                self.pipeline_name, slot.set, slot.binding, slot.array_element, end, declaration.count
            )));
        }

        let mut resolved = Vec::with_capacity(resources.len());
        for resource in resources {
            resolved.push(self.resolve(slot, declaration, resource)?);
        }

        let mut state = self.lock_state()?;
        for (offset, descriptor) in resolved.into_iter().enumerate() {
            let key = (slot.set, slot.replica, slot.binding, slot.array_element + offset as u32);
            state.pending.insert(key, PendingWrite {
                descriptor_type: declaration.descriptor_type,
                descriptor,
            });
        }
        state.dirty.insert((slot.set, slot.replica));

        engine_trace!(SOURCE, "'{}': staged {} write(s) at set {} replica {} binding {} element {}",
            self.pipeline_name, resources.len(), slot.set, slot.replica, slot.binding, slot.array_element);
        Ok(resources.len())
    }

    /// Match a resource against the declared descriptor type
    fn resolve(
        &self,
        slot: BindingSlot,
        declaration: &BindingDescriptor,
        resource: &BindingResource,
    ) -> Result<ResolvedDescriptor> {
        let ty = declaration.descriptor_type;
        let resolved = match (resource, ty) {
            (BindingResource::Buffer(buffer), DescriptorType::UniformBuffer | DescriptorType::StorageBuffer) => {
                Some(ResolvedDescriptor::Buffer { buffer: buffer.handle(), offset: 0, range: buffer.size() })
            }
            (
                BindingResource::BufferRange { buffer, offset, range },
                DescriptorType::UniformBuffer | DescriptorType::StorageBuffer,
            ) => {
                if offset.saturating_add(*range) > buffer.size() {
                    engine_bail_err!(SOURCE, Error::InvalidBinding(format!(
                        "pipeline '{}': set {} binding {}: range {}+{} exceeds buffer size {}",
                        self.pipeline_name, slot.set, slot.binding, offset, range, buffer.size()
                    )));
                }
                Some(ResolvedDescriptor::Buffer { buffer: buffer.handle(), offset: *offset, range: *range })
            }
            (BindingResource::Texture(texture), DescriptorType::SampledImage) => Some(ResolvedDescriptor::Image {
                view: texture.view(),
                layout: ImageLayout::ShaderReadOnlyOptimal,
                sampler: None,
            }),
            (BindingResource::Texture(texture), DescriptorType::StorageImage) => Some(ResolvedDescriptor::Image {
                view: texture.view(),
                layout: ImageLayout::General,
                sampler: None,
            }),
            (BindingResource::CombinedImageSampler(texture, sampler), DescriptorType::CombinedImageSampler) => {
                Some(ResolvedDescriptor::Image {
                    view: texture.view(),
                    layout: ImageLayout::ShaderReadOnlyOptimal,
                    sampler: Some(sampler.handle()),
                })
            }
            (BindingResource::Sampler(sampler), DescriptorType::Sampler) => {
                Some(ResolvedDescriptor::Sampler(sampler.handle()))
            }
            (BindingResource::AccelerationStructure(accel), DescriptorType::AccelerationStructure) => {
                Some(ResolvedDescriptor::AccelerationStructure(accel.handle()))
            }
            _ => None,
        };

        match resolved {
            Some(descriptor) => Ok(descriptor),
            None => {
                engine_bail_err!(SOURCE, Error::InvalidBinding(format!(
                    "pipeline '{}': set {} binding {} expects {:?}, got {}",
                    self.pipeline_name, slot.set, slot.binding, ty, resource.kind_name()
                )));
            }
        }
    }

    /// Push every pending write to the device in one call
    ///
    /// Consecutive elements of the same binding are merged into one write.
    /// Returns the number of writes issued. The pending list is cleared even
    /// when the device update fails.
    pub fn flush(&self, device: &dyn Device) -> Result<usize> {
        let mut state = self.lock_state()?;
        if state.pending.is_empty() {
            return Ok(0);
        }

        let pending = std::mem::take(&mut state.pending);
        state.dirty.clear();

        let mut writes: Vec<DescriptorWrite> = Vec::new();
        let mut last_key: Option<SlotKey> = None;
        for (&key, write) in &pending {
            let (set, replica, binding, element) = key;
            let extends_previous = matches!(
                last_key,
                Some((s, r, b, e)) if s == set && r == replica && b == binding && e + 1 == element
            );
            if extends_previous {
                if let Some(current) = writes.last_mut() {
                    current.descriptors.push(write.descriptor);
                }
            } else {
                let handle = self
                    .replicas
                    .get(&set)
                    .and_then(|r| r.get(replica as usize))
                    .copied()
                    .ok_or_else(|| engine_err!(SOURCE,
                        "pipeline '{}': no descriptor set for set {} replica {}",
                        self.pipeline_name, set, replica))?;
                writes.push(DescriptorWrite {
                    set: handle,
                    binding,
                    first_array_element: element,
                    descriptor_type: write.descriptor_type,
                    descriptors: vec![write.descriptor],
                });
            }
            last_key = Some(key);
        }

        device.update_descriptor_sets(&writes)?;

        for (key, write) in pending {
            state.committed.insert(key, write.descriptor);
        }

        engine_trace!(SOURCE, "'{}': flushed {} descriptor write(s)", self.pipeline_name, writes.len());
        Ok(writes.len())
    }

    /// Descriptor visible in the GPU set at `slot` after the last flush
    pub fn committed(&self, slot: BindingSlot) -> Option<ResolvedDescriptor> {
        let state = self.state.lock().ok()?;
        state
            .committed
            .get(&(slot.set, slot.replica, slot.binding, slot.array_element))
            .copied()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().map_or(0, |s| s.pending.len())
    }

    /// Whether (set, replica) has writes staged since the last flush
    pub fn is_dirty(&self, set: u32, replica: u32) -> bool {
        self.state.lock().map_or(false, |s| s.dirty.contains(&(set, replica)))
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, BindingState>> {
        self.state
            .lock()
            .map_err(|_| engine_err!(SOURCE, "pipeline '{}': binding table lock poisoned", self.pipeline_name))
    }
}

#[cfg(test)]
#[path = "binding_table_tests.rs"]
mod tests;
