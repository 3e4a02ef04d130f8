//! Unit tests for ResourceBindingTable

use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::error::Error;
use crate::renderer::binding_table::ResourceBindingTable;
use crate::renderer::descriptor_pool::DescriptorPoolManager;
use crate::renderer::mock_device::*;
use crate::renderer::{
    BindingDescriptor, BindingResource, BindingSlot, Buffer, DescriptorLayoutBuilder,
    DescriptorPoolSizing, DescriptorSetHandle, DescriptorType, ImageLayout, ResolvedDescriptor,
    SetAndCount, SetDescriptor, ShaderStageFlags, Texture,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn sets() -> Vec<SetDescriptor> {
    vec![SetDescriptor::new(0, vec![
        BindingDescriptor::new(0, DescriptorType::CombinedImageSampler, 3, ShaderStageFlags::FRAGMENT),
        BindingDescriptor::new(1, DescriptorType::UniformBuffer, 1, ShaderStageFlags::VERTEX),
        BindingDescriptor::new(2, DescriptorType::StorageImage, 1, ShaderStageFlags::COMPUTE),
    ])]
}

/// Table over set 0 with two replicas allocated on the mock device
fn allocated_table(device: &Arc<MockDevice>) -> (ResourceBindingTable, DescriptorPoolManager) {
    let sets = sets();
    let layouts = DescriptorLayoutBuilder::build(device.as_ref(), &sets, "table").unwrap();
    let sizing = DescriptorPoolSizing::compute(&sets, &[SetAndCount::new(0, 2, "material")]).unwrap();
    let mut pool = DescriptorPoolManager::create(device.as_ref(), sizing, "table").unwrap();

    let replicas = vec![
        pool.allocate(device.as_ref(), layouts[0], "descriptor set: material 0").unwrap(),
        pool.allocate(device.as_ref(), layouts[0], "descriptor set: material 1").unwrap(),
    ];
    let mut map = FxHashMap::default();
    map.insert(0, replicas);

    let mut table = ResourceBindingTable::new("table", &sets);
    table.set_replicas(map);
    (table, pool)
}

fn image_of(texture: &MockTexture, sampler: &MockSampler) -> ResolvedDescriptor {
    ResolvedDescriptor::Image {
        view: texture.view(),
        layout: ImageLayout::ShaderReadOnlyOptimal,
        sampler: Some(sampler.handle),
    }
}

// ============================================================================
// Staging validation
// ============================================================================

#[test]
fn test_stage_before_allocation_rejected() {
    let table = ResourceBindingTable::new("table", &sets());
    let buffer = MockBuffer::new(256);

    let result = table.stage(BindingSlot::new(0, 1), &[BindingResource::Buffer(&buffer)]);
    assert!(matches!(result, Err(Error::DescriptorsNotAllocated(_))));
    assert_eq!(table.pending_count(), 0);
}

#[test]
fn test_stage_undeclared_slot_rejected() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let buffer = MockBuffer::new(256);

    let undeclared_set = table.stage(BindingSlot::new(4, 0), &[BindingResource::Buffer(&buffer)]);
    assert!(matches!(undeclared_set, Err(Error::InvalidBinding(_))));

    let undeclared_binding = table.stage(BindingSlot::new(0, 7), &[BindingResource::Buffer(&buffer)]);
    assert!(matches!(undeclared_binding, Err(Error::InvalidBinding(_))));
}

#[test]
fn test_stage_replica_out_of_range_rejected() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let buffer = MockBuffer::new(256);

    let result = table.stage(BindingSlot::new(0, 1).replica(2), &[BindingResource::Buffer(&buffer)]);
    assert!(matches!(result, Err(Error::InvalidBinding(_))));
}

#[test]
fn test_stage_element_overflow_stages_nothing() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let texture = MockTexture::new();
    let sampler = MockSampler::new();
    let resource = BindingResource::CombinedImageSampler(&texture, &sampler);

    let result = table.stage(BindingSlot::new(0, 0).element(2), &[resource, resource]);
    assert!(matches!(result, Err(Error::InvalidBinding(_))));
    assert_eq!(table.pending_count(), 0);
    assert!(!table.is_dirty(0, 0));
}

#[test]
fn test_stage_empty_resource_list_rejected() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);

    assert!(matches!(table.stage(BindingSlot::new(0, 0), &[]), Err(Error::InvalidBinding(_))));
}

#[test]
fn test_stage_kind_mismatch_rejected() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let buffer = MockBuffer::new(64);
    let texture = MockTexture::new();

    let buffer_into_image = table.stage(BindingSlot::new(0, 0), &[BindingResource::Buffer(&buffer)]);
    assert!(matches!(buffer_into_image, Err(Error::InvalidBinding(_))));

    // A texture without sampler does not fit a combined image sampler binding
    let missing_sampler = table.stage(BindingSlot::new(0, 0), &[BindingResource::Texture(&texture)]);
    assert!(matches!(missing_sampler, Err(Error::InvalidBinding(_))));
}

#[test]
fn test_stage_buffer_range_past_end_rejected() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let buffer = MockBuffer::new(128);

    let result = table.stage(
        BindingSlot::new(0, 1),
        &[BindingResource::BufferRange { buffer: &buffer, offset: 64, range: 128 }],
    );
    assert!(matches!(result, Err(Error::InvalidBinding(_))));
}

#[test]
fn test_storage_image_uses_general_layout() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let texture = MockTexture::new();

    table.stage(BindingSlot::new(0, 2), &[BindingResource::Texture(&texture)]).unwrap();
    table.flush(device.as_ref()).unwrap();

    assert_eq!(
        table.committed(BindingSlot::new(0, 2)),
        Some(ResolvedDescriptor::Image { view: texture.view(), layout: ImageLayout::General, sampler: None })
    );
}

// ============================================================================
// Flush
// ============================================================================

#[test]
fn test_last_write_wins() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let first = MockBuffer::new(64);
    let second = MockBuffer::new(64);
    let slot = BindingSlot::new(0, 1);

    table.stage(slot, &[BindingResource::Buffer(&first)]).unwrap();
    table.stage(slot, &[BindingResource::Buffer(&second)]).unwrap();
    assert_eq!(table.pending_count(), 1);

    assert_eq!(table.flush(device.as_ref()).unwrap(), 1);

    let expected = ResolvedDescriptor::Buffer { buffer: second.handle(), offset: 0, range: 64 };
    assert_eq!(table.committed(slot), Some(expected));
    let set = table.descriptor_set(0, 0).unwrap();
    assert_eq!(device.content(set, 1, 0), Some(expected));
}

#[test]
fn test_flush_merges_consecutive_elements() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let textures = [MockTexture::new(), MockTexture::new(), MockTexture::new()];
    let sampler = MockSampler::new();
    let resources: Vec<BindingResource> = textures
        .iter()
        .map(|t| BindingResource::CombinedImageSampler(t, &sampler))
        .collect();

    table.stage(BindingSlot::new(0, 0), &resources).unwrap();
    assert_eq!(table.flush(device.as_ref()).unwrap(), 1);
    assert_eq!(device.update_call_count(), 1);

    let set = table.descriptor_set(0, 0).unwrap();
    for (i, texture) in textures.iter().enumerate() {
        assert_eq!(device.content(set, 0, i as u32), Some(image_of(texture, &sampler)));
    }
}

#[test]
fn test_flush_splits_non_consecutive_elements_and_replicas() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let texture = MockTexture::new();
    let sampler = MockSampler::new();
    let resource = BindingResource::CombinedImageSampler(&texture, &sampler);

    table.stage(BindingSlot::new(0, 0).element(0), &[resource]).unwrap();
    table.stage(BindingSlot::new(0, 0).element(2), &[resource]).unwrap();
    table.stage(BindingSlot::new(0, 0).replica(1), &[resource]).unwrap();

    // Three writes, still one device call
    assert_eq!(table.flush(device.as_ref()).unwrap(), 3);
    assert_eq!(device.update_call_count(), 1);
}

#[test]
fn test_flush_nothing_pending() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);

    assert_eq!(table.flush(device.as_ref()).unwrap(), 0);
    assert_eq!(device.update_call_count(), 0);
}

#[test]
fn test_flush_clears_dirty_flags() {
    let device = MockDevice::new();
    let (table, _pool) = allocated_table(&device);
    let buffer = MockBuffer::new(64);

    table.stage(BindingSlot::new(0, 1).replica(1), &[BindingResource::Buffer(&buffer)]).unwrap();
    assert!(table.is_dirty(0, 1));
    assert!(!table.is_dirty(0, 0));

    table.flush(device.as_ref()).unwrap();
    assert!(!table.is_dirty(0, 1));
    assert_eq!(table.pending_count(), 0);
}

#[test]
fn test_failed_flush_drops_pending_writes() {
    let device = MockDevice::new();
    let mut table = ResourceBindingTable::new("orphan", &sets());
    let mut map = FxHashMap::default();
    // Sets the device never allocated
    map.insert(0, vec![DescriptorSetHandle::from_raw(9_999)]);
    table.set_replicas(map);

    let buffer = MockBuffer::new(64);
    table.stage(BindingSlot::new(0, 1), &[BindingResource::Buffer(&buffer)]).unwrap();

    assert!(table.flush(device.as_ref()).is_err());
    assert_eq!(table.pending_count(), 0);
    assert_eq!(table.committed(BindingSlot::new(0, 1)), None);
}
