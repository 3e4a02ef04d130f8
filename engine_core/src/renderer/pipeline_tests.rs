//! Unit tests for Pipeline
//!
//! Construction, descriptor allocation, staging and flushing, recording and
//! cleanup, all against MockDevice / MockCommandList (no GPU required).

use std::sync::Arc;
use crate::error::Error;
use crate::renderer::mock_device::*;
use crate::renderer::{
    BindingDescriptor, BindingResource, BindingSlot, ColorBlendState, CommandList,
    ComputePipelineConfig, DescriptorType, Format, FormatFeature, GraphicsPipelineConfig,
    ImageLayout, IndexType, Pipeline, PipelineBindPoint, PipelineKind, PushConstantRange,
    RayTracingPipelineConfig, RenderPassHandle, ResolvedDescriptor, SetAndCount, SetAndReplica,
    SetDescriptor, Shader, ShaderGroup, ShaderStage, ShaderStageFlags, SpecializationConstants,
    Texture, VertexAttribute, VertexBinding, VertexInputRate, VertexLayout,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn graphics_shaders() -> (Arc<dyn Shader>, Arc<dyn Shader>) {
    (MockShader::new(ShaderStage::Vertex), MockShader::new(ShaderStage::Fragment))
}

/// One combined-image-sampler array of 3 in set 0, one color attachment
fn textured_config(vs: &Arc<dyn Shader>, fs: &Arc<dyn Shader>) -> GraphicsPipelineConfig {
    GraphicsPipelineConfig::new(vs, fs)
        .with_sets(vec![SetDescriptor::new(0, vec![BindingDescriptor::new(
            0,
            DescriptorType::CombinedImageSampler,
            3,
            ShaderStageFlags::FRAGMENT,
        )])])
        .with_dynamic_rendering(vec![Format::B8G8R8A8Unorm], Format::Undefined, Format::Undefined)
}

fn compute_pipeline(device: &Arc<MockDevice>, push_size: u32) -> (Pipeline, Arc<dyn Shader>) {
    let cs = MockShader::new(ShaderStage::Compute);
    let config = ComputePipelineConfig::new(&cs)
        .with_sets(vec![SetDescriptor::new(0, vec![
            BindingDescriptor::new(0, DescriptorType::StorageImage, 1, ShaderStageFlags::COMPUTE),
            BindingDescriptor::new(1, DescriptorType::UniformBuffer, 1, ShaderStageFlags::COMPUTE),
        ])])
        .with_push_constants(vec![PushConstantRange::new(ShaderStageFlags::COMPUTE, 0, push_size)]);
    let pipeline = Pipeline::new(device.clone(), config, "blur").unwrap();
    (pipeline, cs)
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_create_graphics_pipeline() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();

    let pipeline = Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa").unwrap();

    assert_eq!(pipeline.kind(), PipelineKind::Graphics);
    assert_eq!(pipeline.name(), "fxaa");
    assert_eq!(pipeline.set_indices(), vec![0]);
    assert!(!pipeline.handle().is_null());
    assert!(pipeline.descriptor_set_layout(0).is_some());
    assert_eq!(device.live_count("set layout"), 1);
    assert_eq!(device.live_count("pipeline layout"), 1);
    assert_eq!(device.live_count("pipeline"), 1);
    assert_eq!(device.last_pipeline_layout().unwrap().name, "pipeline layout: fxaa");
}

#[test]
fn test_create_does_not_keep_shaders_alive() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let _pipeline = Pipeline::new(device, textured_config(&vs, &fs), "fxaa").unwrap();

    assert_eq!(Arc::strong_count(&vs), 1);
    assert_eq!(Arc::strong_count(&fs), 1);
}

#[test]
fn test_create_with_released_shader_fails() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let config = textured_config(&vs, &fs);
    drop(fs);

    let result = Pipeline::new(device.clone(), config, "fxaa");
    assert!(matches!(result, Err(Error::ShaderReleased(_))));
    assert_eq!(device.live_total(), 0);
}

#[test]
fn test_create_with_wrong_shader_stage_fails() {
    let device = MockDevice::new();
    let (vs, _fs) = graphics_shaders();
    let config = textured_config(&vs, &vs);

    assert!(matches!(
        Pipeline::new(device, config, "swapped"),
        Err(Error::InvalidConfiguration(_))
    ));
}

#[test]
fn test_create_with_duplicate_binding_fails() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let config = textured_config(&vs, &fs).with_sets(vec![SetDescriptor::new(0, vec![
        BindingDescriptor::new(0, DescriptorType::UniformBuffer, 1, ShaderStageFlags::VERTEX),
        BindingDescriptor::new(0, DescriptorType::UniformBuffer, 1, ShaderStageFlags::VERTEX),
    ])]);

    assert!(matches!(Pipeline::new(device.clone(), config, "dup"), Err(Error::InvalidConfiguration(_))));
    assert_eq!(device.live_total(), 0);
}

#[test]
fn test_create_with_unsupported_attachment_format_fails() {
    let device = MockDevice::new();
    device.mark_unsupported(Format::B8G8R8A8Unorm, FormatFeature::ColorAttachment);
    let (vs, fs) = graphics_shaders();

    let result = Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa");
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    assert_eq!(device.live_total(), 0);
}

#[test]
fn test_create_with_unsupported_vertex_format_fails() {
    let device = MockDevice::new();
    device.mark_unsupported(Format::R32G32B32Sfloat, FormatFeature::VertexBuffer);
    let (vs, fs) = graphics_shaders();
    let mut config = textured_config(&vs, &fs);
    config.vertex_layout = VertexLayout {
        bindings: vec![VertexBinding { binding: 0, stride: 12, input_rate: VertexInputRate::Vertex }],
        attributes: vec![VertexAttribute { location: 0, binding: 0, format: Format::R32G32B32Sfloat, offset: 0 }],
    };

    assert!(matches!(Pipeline::new(device, config, "mesh"), Err(Error::UnsupportedFormat(_))));
}

#[test]
fn test_create_without_render_pass_fails() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut config = textured_config(&vs, &fs);
    config.use_dynamic_rendering = false;

    assert!(matches!(
        Pipeline::new(device.clone(), config.clone(), "legacy"),
        Err(Error::InvalidConfiguration(_))
    ));

    let config = config.with_render_pass(RenderPassHandle::from_raw(77), vec![Format::B8G8R8A8Unorm]);
    assert!(Pipeline::new(device, config, "legacy").is_ok());
}

#[test]
fn test_create_with_malformed_push_constants_fails() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();

    let unaligned = textured_config(&vs, &fs)
        .with_push_constants(vec![PushConstantRange::new(ShaderStageFlags::VERTEX, 0, 6)]);
    assert!(matches!(Pipeline::new(device.clone(), unaligned, "a"), Err(Error::InvalidConfiguration(_))));

    let duplicated = textured_config(&vs, &fs).with_push_constants(vec![
        PushConstantRange::new(ShaderStageFlags::VERTEX, 0, 16),
        PushConstantRange::new(ShaderStageFlags::VERTEX, 16, 16),
    ]);
    assert!(matches!(Pipeline::new(device.clone(), duplicated, "b"), Err(Error::InvalidConfiguration(_))));
    assert_eq!(device.live_total(), 0);
}

#[test]
fn test_create_with_short_specialization_data_fails() {
    let device = MockDevice::new();
    let cs = MockShader::new(ShaderStage::Compute);
    let mut config = ComputePipelineConfig::new(&cs);
    config.specialization = SpecializationConstants::new().with(0, 16u32);
    config.specialization.data.truncate(2);

    assert!(matches!(Pipeline::new(device, config, "specialized"), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_create_failure_destroys_partial_objects() {
    let device = MockDevice::new();
    device.fail_next_pipeline();
    let (vs, fs) = graphics_shaders();

    assert!(Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa").is_err());
    assert_eq!(device.live_total(), 0);
}

#[test]
fn test_default_blend_state_replicated_per_attachment() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut config = textured_config(&vs, &fs);
    config.color_formats = vec![Format::R8G8B8A8Unorm, Format::R16G16B16A16Sfloat];
    config.blend_enable = true;

    let _pipeline = Pipeline::new(device.clone(), config, "gbuffer").unwrap();
    assert_eq!(device.last_blend_states(), vec![ColorBlendState::alpha_blended(true); 2]);
}

#[test]
fn test_blend_state_count_mismatch_fails() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut config = textured_config(&vs, &fs);
    config.blend_states = vec![ColorBlendState::default(); 2];

    assert!(matches!(Pipeline::new(device, config, "blend"), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_ray_tracing_pipeline_groups() {
    let device = MockDevice::with_ray_tracing();
    let raygen = MockShader::new(ShaderStage::RayGen);
    let miss = MockShader::new(ShaderStage::Miss);
    let shadow_miss = MockShader::new(ShaderStage::Miss);
    let hit = MockShader::new(ShaderStage::ClosestHit);
    let config = RayTracingPipelineConfig::new(&raygen)
        .with_miss_shader(&miss)
        .with_miss_shader(&shadow_miss)
        .with_closest_hit_shader(&hit);

    let pipeline = Pipeline::new(device.clone(), config, "raytracer").unwrap();
    assert_eq!(pipeline.kind(), PipelineKind::RayTracing);
    assert_eq!(device.last_ray_tracing_groups(), vec![
        ShaderGroup::General { shader: 0 },
        ShaderGroup::General { shader: 1 },
        ShaderGroup::General { shader: 2 },
        ShaderGroup::TrianglesHit { closest_hit: 3 },
    ]);
}

#[test]
fn test_ray_tracing_requires_device_support() {
    let device = MockDevice::new();
    let raygen = MockShader::new(ShaderStage::RayGen);

    assert!(matches!(
        Pipeline::new(device, RayTracingPipelineConfig::new(&raygen), "raytracer"),
        Err(Error::InvalidConfiguration(_))
    ));
}

// ============================================================================
// Descriptor allocation
// ============================================================================

#[test]
fn test_allocate_counts_match_requests() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let config = textured_config(&vs, &fs).with_sets(vec![
        SetDescriptor::new(0, vec![
            BindingDescriptor::new(0, DescriptorType::CombinedImageSampler, 3, ShaderStageFlags::FRAGMENT),
        ]),
        SetDescriptor::new(2, vec![
            BindingDescriptor::new(0, DescriptorType::UniformBuffer, 1, ShaderStageFlags::VERTEX),
            BindingDescriptor::new(1, DescriptorType::StorageBuffer, 4, ShaderStageFlags::VERTEX),
        ]),
    ]);
    let mut pipeline = Pipeline::new(device.clone(), config, "scene").unwrap();

    pipeline
        .allocate_descriptors(&[SetAndCount::new(0, 2, "textures"), SetAndCount::new(2, 3, "camera")])
        .unwrap();

    // Allocated sets = sum of replica counts
    assert_eq!(device.live_count("set"), 5);
    assert_eq!(pipeline.replica_count(0), 2);
    assert_eq!(pipeline.replica_count(2), 3);
    assert_eq!(pipeline.replica_count(1), 0);

    // Writable slots = sum of count x replicas
    let sizing = pipeline.pool_sizing().unwrap();
    assert_eq!(sizing.max_sets, 5);
    assert_eq!(sizing.capacity_of(DescriptorType::CombinedImageSampler), 6);
    assert_eq!(sizing.capacity_of(DescriptorType::UniformBuffer), 3);
    assert_eq!(sizing.capacity_of(DescriptorType::StorageBuffer), 12);
    assert_eq!(sizing.total_descriptors(), 21);

    assert!(device.set_names().contains(&"descriptor set: camera 2".to_string()));
}

#[test]
fn test_second_allocation_rejected() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut pipeline = Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa").unwrap();

    pipeline.allocate_descriptors(&[SetAndCount::new(0, 2, "input")]).unwrap();
    let result = pipeline.allocate_descriptors(&[SetAndCount::new(0, 2, "input")]);

    assert!(matches!(result, Err(Error::DescriptorsAlreadyAllocated(_))));
    assert_eq!(device.live_count("pool"), 1);
    assert_eq!(device.live_count("set"), 2);
    assert_eq!(pipeline.pool_sizing().unwrap().max_sets, 2);
}

#[test]
fn test_allocate_rejects_bad_requests() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut pipeline = Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa").unwrap();

    let undeclared = pipeline.allocate_descriptors(&[SetAndCount::new(1, 1, "missing")]);
    assert!(matches!(undeclared, Err(Error::InvalidConfiguration(_))));

    let zero = pipeline.allocate_descriptors(&[SetAndCount::new(0, 0, "none")]);
    assert!(matches!(zero, Err(Error::InvalidConfiguration(_))));

    let twice = pipeline.allocate_descriptors(&[SetAndCount::new(0, 1, "a"), SetAndCount::new(0, 1, "b")]);
    assert!(matches!(twice, Err(Error::InvalidConfiguration(_))));

    // Rejected requests leave the pipeline unallocated
    assert_eq!(device.live_count("pool"), 0);
    assert!(pipeline.allocate_descriptors(&[SetAndCount::new(0, 1, "input")]).is_ok());
}

#[test]
fn test_allocate_rejects_overflowing_pool_size() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut pipeline = Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa").unwrap();

    // 3 samplers x u32::MAX replicas
    let result = pipeline.allocate_descriptors(&[SetAndCount::new(0, u32::MAX, "huge")]);
    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    assert_eq!(device.live_count("pool"), 0);
    assert!(pipeline.pool_sizing().is_none());

    assert!(pipeline.allocate_descriptors(&[SetAndCount::new(0, 1, "input")]).is_ok());
}

// ============================================================================
// Binding and flushing
// ============================================================================

#[test]
fn test_three_textures_visible_in_replica_zero_only() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut pipeline = Pipeline::new(device.clone(), textured_config(&vs, &fs), "composite").unwrap();
    pipeline.allocate_descriptors(&[SetAndCount::new(0, 2, "inputs")]).unwrap();

    let textures = [MockTexture::new(), MockTexture::new(), MockTexture::new()];
    let sampler = MockSampler::new();
    for (i, texture) in textures.iter().enumerate() {
        pipeline
            .bind_resource(
                BindingSlot::new(0, 0).element(i as u32),
                BindingResource::CombinedImageSampler(texture, &sampler),
            )
            .unwrap();
    }

    // Staged only: nothing visible yet
    assert_eq!(pipeline.pending_write_count(), 3);
    assert_eq!(pipeline.bound_resource(BindingSlot::new(0, 0)), None);

    assert_eq!(pipeline.update_descriptor_sets().unwrap(), 1);
    assert_eq!(pipeline.pending_write_count(), 0);

    let replica0 = pipeline.descriptor_set(0, 0).unwrap();
    let replica1 = pipeline.descriptor_set(0, 1).unwrap();
    for (i, texture) in textures.iter().enumerate() {
        let expected = ResolvedDescriptor::Image {
            view: texture.view(),
            layout: ImageLayout::ShaderReadOnlyOptimal,
            sampler: Some(sampler.handle),
        };
        assert_eq!(device.content(replica0, 0, i as u32), Some(expected));
        assert_eq!(pipeline.bound_resource(BindingSlot::new(0, 0).element(i as u32)), Some(expected));
    }
    assert_eq!(device.content_count(replica1), 0);
}

#[test]
fn test_last_write_wins_after_flush() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut pipeline = Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa").unwrap();
    pipeline.allocate_descriptors(&[SetAndCount::new(0, 1, "input")]).unwrap();

    let old = MockTexture::new();
    let new = MockTexture::new();
    let sampler = MockSampler::new();
    let slot = BindingSlot::new(0, 0).element(1);
    pipeline.bind_resource(slot, BindingResource::CombinedImageSampler(&old, &sampler)).unwrap();
    pipeline.bind_resource(slot, BindingResource::CombinedImageSampler(&new, &sampler)).unwrap();
    pipeline.update_descriptor_sets().unwrap();

    let set = pipeline.descriptor_set(0, 0).unwrap();
    match device.content(set, 0, 1) {
        Some(ResolvedDescriptor::Image { view, .. }) => assert_eq!(view, new.view()),
        other => panic!("unexpected descriptor {:?}", other),
    }
}

#[test]
fn test_out_of_range_element_rejected_without_side_effects() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut pipeline = Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa").unwrap();
    pipeline.allocate_descriptors(&[SetAndCount::new(0, 1, "input")]).unwrap();

    let texture = MockTexture::new();
    let sampler = MockSampler::new();
    let result = pipeline.bind_resource(
        BindingSlot::new(0, 0).element(3),
        BindingResource::CombinedImageSampler(&texture, &sampler),
    );

    assert!(matches!(result, Err(Error::InvalidBinding(_))));
    assert_eq!(pipeline.pending_write_count(), 0);
    assert_eq!(pipeline.update_descriptor_sets().unwrap(), 0);
    assert_eq!(device.update_call_count(), 0);
}

#[test]
fn test_bind_before_allocation_rejected() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let pipeline = Pipeline::new(device, textured_config(&vs, &fs), "fxaa").unwrap();
    let texture = MockTexture::new();
    let sampler = MockSampler::new();

    let result = pipeline.bind_resource(
        BindingSlot::new(0, 0),
        BindingResource::CombinedImageSampler(&texture, &sampler),
    );
    assert!(matches!(result, Err(Error::DescriptorsNotAllocated(_))));
}

#[test]
fn test_bind_resources_array() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let mut pipeline = Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa").unwrap();
    pipeline.allocate_descriptors(&[SetAndCount::new(0, 1, "input")]).unwrap();

    let a = MockTexture::new();
    let b = MockTexture::new();
    let sampler = MockSampler::new();
    pipeline
        .bind_resources(BindingSlot::new(0, 0).element(1), &[
            BindingResource::CombinedImageSampler(&a, &sampler),
            BindingResource::CombinedImageSampler(&b, &sampler),
        ])
        .unwrap();

    assert_eq!(pipeline.update_descriptor_sets().unwrap(), 1);
    let set = pipeline.descriptor_set(0, 0).unwrap();
    assert_eq!(device.content(set, 0, 0), None);
    assert!(device.content(set, 0, 1).is_some());
    assert!(device.content(set, 0, 2).is_some());
}

// ============================================================================
// Recording
// ============================================================================

#[test]
fn test_bind_flushes_then_binds_pipeline() {
    let device = MockDevice::new();
    let (mut pipeline, _cs) = compute_pipeline(&device, 8);
    pipeline.allocate_descriptors(&[SetAndCount::new(0, 1, "blur")]).unwrap();
    let buffer = MockBuffer::new(64);
    pipeline.bind_resource(BindingSlot::new(0, 1), BindingResource::Buffer(&buffer)).unwrap();

    let mut cmd = MockCommandList::recording();
    pipeline.bind(&mut cmd).unwrap();

    assert_eq!(device.update_call_count(), 1);
    assert_eq!(pipeline.pending_write_count(), 0);
    assert_eq!(cmd.commands, vec![RecordedCommand::BindPipeline(PipelineBindPoint::Compute, pipeline.handle())]);
}

#[test]
fn test_bind_descriptor_sets_selects_replica() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let config = textured_config(&vs, &fs).with_sets(vec![
        SetDescriptor::new(0, vec![BindingDescriptor::new(0, DescriptorType::UniformBuffer, 1, ShaderStageFlags::VERTEX)]),
        SetDescriptor::new(1, vec![BindingDescriptor::new(0, DescriptorType::UniformBuffer, 1, ShaderStageFlags::VERTEX)]),
        SetDescriptor::new(3, vec![BindingDescriptor::new(0, DescriptorType::UniformBuffer, 1, ShaderStageFlags::VERTEX)]),
    ]);
    let mut pipeline = Pipeline::new(device, config, "scene").unwrap();
    pipeline
        .allocate_descriptors(&[
            SetAndCount::new(0, 2, "camera"),
            SetAndCount::new(1, 2, "lights"),
            SetAndCount::new(3, 1, "material"),
        ])
        .unwrap();

    let mut cmd = MockCommandList::recording();
    pipeline
        .bind_descriptor_sets(&mut cmd, &[
            SetAndReplica::new(0, 1),
            SetAndReplica::new(1, 1),
            SetAndReplica::new(3, 0),
        ])
        .unwrap();

    // Sets 0 and 1 are contiguous: one command; set 3 gets its own
    assert_eq!(cmd.commands, vec![
        RecordedCommand::BindDescriptorSets {
            bind_point: PipelineBindPoint::Graphics,
            layout: pipeline.layout(),
            first_set: 0,
            sets: vec![pipeline.descriptor_set(0, 1).unwrap(), pipeline.descriptor_set(1, 1).unwrap()],
        },
        RecordedCommand::BindDescriptorSets {
            bind_point: PipelineBindPoint::Graphics,
            layout: pipeline.layout(),
            first_set: 3,
            sets: vec![pipeline.descriptor_set(3, 0).unwrap()],
        },
    ]);
}

#[test]
fn test_bind_descriptor_sets_invalid_replica_records_nothing() {
    let device = MockDevice::new();
    let (mut pipeline, _cs) = compute_pipeline(&device, 8);
    pipeline.allocate_descriptors(&[SetAndCount::new(0, 1, "blur")]).unwrap();

    let mut cmd = MockCommandList::recording();
    let result = pipeline.bind_descriptor_sets(&mut cmd, &[SetAndReplica::new(0, 0), SetAndReplica::new(0, 5)]);

    assert!(matches!(result, Err(Error::InvalidBinding(_))));
    assert!(cmd.commands.is_empty());
}

#[cfg(debug_assertions)]
#[test]
fn test_bind_descriptor_sets_with_unflushed_writes_rejected() {
    let device = MockDevice::new();
    let (mut pipeline, _cs) = compute_pipeline(&device, 8);
    pipeline.allocate_descriptors(&[SetAndCount::new(0, 2, "blur")]).unwrap();
    let buffer = MockBuffer::new(64);
    pipeline.bind_resource(BindingSlot::new(0, 1).replica(1), BindingResource::Buffer(&buffer)).unwrap();

    let mut cmd = MockCommandList::recording();
    // Replica 0 is clean
    assert!(pipeline.bind_descriptor_sets(&mut cmd, &[SetAndReplica::new(0, 0)]).is_ok());

    let result = pipeline.bind_descriptor_sets(&mut cmd, &[SetAndReplica::new(0, 1)]);
    assert!(matches!(result, Err(Error::UnflushedDescriptorWrites(_))));

    pipeline.update_descriptor_sets().unwrap();
    assert!(pipeline.bind_descriptor_sets(&mut cmd, &[SetAndReplica::new(0, 1)]).is_ok());
}

#[test]
fn test_push_constant_larger_than_range_rejected() {
    let device = MockDevice::new();
    let (pipeline, _cs) = compute_pipeline(&device, 8);
    let mut cmd = MockCommandList::recording();

    let result = pipeline.update_push_constant(&mut cmd, ShaderStageFlags::COMPUTE, &[0u8; 16]);
    assert!(matches!(result, Err(Error::InvalidPushConstant(_))));
    assert!(cmd.commands.is_empty());
}

#[test]
fn test_push_constant_checks() {
    let device = MockDevice::new();
    let (pipeline, _cs) = compute_pipeline(&device, 16);
    let mut cmd = MockCommandList::recording();

    let wrong_stage = pipeline.update_push_constant(&mut cmd, ShaderStageFlags::FRAGMENT, &[0u8; 8]);
    assert!(matches!(wrong_stage, Err(Error::InvalidPushConstant(_))));

    let unaligned = pipeline.update_push_constant(&mut cmd, ShaderStageFlags::COMPUTE, &[0u8; 6]);
    assert!(matches!(unaligned, Err(Error::InvalidPushConstant(_))));

    let empty = pipeline.update_push_constant(&mut cmd, ShaderStageFlags::COMPUTE, &[]);
    assert!(matches!(empty, Err(Error::InvalidPushConstant(_))));

    assert!(cmd.commands.is_empty());
}

#[test]
fn test_push_constant_pod_recorded() {
    let device = MockDevice::new();
    let (pipeline, _cs) = compute_pipeline(&device, 8);
    let mut cmd = MockCommandList::recording();

    pipeline.update_push_constant_pod(&mut cmd, ShaderStageFlags::COMPUTE, &[1.0f32, 0.5f32]).unwrap();

    match &cmd.commands[..] {
        [RecordedCommand::PushConstants { layout, stages, offset, data }] => {
            assert_eq!(*layout, pipeline.layout());
            assert_eq!(*stages, ShaderStageFlags::COMPUTE);
            assert_eq!(*offset, 0);
            assert_eq!(data.as_slice(), bytemuck::bytes_of(&[1.0f32, 0.5f32]));
        }
        other => panic!("unexpected commands {:?}", other),
    }
}

#[test]
fn test_vertex_and_index_buffer_passthrough() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    let pipeline = Pipeline::new(device, textured_config(&vs, &fs), "mesh").unwrap();
    let vertices = MockBuffer::new(1024);
    let indices = MockBuffer::new(256);

    let mut cmd = MockCommandList::recording();
    pipeline.bind_vertex_buffer(&mut cmd, &vertices).unwrap();
    pipeline.bind_index_buffer(&mut cmd, &indices, IndexType::U16).unwrap();

    assert_eq!(cmd.commands, vec![
        RecordedCommand::BindVertexBuffer { binding: 0, buffer: vertices.handle, offset: 0 },
        RecordedCommand::BindIndexBuffer { buffer: indices.handle, offset: 0, index_type: IndexType::U16 },
    ]);
}

#[test]
fn test_recording_requires_begun_command_list() {
    let device = MockDevice::new();
    let (pipeline, _cs) = compute_pipeline(&device, 8);
    let mut cmd = MockCommandList::default();

    assert!(pipeline.bind(&mut cmd).is_err());
    cmd.begin().unwrap();
    assert!(pipeline.bind(&mut cmd).is_ok());
    cmd.dispatch(8, 8, 1).unwrap();
    cmd.end().unwrap();
}

// ============================================================================
// Cleanup
// ============================================================================

#[test]
fn test_drop_destroys_every_owned_object() {
    let device = MockDevice::new();
    let (vs, fs) = graphics_shaders();
    {
        let mut pipeline = Pipeline::new(device.clone(), textured_config(&vs, &fs), "fxaa").unwrap();
        pipeline.allocate_descriptors(&[SetAndCount::new(0, 3, "input")]).unwrap();
        assert_eq!(device.live_total(), 1 + 1 + 1 + 1 + 3);
    }
    assert_eq!(device.live_total(), 0);
}
