// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::vk;

use crate::buffer::UniformBuffer;
use crate::device::Device;
use crate::error::{VkError, VkResultExt};
use crate::handle::DeviceOwned;

/// One uniform-buffer set per frame slot, all sharing a single layout.
pub struct Descriptors {
    sets: Vec<vk::DescriptorSet>,
    pool: DeviceOwned<vk::DescriptorPool>,
    layout: DeviceOwned<vk::DescriptorSetLayout>,
}

impl Descriptors {
    pub fn new(device: &Arc<Device>, uniforms: &[UniformBuffer]) -> Result<Self, VkError> {
        let vkd = device.raw();
        let count = uniforms.len() as u32;

        let binding = vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        };
        let layout_ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: 1,
            p_bindings: &binding,
            ..Default::default()
        };
        let layout = DeviceOwned::new(
            device.clone(),
            unsafe { vkd.create_descriptor_set_layout(&layout_ci, None) }
                .call("vkCreateDescriptorSetLayout")?,
        );

        let pool_size = pool_size(count);
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: count,
            pool_size_count: 1,
            p_pool_sizes: &pool_size,
            ..Default::default()
        };
        let pool = DeviceOwned::new(
            device.clone(),
            unsafe { vkd.create_descriptor_pool(&pool_ci, None) }.call("vkCreateDescriptorPool")?,
        );

        let layouts = vec![*layout; uniforms.len()];
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: *pool,
            descriptor_set_count: count,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        let sets = unsafe { vkd.allocate_descriptor_sets(&alloc) }
            .call("vkAllocateDescriptorSets")?;

        let infos: Vec<vk::DescriptorBufferInfo> =
            uniforms.iter().map(UniformBuffer::descriptor).collect();
        let writes: Vec<vk::WriteDescriptorSet> = sets
            .iter()
            .zip(&infos)
            .map(|(&set, info)| vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: info,
                ..Default::default()
            })
            .collect();
        unsafe { vkd.update_descriptor_sets(&writes, &[]) };

        Ok(Self { sets, pool, layout })
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout.raw()
    }

    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool.raw()
    }

    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }
}

/// `count` uniform-buffer descriptors, one per set.
pub fn pool_size(count: u32) -> vk::DescriptorPoolSize {
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: count,
    }
}
