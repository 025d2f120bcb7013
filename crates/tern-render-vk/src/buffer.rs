// SPDX-License-Identifier: CEPL-1.0
//! Buffers: device-local geometry uploaded through staging, and the
//! persistently mapped per-frame uniform buffers.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use tern_core::Arena;
use tern_render::{ShaderData, Vertex};
use tracing::{debug, error};

use crate::device::{create_command_pool, Device};
use crate::error::{VkError, VkResultExt};
use crate::handle::DeviceOwned;
use crate::sync::create_fence;

/// Upper bound on the one-shot upload wait, in nanoseconds.
pub const DEFAULT_FENCE_TIMEOUT: u64 = 100_000_000_000;

pub struct Buffer {
    buffer: DeviceOwned<vk::Buffer>,
    memory: DeviceOwned<vk::DeviceMemory>,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Creates a buffer with its own allocation. More than one distinct
    /// family makes the buffer `CONCURRENT` across them.
    pub fn new(
        device: &Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        families: &[u32],
    ) -> Result<Self, VkError> {
        let vkd = device.raw();
        let (sharing_mode, family_count, p_families) = if families.len() > 1 {
            (vk::SharingMode::CONCURRENT, families.len() as u32, families.as_ptr())
        } else {
            (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
        };
        let ci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode,
            queue_family_index_count: family_count,
            p_queue_family_indices: p_families,
            ..Default::default()
        };
        let buffer = DeviceOwned::new(
            device.clone(),
            unsafe { vkd.create_buffer(&ci, None) }.call("vkCreateBuffer")?,
        );

        let req = unsafe { vkd.get_buffer_memory_requirements(*buffer) };
        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: device.memory_type(req.memory_type_bits, properties)?,
            ..Default::default()
        };
        let memory = DeviceOwned::new(
            device.clone(),
            unsafe { vkd.allocate_memory(&alloc, None) }.call("vkAllocateMemory")?,
        );
        unsafe { vkd.bind_buffer_memory(*buffer, *memory, 0) }.call("vkBindBufferMemory")?;

        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    pub fn raw(&self) -> vk::Buffer {
        self.buffer.raw()
    }

    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.raw()
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    fn device(&self) -> Result<&Arc<Device>, VkError> {
        self.buffer.owner().ok_or(VkError::NotReady("buffer"))
    }

    fn map(&self) -> Result<NonNull<c_void>, VkError> {
        let device = self.device()?;
        let ptr = unsafe {
            device
                .raw()
                .map_memory(*self.memory, 0, self.size, vk::MemoryMapFlags::empty())
        }
        .call("vkMapMemory")?;
        NonNull::new(ptr).ok_or(VkError::NotReady("mapped memory"))
    }
}

/// Where each stream lives inside the packed staging bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryLayout {
    pub vertex_offset: usize,
    pub vertex_size: usize,
    pub index_offset: usize,
    pub index_size: usize,
}

/// Packs vertices then indices into one arena so a single staging buffer
/// carries both.
pub fn pack_geometry(vertices: &[Vertex], indices: &[u32]) -> Option<(Arena, GeometryLayout)> {
    let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(indices);
    let align = std::mem::align_of::<Vertex>().max(std::mem::align_of::<u32>());

    let mut arena = Arena::new(vertex_bytes.len() + index_bytes.len() + align);
    let vertex_offset = arena.push_bytes(vertex_bytes, std::mem::align_of::<Vertex>())?;
    let index_offset = arena.push_bytes(index_bytes, std::mem::align_of::<u32>())?;
    Some((
        arena,
        GeometryLayout {
            vertex_offset,
            vertex_size: vertex_bytes.len(),
            index_offset,
            index_size: index_bytes.len(),
        },
    ))
}

/// Device-local vertex and index buffers for one indexed mesh.
pub struct Geometry {
    vertices: Buffer,
    indices: Buffer,
    index_count: u32,
}

impl Geometry {
    /// Stages the data, copies it on the transfer queue and blocks on a
    /// fence (bounded by [`DEFAULT_FENCE_TIMEOUT`]) before the staging
    /// buffer is released.
    pub fn upload(device: &Arc<Device>, vertices: &[Vertex], indices: &[u32]) -> Result<Self, VkError> {
        let (arena, layout) =
            pack_geometry(vertices, indices).ok_or(VkError::NotReady("geometry arena"))?;
        let bytes = arena.as_bytes();

        let families = device.families();
        let shared = if families.transfer != families.graphics {
            vec![families.graphics, families.transfer]
        } else {
            vec![families.graphics]
        };

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let staging = Buffer::new(
            device,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            host,
            &[],
        )?;
        let ptr = staging.map()?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr().cast::<u8>(), bytes.len());
            device.raw().unmap_memory(staging.memory());
        }

        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        let dst = vk::BufferUsageFlags::TRANSFER_DST;
        let vertex_buffer = Buffer::new(
            device,
            layout.vertex_size as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER | dst,
            local,
            &shared,
        )?;
        let index_buffer = Buffer::new(
            device,
            layout.index_size as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER | dst,
            local,
            &shared,
        )?;

        let copies = [
            (
                vertex_buffer.raw(),
                vk::BufferCopy {
                    src_offset: layout.vertex_offset as vk::DeviceSize,
                    dst_offset: 0,
                    size: layout.vertex_size as vk::DeviceSize,
                },
            ),
            (
                index_buffer.raw(),
                vk::BufferCopy {
                    src_offset: layout.index_offset as vk::DeviceSize,
                    dst_offset: 0,
                    size: layout.index_size as vk::DeviceSize,
                },
            ),
        ];
        submit_copies(device, staging.raw(), &copies)?;

        debug!(
            "uploaded {} vertices / {} indices ({} staged bytes)",
            vertices.len(),
            indices.len(),
            bytes.len()
        );
        Ok(Self {
            vertices: vertex_buffer,
            indices: index_buffer,
            index_count: indices.len() as u32,
        })
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertices.raw()
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.indices.raw()
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Records `copies` into a one-shot command buffer on a transient pool of
/// the transfer family and waits for it.
fn submit_copies(
    device: &Arc<Device>,
    src: vk::Buffer,
    copies: &[(vk::Buffer, vk::BufferCopy)],
) -> Result<(), VkError> {
    let vkd = device.raw();
    let pool = create_command_pool(
        device,
        device.families().transfer,
        vk::CommandPoolCreateFlags::TRANSIENT,
    )?;

    let alloc = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: *pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    // freed together with the pool
    let cmd = unsafe { vkd.allocate_command_buffers(&alloc) }.call("vkAllocateCommandBuffers")?[0];

    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    unsafe {
        vkd.begin_command_buffer(cmd, &begin)
            .call("vkBeginCommandBuffer")?;
        for (dst, region) in copies {
            vkd.cmd_copy_buffer(cmd, src, *dst, std::slice::from_ref(region));
        }
        vkd.end_command_buffer(cmd).call("vkEndCommandBuffer")?;
    }

    let fence = create_fence(device, vk::FenceCreateFlags::empty())?;
    let submit = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        command_buffer_count: 1,
        p_command_buffers: &cmd,
        ..Default::default()
    };
    unsafe {
        vkd.queue_submit(device.queues().transfer, std::slice::from_ref(&submit), *fence)
            .call("vkQueueSubmit")?;
    }
    let waited = unsafe { vkd.wait_for_fences(&[*fence], true, DEFAULT_FENCE_TIMEOUT) }
        .call("vkWaitForFences");
    // the pool, fence and staging buffer must outlive the copy
    drain_on_failure(waited, || device.wait_idle())
}

/// Passes `result` through, running `drain` first when it is an error.
/// A drain failure is logged and the original error is returned.
fn drain_on_failure<T>(
    result: Result<T, VkError>,
    drain: impl FnOnce() -> Result<(), VkError>,
) -> Result<T, VkError> {
    if let Err(err) = &result {
        error!("{err}; waiting for the device before releasing resources");
        if let Err(drain_err) = drain() {
            error!("device wait after failed upload: {drain_err}");
        }
    }
    result
}

/// Host-coherent uniform buffer that stays mapped for its whole life.
pub struct UniformBuffer {
    mapped: NonNull<c_void>,
    buffer: Buffer,
}

impl UniformBuffer {
    pub fn new(device: &Arc<Device>) -> Result<Self, VkError> {
        let buffer = Buffer::new(
            device,
            std::mem::size_of::<ShaderData>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &[],
        )?;
        let mapped = buffer.map()?;
        Ok(Self { mapped, buffer })
    }

    /// Coherent memory, so no flush is needed.
    pub fn write(&mut self, data: &ShaderData) {
        let bytes = bytemuck::bytes_of(data);
        // SAFETY: the mapping covers size_of::<ShaderData>() bytes and lives
        // as long as the buffer's memory.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.mapped.as_ptr().cast::<u8>(),
                bytes.len(),
            );
        }
    }

    pub fn descriptor(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer.raw(),
            offset: 0,
            range: self.buffer.size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tern_render::{TRIANGLE_INDICES, TRIANGLE_VERTICES};

    #[test]
    fn timed_out_upload_drains_the_device() {
        let drained = Cell::new(false);
        let waited = Err::<(), _>(vk::Result::TIMEOUT).call("vkWaitForFences");
        let result = drain_on_failure(waited, || {
            drained.set(true);
            Ok(())
        });
        assert!(drained.get());
        assert!(matches!(
            result,
            Err(VkError::Call {
                call: "vkWaitForFences",
                result: vk::Result::TIMEOUT
            })
        ));
    }

    #[test]
    fn drain_failure_keeps_the_original_error() {
        let waited = Err::<(), _>(vk::Result::ERROR_DEVICE_LOST).call("vkWaitForFences");
        let result = drain_on_failure(waited, || {
            Err::<(), _>(vk::Result::ERROR_DEVICE_LOST).call("vkDeviceWaitIdle")
        });
        assert!(matches!(result, Err(VkError::Call { call: "vkWaitForFences", .. })));
    }

    #[test]
    fn completed_upload_does_not_drain() {
        let drained = Cell::new(false);
        let result = drain_on_failure(Ok(7), || {
            drained.set(true);
            Ok(())
        });
        assert_eq!(result.unwrap(), 7);
        assert!(!drained.get());
    }

    #[test]
    fn geometry_packs_back_to_back() {
        let (arena, layout) = pack_geometry(&TRIANGLE_VERTICES, &TRIANGLE_INDICES).unwrap();
        assert_eq!(layout.vertex_offset, 0);
        assert_eq!(layout.vertex_size, 3 * 12);
        assert_eq!(layout.index_offset, 36);
        assert_eq!(layout.index_size, 12);
        assert_eq!(arena.used(), 48);

        let bytes = arena.as_bytes();
        let idx: &[u32] = bytemuck::cast_slice(&bytes[layout.index_offset..]);
        assert_eq!(idx, &TRIANGLE_INDICES);
    }

    #[test]
    fn packed_vertices_survive() {
        let (arena, layout) = pack_geometry(&TRIANGLE_VERTICES, &TRIANGLE_INDICES).unwrap();
        let span = &arena.as_bytes()[..layout.vertex_size];
        let verts: &[Vertex] = bytemuck::cast_slice(span);
        assert_eq!(verts, &TRIANGLE_VERTICES);
    }
}
