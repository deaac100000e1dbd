//! GPU buffer management
//!
//! [`Buffer`] is the RAII base; [`MeshBuffer`] builds device-local vertex and
//! index buffers through a staging copy, and [`UniformBuffer`] keeps one
//! persistently mapped host-visible buffer per in-flight frame.

use ash::{vk, Device};

use crate::render::vulkan::initialization::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::rendering::commands::CommandPool;

/// A buffer and its bound memory with RAII cleanup
pub struct Buffer {
    device: Device,
    /// Buffer handle
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind fresh memory with the requested properties
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index =
            context.find_memory_type(requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };
        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Copy POD data into a host-visible, host-coherent buffer
    pub fn write_data<T: bytemuck::Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        debug_assert!(bytes.len() as vk::DeviceSize <= self.size);

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)? as *mut u8;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// A device-local vertex or index buffer plus its element count
pub struct MeshBuffer {
    /// The device-local buffer
    pub buffer: Buffer,
    /// Vertex or index count
    pub count: u32,
}

impl MeshBuffer {
    /// Build a device-local buffer of `usage` filled from `data` through a
    /// staging copy on the one-shot command path.
    pub fn device_local<T: bytemuck::Pod>(
        context: &VulkanContext,
        command_pool: &CommandPool,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> VulkanResult<Self> {
        let size = (std::mem::size_of::<T>() * data.len()) as vk::DeviceSize;

        let staging = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_data(data)?;

        let buffer = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let device = context.raw_device();
        command_pool.submit_one_shot(context.graphics_queue(), |cmd| {
            let region = vk::BufferCopy::builder().size(size).build();
            unsafe {
                device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
            }
        })?;

        Ok(Self {
            buffer,
            count: data.len() as u32,
        })
    }

    /// Build a device-local vertex buffer
    pub fn vertex<T: bytemuck::Pod>(
        context: &VulkanContext,
        command_pool: &CommandPool,
        vertices: &[T],
    ) -> VulkanResult<Self> {
        Self::device_local(
            context,
            command_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vertices,
        )
    }

    /// Build a device-local index buffer
    pub fn index(
        context: &VulkanContext,
        command_pool: &CommandPool,
        indices: &[u32],
    ) -> VulkanResult<Self> {
        Self::device_local(
            context,
            command_pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            indices,
        )
    }
}

/// One persistently mapped host-visible uniform buffer per in-flight frame
pub struct UniformBuffer {
    buffers: Vec<Buffer>,
    mapped: Vec<*mut u8>,
    size: vk::DeviceSize,
}

impl UniformBuffer {
    /// Create `frames` uniform buffers of `size` bytes each, mapped once
    pub fn new(context: &VulkanContext, size: vk::DeviceSize, frames: usize) -> VulkanResult<Self> {
        let device = context.raw_device();
        let mut buffers = Vec::with_capacity(frames);
        let mut mapped = Vec::with_capacity(frames);

        for _ in 0..frames {
            let buffer = Buffer::new(
                context,
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            let ptr = unsafe {
                device
                    .map_memory(buffer.memory, 0, size, vk::MemoryMapFlags::empty())
                    .map_err(VulkanError::Api)? as *mut u8
            };
            buffers.push(buffer);
            mapped.push(ptr);
        }

        Ok(Self {
            buffers,
            mapped,
            size,
        })
    }

    /// Write the payload for one frame slot
    pub fn write<T: bytemuck::Pod>(&self, frame: usize, payload: &T) {
        let bytes = bytemuck::bytes_of(payload);
        debug_assert!(bytes.len() as vk::DeviceSize <= self.size);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped[frame], bytes.len());
        }
    }

    /// Buffer handles, one per frame slot
    pub fn handles(&self) -> Vec<vk::Buffer> {
        self.buffers.iter().map(|b| b.buffer).collect()
    }

    /// Payload size in bytes
    pub fn range(&self) -> vk::DeviceSize {
        self.size
    }
}
