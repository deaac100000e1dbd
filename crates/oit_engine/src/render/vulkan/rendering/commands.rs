//! Command pool and submission helpers

use ash::{vk, Device};

use crate::render::vulkan::initialization::context::{VulkanError, VulkanResult};

/// Command pool with RAII cleanup.
///
/// Created with RESET_COMMAND_BUFFER so per-frame buffers can be re-recorded
/// individually.
pub struct CommandPool {
    device: Device,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a command pool for the graphics queue family
    pub fn new(device: Device, graphics_family: u32) -> VulkanResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(graphics_family);

        let pool = unsafe {
            device
                .create_command_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_primary(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Run a block of commands on a single-use command buffer and block
    /// until the queue has executed it.
    ///
    /// This intentionally serializes setup work (uploads, mip generation)
    /// for simplicity; it never runs per frame.
    pub fn submit_one_shot<F>(&self, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let command_buffer = self.allocate_primary(1)?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        record(command_buffer);

        unsafe {
            self.device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            self.device
                .queue_submit(queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device
                .queue_wait_idle(queue)
                .map_err(VulkanError::Api)?;

            self.device
                .free_command_buffers(self.pool, &command_buffers);
        }
        Ok(())
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
