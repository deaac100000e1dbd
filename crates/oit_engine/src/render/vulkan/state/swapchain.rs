//! Swapchain creation, presentation and in-place recreation
//!
//! The swapchain images are written by a blit from the offscreen scene
//! color (hence TRANSFER_DST usage) and then drawn over by the overlay
//! pass before presentation. The transient acquire/present conditions
//! (out-of-date, suboptimal) are absorbed here and reported as a
//! recreation request, never as errors.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::config::PresentPreference;
use crate::render::vulkan::initialization::context::{VulkanContext, VulkanError, VulkanResult};

/// Outcome of asking the presentation engine for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquiredImage {
    /// An image is ready for recording. A suboptimal surface still renders
    /// correctly, so it is accepted for this frame and handled at present.
    Ready {
        /// Index into the swapchain image array
        index: u32,
    },
    /// The surface changed and the swapchain must be rebuilt before drawing
    OutOfDate,
}

/// The presentable image set negotiated with the window system
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    min_image_count: u32,
}

impl Swapchain {
    /// Create a swapchain for the context's surface
    pub fn new(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        preference: PresentPreference,
    ) -> VulkanResult<Self> {
        Self::create(context, window_extent, preference, vk::SwapchainKHR::null())
    }

    /// Rebuild the swapchain for a new surface extent.
    ///
    /// The old swapchain is handed to the driver so in-flight presents can
    /// finish, then destroyed together with its views.
    pub fn recreate(
        &mut self,
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        preference: PresentPreference,
    ) -> VulkanResult<()> {
        let replacement = Self::create(context, window_extent, preference, self.swapchain)?;
        // Drop glue for the old object runs here
        *self = replacement;
        Ok(())
    }

    fn create(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        preference: PresentPreference,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let surface = context.surface();
        let surface_loader = context.surface_loader();
        let physical = context.physical_device.device;

        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical, surface)
                .map_err(VulkanError::Api)?
        };

        let surface_format = choose_surface_format(&formats);
        let present_mode = choose_present_mode(&present_modes, preference);
        let extent = choose_extent(&capabilities, window_extent);

        // One more than the minimum so acquire rarely waits on the driver
        let mut min_image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            min_image_count = min_image_count.min(capabilities.max_image_count);
        }

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // The composited frame is blitted in, then the overlay draws on top
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let family_indices = [
            context.device.graphics_family,
            context.device.present_family,
        ];
        if family_indices[0] != family_indices[1] {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices);
        } else {
            create_info = create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
        }

        let loader = context.device.swapchain_loader.clone();
        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let device = context.raw_device();
        let images = unsafe {
            loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };
        let views = images
            .iter()
            .map(|&image| create_view(&device, image, surface_format.format))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::info!(
            "Swapchain: {} images, {:?}, {}x{}, {:?}",
            images.len(),
            surface_format.format,
            extent.width,
            extent.height,
            present_mode
        );

        Ok(Self {
            device,
            loader,
            swapchain,
            images,
            views,
            format: surface_format.format,
            extent,
            min_image_count,
        })
    }

    /// Ask for the next presentable image, signaling `semaphore` when it is
    /// ready. Out-of-date surfaces are reported, not propagated as errors.
    pub fn acquire(&self, semaphore: vk::Semaphore) -> VulkanResult<AcquiredImage> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, _suboptimal)) => Ok(AcquiredImage::Ready { index }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::OutOfDate),
            Err(err) => Err(VulkanError::Api(err)),
        }
    }

    /// Present `index`, waiting on `wait_semaphore`. Returns whether the
    /// swapchain needs recreation (out-of-date or suboptimal surface).
    pub fn present(
        &self,
        queue: vk::Queue,
        wait_semaphore: vk::Semaphore,
        index: u32,
    ) -> VulkanResult<bool> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe { self.loader.queue_present(queue, &present_info) };
        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(err) => Err(VulkanError::Api(err)),
        }
    }

    /// Swapchain image handles
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Views over the swapchain images
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    /// Pixel format of the swapchain images
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of images in the swapchain
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Minimum image count the swapchain was created with
    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn create_view(device: &Device, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe {
        device
            .create_image_view(&create_info, None)
            .map_err(VulkanError::Api)
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(formats[0])
}

fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentPreference,
) -> vk::PresentModeKHR {
    let preferred = match preference {
        PresentPreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentPreference::Fifo => vk::PresentModeKHR::FIFO,
    };
    modes
        .iter()
        .copied()
        .find(|&mode| mode == preferred)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    // current_extent of u32::MAX means the surface lets us pick
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}
