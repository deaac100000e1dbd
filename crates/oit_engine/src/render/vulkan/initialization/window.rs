//! GLFW window wrapper
//!
//! A deliberately thin layer: window creation, surface creation through
//! `ash-window`, event polling and resize detection. Input interpretation
//! (camera control, UI) is the application's business.

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::config::RendererConfig;
use crate::render::vulkan::initialization::context::{VulkanError, VulkanResult};

/// A GLFW window configured for Vulkan rendering
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    resized: bool,
}

impl Window {
    /// Create a window with the configured extent and title
    pub fn new(config: &RendererConfig) -> VulkanResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors!()).map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to initialize GLFW: {}", e))
        })?;

        // GLFW defaults to creating an OpenGL context; tell it not to.
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));

        let (width, height) = config.window_extent;
        let (mut window, events) = glfw
            .create_window(
                width,
                height,
                &config.application_name,
                glfw::WindowMode::Windowed,
            )
            .ok_or_else(|| {
                VulkanError::InitializationFailed("Failed to create GLFW window".to_string())
            })?;

        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
            resized: false,
        })
    }

    /// Instance extensions GLFW needs for surface creation
    pub fn required_instance_extensions(&self) -> Result<Vec<String>, String> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| "Vulkan not supported by GLFW".to_string())
    }

    /// Create a presentation surface for this window
    pub fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> VulkanResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                self.window.raw_display_handle(),
                self.window.raw_window_handle(),
                None,
            )
            .map_err(VulkanError::Api)
        }
    }

    /// Current framebuffer extent in pixels
    pub fn framebuffer_extent(&self) -> vk::Extent2D {
        let (width, height) = self.window.get_framebuffer_size();
        vk::Extent2D {
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        }
    }

    /// Whether the user requested the window to close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Poll window-system events and record resize notifications
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
        for (_, event) in glfw::flush_messages(&self.events) {
            if let glfw::WindowEvent::FramebufferSize(_, _) = event {
                self.resized = true;
            }
        }
    }

    /// Take the pending resize flag, clearing it
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    /// Block until the framebuffer has a non-zero extent.
    /// A minimized window reports 0x0 and cannot back a swapchain.
    pub fn wait_for_valid_extent(&mut self) -> vk::Extent2D {
        let mut extent = self.framebuffer_extent();
        while extent.width == 0 || extent.height == 0 {
            self.glfw.wait_events();
            extent = self.framebuffer_extent();
        }
        extent
    }
}
