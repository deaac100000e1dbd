//! Vulkan context management
//!
//! Low-level Vulkan initialization: instance creation with validation-layer
//! forwarding into the `log` facade, physical device rating and selection,
//! and logical device setup. Ownership follows the single-owner rule: each
//! wrapper owns its handles and destroys them on drop, dependents only
//! borrow.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};
use thiserror::Error;

use crate::config::RendererConfig;
use crate::render::vulkan::initialization::window::Window;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Setup-time configuration mismatch (binding budgets, blend counts).
    /// These indicate an implementation bug, not a runtime condition.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for an allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// The device cannot service the requested format usage
    /// (e.g. linear blits for runtime mip generation)
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A named asset the pass suite needs was not provided
    #[error("Missing asset: {0}")]
    MissingAsset(String),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, optionally with validation layers
    pub fn new(window: &Window, config: &RendererConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e))
        })?;

        let app_name = CString::new(config.application_name.as_str()).unwrap();
        let engine_name = CString::new("oit_engine").unwrap();
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = window.required_instance_extensions().map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to get required extensions: {}", e))
        })?;
        let cstr_extensions: Vec<CString> = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()).unwrap())
            .collect();
        let mut extensions: Vec<*const i8> =
            cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let enable_validation =
            config.validation_enabled() && Self::validation_layer_available(&entry)?;
        if config.validation_enabled() && !enable_validation {
            log::warn!("Validation layers requested but not available");
        }

        let layer_names: Vec<CString> = if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
            vec![CString::new(VALIDATION_LAYER).unwrap()]
        } else {
            vec![]
        };
        let layer_name_ptrs: Vec<*const i8> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_name_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::Api)?;
        Ok(layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name.to_string_lossy() == VALIDATION_LAYER
        }))
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) =
                (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Validation-layer callback. Messages flow into the `log` facade, so the
/// sink is whatever logger the host application installed at startup.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Maximum sample count usable for both color and depth attachments
    pub max_sample_count: vk::SampleCountFlags,
}

impl PhysicalDeviceInfo {
    /// Select the highest-rated suitable physical device
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };
        if devices.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Failed to find GPUs with Vulkan support".to_string(),
            ));
        }

        let mut best: Option<(i64, Self)> = None;
        for device in devices {
            let Some((score, info)) = Self::rate_device(instance, device, surface, surface_loader)?
            else {
                continue;
            };
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, info));
            }
        }

        let (_, info) = best.ok_or_else(|| {
            VulkanError::InitializationFailed("No suitable GPU found".to_string())
        })?;
        log::info!("Selected GPU: {}", unsafe {
            CStr::from_ptr(info.properties.device_name.as_ptr()).to_string_lossy()
        });
        Ok(info)
    }

    /// Rate a device; None means unsuitable
    fn rate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Option<(i64, Self)>> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy() };

        // Independent blend is non-negotiable: the transparency accumulation
        // subpass uses different blend equations on its two color attachments.
        if features.sampler_anisotropy == vk::FALSE
            || features.sample_rate_shading == vk::FALSE
            || features.independent_blend == vk::FALSE
        {
            log::debug!("Rejecting {}: missing required features", name);
            return Ok(None);
        }

        let Some((graphics_family, present_family)) =
            Self::find_queue_families(instance, device, surface, surface_loader)?
        else {
            log::debug!("Rejecting {}: incomplete queue families", name);
            return Ok(None);
        };

        if !Self::supports_extensions(instance, device)? {
            log::debug!("Rejecting {}: missing device extensions", name);
            return Ok(None);
        }

        // Swapchain adequacy: at least one format and one present mode
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
        };
        if formats.is_empty() || present_modes.is_empty() {
            log::debug!("Rejecting {}: inadequate swapchain support", name);
            return Ok(None);
        }

        let mut score: i64 = 0;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        }
        score += i64::from(properties.limits.max_image_dimension2_d);

        let counts = properties.limits.framebuffer_color_sample_counts
            & properties.limits.framebuffer_depth_sample_counts;
        let max_sample_count = max_usable_sample_count(counts);

        Ok(Some((
            score,
            Self {
                device,
                properties,
                graphics_family,
                present_family,
                max_sample_count,
            },
        )))
    }

    fn find_queue_families(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Option<(u32, u32)>> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        Ok(graphics_family.zip(present_family))
    }

    fn supports_extensions(
        instance: &Instance,
        device: vk::PhysicalDevice,
    ) -> VulkanResult<bool> {
        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let required = [SwapchainLoader::name()];
        Ok(required.iter().all(|required| {
            extensions.iter().any(|available| {
                let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                name == *required
            })
        }))
    }
}

/// Highest single bit set in a sample-count mask
fn max_usable_sample_count(counts: vk::SampleCountFlags) -> vk::SampleCountFlags {
    for candidate in [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ] {
        if counts.contains(candidate) {
            return candidate;
        }
    }
    vk::SampleCountFlags::TYPE_1
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a new logical device with the features the pass suite needs
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: std::collections::HashSet<u32> =
            [physical.graphics_family, physical.present_family]
                .iter()
                .cloned()
                .collect();

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&[1.0])
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .sample_rate_shading(true)
            .independent_blend(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            graphics_family: physical.graphics_family,
            present_family: physical.present_family,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Presentation surface with RAII cleanup
struct SurfaceHandle {
    loader: Surface,
    surface: vk::SurfaceKHR,
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

/// Main Vulkan context owning instance, surface and device.
///
/// Field order matters: drop runs in declaration order, so the device is
/// destroyed before the surface and the surface before the instance.
pub struct VulkanContext {
    /// Logical device for operations
    pub device: LogicalDevice,
    /// Selected physical device information
    pub physical_device: PhysicalDeviceInfo,
    surface: SurfaceHandle,
    /// Vulkan instance and debug utilities
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a new Vulkan context for the window
    pub fn new(window: &Window, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, config)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = SurfaceHandle {
            surface: window.create_surface(&instance.entry, &instance.instance)?,
            loader: surface_loader,
        };

        let physical_device = PhysicalDeviceInfo::select_suitable_device(
            &instance.instance,
            surface.surface,
            &surface.loader,
        )?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        Ok(Self {
            device,
            physical_device,
            surface,
            instance,
        })
    }

    /// Get the raw device handle (cheap clone of the function table)
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the surface handle
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.surface
    }

    /// Get the surface loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface.loader
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Sample count used by the scene passes
    pub fn scene_sample_count(&self, config: &RendererConfig) -> vk::SampleCountFlags {
        if config.multisampling {
            self.physical_device.max_sample_count
        } else {
            vk::SampleCountFlags::TYPE_1
        }
    }

    /// Find a memory type satisfying the filter and property flags
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<u32> {
        let memory_properties = unsafe {
            self.instance
                .instance
                .get_physical_device_memory_properties(self.physical_device.device)
        };

        for i in 0..memory_properties.memory_type_count {
            let matches_filter = type_filter & (1 << i) != 0;
            let matches_properties = memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties);
            if matches_filter && matches_properties {
                return Ok(i);
            }
        }

        Err(VulkanError::NoSuitableMemoryType)
    }

    /// Block until all queues are idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .device
                .device_wait_idle()
                .map_err(VulkanError::Api)
        }
    }
}

// No Drop impl of its own: the fields tear down in declaration order,
// device first, then the surface, then the instance.
