/// VulkanContext - headless instance, device and allocator shared by all Vulkan objects
///
/// Contains everything needed to build pipelines and record commands:
/// - Instance and logical device (API 1.3, dynamic rendering + synchronization2)
/// - Allocator for buffer and texture memory
/// - Optional validation messenger, object naming and ray tracing loader
///
/// No surface is created: presenting is outside of this crate.

use ash::vk;
use engine_core::ecore::render::Config;
use engine_core::ecore::{Error, Result};
use engine_core::{engine_debug, engine_err, engine_error, engine_info, engine_warn};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

const SOURCE: &str = "ecore::vulkan";

/// Device extensions needed by ray tracing pipelines
const RAY_TRACING_EXTENSIONS: [&CStr; 3] = [
    ash::khr::ray_tracing_pipeline::NAME,
    ash::khr::acceleration_structure::NAME,
    ash::khr::deferred_host_operations::NAME,
];

/// Optional device capabilities found at creation time
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DeviceCapabilities {
    /// Partially-bound + update-unused-while-pending binding flags enabled
    pub descriptor_indexing: bool,
    pub sampler_anisotropy: bool,
    pub ray_tracing: bool,
}

/// Shared Vulkan context.
///
/// Shared (via `Arc`) by the device, command lists and every resource, so the
/// context is always destroyed last.
pub struct VulkanContext {
    /// Vulkan entry (keeps the loader alive)
    _entry: ash::Entry,

    /// Vulkan instance
    pub(crate) instance: ash::Instance,

    pub(crate) physical_device: vk::PhysicalDevice,

    /// Vulkan logical device
    pub(crate) device: ash::Device,

    /// Graphics (+ compute) queue family index
    pub(crate) queue_family: u32,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,

    pub(crate) capabilities: DeviceCapabilities,

    /// Ray tracing pipeline loader (only when ray tracing is enabled)
    pub(crate) ray_tracing_loader: Option<ash::khr::ray_tracing_pipeline::Device>,

    /// Debug utils device loader (object names)
    pub(crate) debug_utils_device: Option<ash::ext::debug_utils::Device>,

    /// Debug utils loader (for validation layers)
    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    /// Debug messenger handle
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,

    device_name: String,
}

impl VulkanContext {
    /// Create a headless Vulkan context
    ///
    /// # Arguments
    ///
    /// * `config` - Application name, validation and ray tracing options
    ///
    /// # Errors
    ///
    /// `Error::InitializationFailed` when the loader, instance, a suitable GPU
    /// or the logical device cannot be obtained.
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!(SOURCE, "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let app_name = CString::new(config.app_name.as_str()).map_err(|e| {
                engine_error!(SOURCE, "Invalid application name: {}", e);
                Error::InitializationFailed(format!("Invalid application name: {}", e))
            })?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(
                    0,
                    config.app_version.0,
                    config.app_version.1,
                    config.app_version.2,
                ))
                .engine_name(c"EngineCore")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            // Debug utils carries both the validation messenger and object names
            let available_extensions = entry
                .enumerate_instance_extension_properties(None)
                .unwrap_or_default();
            let debug_utils_available = available_extensions
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == ash::ext::debug_utils::NAME));

            let validation = Self::validation_requested(config)
                && Self::validation_layer_available(&entry);
            let use_debug_utils = debug_utils_available && (validation || config.enable_object_names);

            let mut extension_names = Vec::new();
            if use_debug_utils {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                engine_error!(SOURCE, "Failed to create Vulkan instance: {:?}", e);
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            let debug_utils_loader = use_debug_utils
                .then(|| ash::ext::debug_utils::Instance::new(&entry, &instance));
            let debug_messenger = match (&debug_utils_loader, validation) {
                (Some(loader), true) => Some(Self::create_debug_messenger(loader, config)?),
                _ => None,
            };

            let (physical_device, queue_family) = Self::pick_physical_device(&instance)?;
            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let device_extensions = instance
                .enumerate_device_extension_properties(physical_device)
                .unwrap_or_default();
            let has_extension = |name: &CStr| {
                device_extensions
                    .iter()
                    .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext_name| ext_name == name))
            };
            let ray_tracing_extensions = config.enable_ray_tracing
                && RAY_TRACING_EXTENSIONS.iter().all(|&name| has_extension(name));

            // Query optional features
            let mut supported12 = vk::PhysicalDeviceVulkan12Features::default();
            let mut supported13 = vk::PhysicalDeviceVulkan13Features::default();
            let mut supported_rt = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
            let mut supported_as = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
            let supported_base = {
                let mut features2 = vk::PhysicalDeviceFeatures2::default()
                    .push_next(&mut supported12)
                    .push_next(&mut supported13);
                if ray_tracing_extensions {
                    features2 = features2
                        .push_next(&mut supported_rt)
                        .push_next(&mut supported_as);
                }
                instance.get_physical_device_features2(physical_device, &mut features2);
                features2.features
            };

            if supported13.dynamic_rendering == vk::FALSE || supported13.synchronization2 == vk::FALSE {
                engine_error!(SOURCE, "GPU '{}' lacks dynamic rendering or synchronization2", device_name);
                return Err(Error::InitializationFailed(format!(
                    "GPU '{}' lacks dynamic rendering or synchronization2",
                    device_name
                )));
            }

            let capabilities = DeviceCapabilities {
                descriptor_indexing: supported12.descriptor_binding_partially_bound == vk::TRUE
                    && supported12.descriptor_binding_update_unused_while_pending == vk::TRUE,
                sampler_anisotropy: supported_base.sampler_anisotropy == vk::TRUE,
                ray_tracing: ray_tracing_extensions
                    && supported_rt.ray_tracing_pipeline == vk::TRUE
                    && supported_as.acceleration_structure == vk::TRUE
                    && supported12.buffer_device_address == vk::TRUE,
            };
            if config.enable_ray_tracing && !capabilities.ray_tracing {
                engine_warn!(SOURCE, "Ray tracing requested but not supported by '{}'", device_name);
            }

            // Create Logical Device
            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];

            let device_extension_names: Vec<*const std::os::raw::c_char> = if capabilities.ray_tracing {
                RAY_TRACING_EXTENSIONS.iter().map(|name| name.as_ptr()).collect()
            } else {
                Vec::new()
            };

            let device_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(capabilities.sampler_anisotropy);
            let mut enabled12 = vk::PhysicalDeviceVulkan12Features::default()
                .descriptor_binding_partially_bound(capabilities.descriptor_indexing)
                .descriptor_binding_update_unused_while_pending(capabilities.descriptor_indexing)
                .buffer_device_address(capabilities.ray_tracing);
            let mut enabled13 = vk::PhysicalDeviceVulkan13Features::default()
                .dynamic_rendering(true)
                .synchronization2(true);
            let mut enabled_rt = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default()
                .ray_tracing_pipeline(true);
            let mut enabled_as = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
                .acceleration_structure(true);

            let mut device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features)
                .push_next(&mut enabled12)
                .push_next(&mut enabled13);
            if capabilities.ray_tracing {
                device_create_info = device_create_info
                    .push_next(&mut enabled_rt)
                    .push_next(&mut enabled_as);
            }

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: capabilities.ray_tracing,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let ray_tracing_loader = capabilities
                .ray_tracing
                .then(|| ash::khr::ray_tracing_pipeline::Device::new(&instance, &device));
            let debug_utils_device = (use_debug_utils && config.enable_object_names)
                .then(|| ash::ext::debug_utils::Device::new(&instance, &device));

            engine_info!(
                SOURCE,
                "Vulkan context created on '{}' (validation: {}, descriptor indexing: {}, ray tracing: {})",
                device_name,
                debug_messenger.is_some(),
                capabilities.descriptor_indexing,
                capabilities.ray_tracing
            );

            Ok(Arc::new(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                queue_family,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                capabilities,
                ray_tracing_loader,
                debug_utils_device,
                debug_utils_loader,
                debug_messenger,
                device_name,
            }))
        }
    }

    /// Name of the selected GPU
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Whether ray tracing pipelines can be created on this context
    pub fn supports_ray_tracing(&self) -> bool {
        self.capabilities.ray_tracing
    }

    /// Whether set layouts get the partially-bound binding flags
    pub fn supports_descriptor_indexing(&self) -> bool {
        self.capabilities.descriptor_indexing
    }

    /// Wait until the device is idle
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| engine_err!(SOURCE, "Failed to wait idle: {:?}", e))
        }
    }

    /// Attach a debug name to a Vulkan object (no-op without object names)
    pub(crate) fn set_object_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = &self.debug_utils_device else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            engine_warn!(SOURCE, "Object name contains a NUL byte, not forwarded");
            return;
        };
        let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        unsafe {
            if let Err(e) = debug_utils.set_debug_utils_object_name(&name_info) {
                engine_warn!(SOURCE, "Failed to set object name: {:?}", e);
            }
        }
    }

    #[cfg(feature = "vulkan-validation")]
    fn validation_requested(config: &Config) -> bool {
        config.enable_validation
    }

    #[cfg(not(feature = "vulkan-validation"))]
    fn validation_requested(config: &Config) -> bool {
        if config.enable_validation {
            engine_warn!(SOURCE, "Validation requested but the backend was built without 'vulkan-validation'");
        }
        false
    }

    fn validation_layer_available(entry: &ash::Entry) -> bool {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let available = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == c"VK_LAYER_KHRONOS_validation"));
        if !available {
            engine_warn!(SOURCE, "VK_LAYER_KHRONOS_validation not installed, validation disabled");
        }
        available
    }

    #[cfg(feature = "vulkan-validation")]
    fn create_debug_messenger(
        loader: &ash::ext::debug_utils::Instance,
        config: &Config,
    ) -> Result<vk::DebugUtilsMessengerEXT> {
        crate::debug::init_debug_config(crate::debug::DebugConfig {
            severity: config.debug_severity,
            enable_stats: config.enable_validation_stats,
        });

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::severity_flags(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        unsafe {
            loader.create_debug_utils_messenger(&debug_info, None).map_err(|e| {
                engine_error!(SOURCE, "Failed to create debug messenger: {:?}", e);
                Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
            })
        }
    }

    #[cfg(not(feature = "vulkan-validation"))]
    fn create_debug_messenger(
        _loader: &ash::ext::debug_utils::Instance,
        _config: &Config,
    ) -> Result<vk::DebugUtilsMessengerEXT> {
        Err(Error::InitializationFailed("validation support not compiled in".to_string()))
    }

    /// First GPU exposing Vulkan 1.3 and a graphics + compute queue, discrete GPUs first
    fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
            engine_error!(SOURCE, "Failed to enumerate physical devices: {:?}", e);
            Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
        })?;

        let mut candidates: Vec<(vk::PhysicalDevice, u32, bool)> = physical_devices
            .into_iter()
            .filter_map(|physical_device| {
                let properties = unsafe { instance.get_physical_device_properties(physical_device) };
                if properties.api_version < vk::API_VERSION_1_3 {
                    return None;
                }
                let queue_families =
                    unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
                let family = queue_families.iter().position(|qf| {
                    qf.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                })?;
                let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
                Some((physical_device, family as u32, discrete))
            })
            .collect();

        // Stable sort: discrete GPUs first, enumeration order otherwise
        candidates.sort_by_key(|&(_, _, discrete)| !discrete);

        let (physical_device, family, _) = candidates.into_iter().next().ok_or_else(|| {
            engine_error!(SOURCE, "No Vulkan 1.3 GPU with a graphics + compute queue found");
            Error::InitializationFailed("No Vulkan 1.3 GPU with a graphics + compute queue found".to_string())
        })?;

        engine_debug!(SOURCE, "Selected queue family {}", family);
        Ok((physical_device, family))
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.device.device_wait_idle().ok();

            // 1. Drop allocator: free VkDeviceMemory pages BEFORE destroying device
            ManuallyDrop::drop(&mut self.allocator);

            // 2. Stop forwarding validation messages, then destroy the messenger
            crate::debug::cleanup_debug_config();
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 3. Destroy device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
