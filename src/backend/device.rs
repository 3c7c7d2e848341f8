// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers and window-system extensions
// - Presentation surface creation
// - Physical device selection (prefer discrete GPU)
// - Logical device + queue creation

use anyhow::{Context, Result};
use ash::extensions::{ext, khr};
use ash::{vk, Entry};
use raw_window_handle::HasRawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;
use winit::window::Window;

use super::surface::PresentationSurface;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Required Vulkan device features for our renderer
const REQUIRED_DEVICE_FEATURES: vk::PhysicalDeviceFeatures = vk::PhysicalDeviceFeatures {
    sampler_anisotropy: vk::TRUE,
    ..unsafe { std::mem::zeroed() }
};

/// Queue families used for rendering and presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Pick the first family that can both draw and present.
    ///
    /// Resources are created with exclusive sharing, so a device that only
    /// offers separate graphics and present families is not usable.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        present_support: &[bool],
    ) -> Option<Self> {
        families
            .iter()
            .zip(present_support)
            .position(|(props, &present)| {
                props.queue_count > 0
                    && props.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    && present
            })
            .map(|i| Self {
                graphics: i as u32,
                present: i as u32,
            })
    }
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (destroyed in Drop, reverse order)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: PresentationSurface,
    debug_utils: Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    pub entry: Entry,

    // Queue handles
    pub queue_families: QueueFamilyIndices,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    // Device properties (cached)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Create Vulkan device
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    /// * `window` - Window the device must be able to present to
    pub fn new(app_name: &str, enable_validation: bool, window: &Window) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let enable_validation = enable_validation && Self::validation_layer_available(&entry)?;

        // Step 2: Create instance
        let instance = Self::create_instance(&entry, app_name, enable_validation, window)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // Step 4: Connect the window
        let surface = PresentationSurface::new(&entry, &instance, window)?;

        // Step 5: Pick physical device (GPU)
        let (physical_device, queue_families) = Self::pick_physical_device(&instance, &surface)?;

        // Step 6: Create logical device
        let device = Self::create_logical_device(&instance, physical_device, queue_families)?;
        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        // Step 7: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            surface,
            debug_utils,
            instance,
            entry,
            queue_families,
            graphics_queue,
            present_queue,
            properties,
            memory_properties,
        }))
    }

    fn validation_layer_available(entry: &Entry) -> Result<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .context("Failed to enumerate instance layers")?;

        let found = layers
            .iter()
            .any(|layer| name_matches(&layer.layer_name, VALIDATION_LAYER));
        if !found {
            log::warn!("Validation layer not installed, continuing without validation");
        }
        Ok(found)
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        window: &Window,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("No Engine")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        // Extensions the window system needs for surface creation
        let mut extensions =
            ash_window::enumerate_required_extensions(window.raw_display_handle())
                .context("Failed to get instance extensions required by the window system")?
                .to_vec();

        if enable_validation {
            extensions.push(ext::DebugUtils::name().as_ptr());
        }

        // Optional extensions, enabled only when the loader offers them
        let available = entry
            .enumerate_instance_extension_properties(None)
            .context("Failed to enumerate instance extensions")?;

        if has_extension(&available, vk::KhrGetPhysicalDeviceProperties2Fn::name()) {
            extensions.push(vk::KhrGetPhysicalDeviceProperties2Fn::name().as_ptr());
        }

        let mut flags = vk::InstanceCreateFlags::empty();
        if has_extension(&available, vk::KhrPortabilityEnumerationFn::name()) {
            extensions.push(vk::KhrPortabilityEnumerationFn::name().as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        // Validation layers
        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        // Chained so that instance creation and destruction are validated too
        let mut debug_info = debug_messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .flags(flags)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        log::info!("Vulkan instance created ({} extensions)", extensions.len());
        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ext::DebugUtils::new(entry, instance);
        let create_info = debug_messenger_create_info();

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface: &PresentationSurface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        // Score each device
        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let features = unsafe { instance.get_physical_device_features(device) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

            // Check required features
            if !check_device_features(&features) {
                log::debug!("Skipping {}: sampler anisotropy unsupported", name);
                continue;
            }

            let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
                .context("Failed to enumerate device extensions")?;
            if !has_extension(&extensions, khr::Swapchain::name()) {
                log::debug!("Skipping {}: no swapchain support", name);
                continue;
            }

            // Find a queue family that can draw and present
            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };
            let present_support = (0..queue_families.len() as u32)
                .map(|i| surface.supports_present(device, i))
                .collect::<Result<Vec<_>>>()?;

            let Some(indices) = QueueFamilyIndices::find(&queue_families, &present_support)
            else {
                log::debug!("Skipping {}: no queue family supports graphics and present", name);
                continue;
            };

            let score = score_device(props.device_type);
            if score > best_score {
                best_score = score;
                best_device = Some((device, indices));
            }
        }

        best_device.ok_or_else(|| {
            anyhow::anyhow!(
                "No suitable GPU found (need sampler anisotropy, swapchain support \
                 and a queue family with both graphics and present)"
            )
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilyIndices,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_families.graphics)
            .queue_priorities(&queue_priorities)
            .build();

        // Required device extensions
        let mut extensions = vec![khr::Swapchain::name().as_ptr()];

        // Portability implementations require the subset extension when reported
        let available = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .context("Failed to enumerate device extensions")?;
        if has_extension(&available, vk::KhrPortabilitySubsetFn::name()) {
            extensions.push(vk::KhrPortabilitySubsetFn::name().as_ptr());
        }

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .enabled_features(&REQUIRED_DEVICE_FEATURES);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);
            self.surface.destroy();

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

fn check_device_features(features: &vk::PhysicalDeviceFeatures) -> bool {
    features.sampler_anisotropy == vk::TRUE
}

/// Prefer discrete GPUs, then integrated, then anything else
pub fn score_device(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

pub fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|props| name_matches(&props.extension_name, name))
}

/// Compare a fixed-size, NUL-terminated Vulkan name field against `name`
fn name_matches(raw: &[c_char], name: &CStr) -> bool {
    raw.iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .eq(name.to_bytes().iter().copied())
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let data = &*p_callback_data;
    let message = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {:?}] {}", message_type, message);
        }
        _ => {
            log::debug!("[Vulkan {:?}] {}", message_type, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn extension(name: &str) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props.extension_name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        props
    }

    #[test]
    fn picks_first_family_with_graphics_and_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];

        let indices = QueueFamilyIndices::find(&families, &[true, true, true]).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 1, present: 1 });

        let indices = QueueFamilyIndices::find(&families, &[true, false, true]).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 2, present: 2 });
    }

    #[test]
    fn split_graphics_and_present_families_are_rejected() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        assert_eq!(QueueFamilyIndices::find(&families, &[false, true]), None);
    }

    #[test]
    fn empty_families_are_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];

        let indices = QueueFamilyIndices::find(&families, &[true, true]).unwrap();
        assert_eq!(indices.graphics, 1);
    }

    #[test]
    fn discrete_gpus_win() {
        assert!(
            score_device(vk::PhysicalDeviceType::DISCRETE_GPU)
                > score_device(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            score_device(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > score_device(vk::PhysicalDeviceType::CPU)
        );
        assert!(score_device(vk::PhysicalDeviceType::OTHER) > 0);
    }

    #[test]
    fn extension_lookup_matches_whole_names() {
        let available = [
            extension("VK_KHR_swapchain_mutable_format"),
            extension("VK_KHR_portability_subset"),
        ];

        assert!(has_extension(&available, vk::KhrPortabilitySubsetFn::name()));
        assert!(!has_extension(&available, khr::Swapchain::name()));
        assert!(!has_extension(&[], khr::Swapchain::name()));
    }

    #[test]
    fn anisotropy_is_required() {
        let mut features = vk::PhysicalDeviceFeatures::default();
        assert!(!check_device_features(&features));
        features.sampler_anisotropy = vk::TRUE;
        assert!(check_device_features(&features));
    }
}
