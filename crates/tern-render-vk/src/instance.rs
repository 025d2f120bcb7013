// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CStr, CString};
use std::sync::Arc;

use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{VkError, VkResultExt};
use crate::handle::InstanceOwned;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
pub const API_VERSION: u32 = vk::API_VERSION_1_3;

/// The Vulkan instance plus the instance-level loaders built from it.
pub struct Instance {
    entry: Entry,
    raw: ash::Instance,
    surface_loader: surface::Instance,
    debug_utils: Option<debug_utils::Instance>,
    supported_extensions: Vec<CString>,
    enabled_extensions: Vec<CString>,
    validation: bool,
}

impl Instance {
    /// Creates the instance with the extensions the window system needs,
    /// plus validation and debug-utils when requested and available.
    pub fn new(app_name: &str, display: RawDisplayHandle, validation: bool) -> Result<Arc<Self>, VkError> {
        let entry = Entry::linked();

        let supported_extensions: Vec<CString> =
            unsafe { entry.enumerate_instance_extension_properties(None) }
                .call("vkEnumerateInstanceExtensionProperties")?
                .iter()
                .filter_map(|p| p.extension_name_as_c_str().ok().map(CStr::to_owned))
                .collect();
        let supports = |name: &CStr| supported_extensions.iter().any(|e| e.as_c_str() == name);

        let mut extensions: Vec<&CStr> = ash_window::enumerate_required_extensions(display)
            .call("enumerate_required_extensions")?
            .iter()
            // SAFETY: ash-window returns static NUL-terminated extension names.
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect();
        for ext in &extensions {
            if !supports(ext) {
                return Err(VkError::MissingExtension(ext.to_string_lossy().into_owned()));
            }
        }

        let validation = validation && {
            let present = has_validation_layer(&entry)?;
            if !present {
                warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
            }
            present
        };

        let debug_ext = validation && supports(debug_utils::NAME);
        if debug_ext {
            extensions.push(debug_utils::NAME);
        }

        let app = CString::new(app_name).unwrap_or_else(|_| c"tern".to_owned());
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app.as_ptr(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            p_engine_name: c"tern".as_ptr(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: API_VERSION,
            ..Default::default()
        };

        let ext_ptrs: Vec<_> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layers = [VALIDATION_LAYER.as_ptr()];
        let (layer_count, layer_ptrs) = if validation {
            (layers.len() as u32, layers.as_ptr())
        } else {
            (0, std::ptr::null())
        };

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            enabled_layer_count: layer_count,
            pp_enabled_layer_names: layer_ptrs,
            ..Default::default()
        };

        let raw = unsafe { entry.create_instance(&create_info, None) }.call("vkCreateInstance")?;
        let surface_loader = surface::Instance::new(&entry, &raw);
        let debug_utils = debug_ext.then(|| debug_utils::Instance::new(&entry, &raw));

        info!(
            "vulkan instance: {} extension(s), validation={}",
            extensions.len(),
            validation
        );

        Ok(Arc::new(Self {
            entry,
            raw,
            surface_loader,
            debug_utils,
            supported_extensions,
            enabled_extensions: extensions.into_iter().map(CStr::to_owned).collect(),
            validation,
        }))
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    pub fn debug_utils(&self) -> Option<&debug_utils::Instance> {
        self.debug_utils.as_ref()
    }

    pub fn supported_extensions(&self) -> &[CString] {
        &self.supported_extensions
    }

    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    pub fn validation(&self) -> bool {
        self.validation
    }

    /// Picks the first enumerated device. There is no scoring yet.
    pub fn select_physical_device(&self) -> Result<vk::PhysicalDevice, VkError> {
        let devices = unsafe { self.raw.enumerate_physical_devices() }
            .call("vkEnumeratePhysicalDevices")?;
        let phys = *devices.first().ok_or(VkError::NoPhysicalDevice)?;

        let props = unsafe { self.raw.get_physical_device_properties(phys) };
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            "using GPU 0 of {}: {} (api {}.{}.{})",
            devices.len(),
            name,
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            vk::api_version_patch(props.api_version)
        );
        Ok(phys)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe { self.raw.destroy_instance(None) };
        debug!("vulkan instance destroyed");
    }
}

fn has_validation_layer(entry: &Entry) -> Result<bool, VkError> {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }
        .call("vkEnumerateInstanceLayerProperties")?;
    Ok(layers
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER)))
}

/// Routes validation messages into `tracing`. Returns `None` when the
/// instance was created without debug-utils.
pub fn create_debug_messenger(
    instance: &Arc<Instance>,
) -> Result<Option<InstanceOwned<vk::DebugUtilsMessengerEXT>>, VkError> {
    let Some(loader) = instance.debug_utils() else {
        return Ok(None);
    };
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = unsafe { loader.create_debug_utils_messenger(&ci, None) }
        .call("vkCreateDebugUtilsMessengerEXT")?;
    Ok(Some(InstanceOwned::new(instance.clone(), messenger)))
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback data struct for the duration of the call.
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    // SAFETY: p_message is a NUL-terminated string owned by the loader.
    let msg = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan {types:?}] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan {types:?}] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("[vulkan {types:?}] {msg}");
    } else {
        trace!("[vulkan {types:?}] {msg}");
    }
    vk::FALSE
}
