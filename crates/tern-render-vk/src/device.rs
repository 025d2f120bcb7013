// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::khr::swapchain;
use ash::vk;
use tracing::{debug, info};

use crate::error::{VkError, VkResultExt};
use crate::handle::DeviceOwned;
use crate::instance::Instance;
use crate::tools;

/// Family indices for the three queue roles. Unrequested roles share the
/// graphics family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl QueueFamilies {
    pub fn select(
        families: &[vk::QueueFamilyProperties],
        compute: bool,
        transfer: bool,
    ) -> Result<Self, VkError> {
        let graphics = tools::queue_family_index(families, vk::QueueFlags::GRAPHICS)?;
        Ok(Self {
            graphics,
            compute: if compute {
                tools::queue_family_index(families, vk::QueueFlags::COMPUTE)?
            } else {
                graphics
            },
            transfer: if transfer {
                tools::queue_family_index(families, vk::QueueFlags::TRANSFER)?
            } else {
                graphics
            },
        })
    }

    /// Distinct indices in role order; one queue-create entry each.
    pub fn unique(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(3);
        for index in [self.graphics, self.compute, self.transfer] {
            if !out.contains(&index) {
                out.push(index);
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Queues {
    pub graphics: vk::Queue,
    pub compute: vk::Queue,
    pub transfer: vk::Queue,
}

pub struct DeviceRequest {
    pub compute_queue: bool,
    pub transfer_queue: bool,
    pub dynamic_rendering: bool,
}

/// The logical device and what was learned about its physical device.
pub struct Device {
    raw: ash::Device,
    swapchain_loader: swapchain::Device,
    physical: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    memory: vk::PhysicalDeviceMemoryProperties,
    depth_format: vk::Format,
    families: QueueFamilies,
    queues: Queues,
    supported_extensions: Vec<CString>,
    enabled_extensions: Vec<CString>,
    dynamic_rendering: bool,
    instance: Arc<Instance>,
}

impl Device {
    pub fn new(
        instance: Arc<Instance>,
        physical: vk::PhysicalDevice,
        depth_format: vk::Format,
        request: &DeviceRequest,
    ) -> Result<Arc<Self>, VkError> {
        let vki = instance.raw();
        let properties = unsafe { vki.get_physical_device_properties(physical) };
        let features = unsafe { vki.get_physical_device_features(physical) };
        let memory = unsafe { vki.get_physical_device_memory_properties(physical) };
        let family_props = unsafe { vki.get_physical_device_queue_family_properties(physical) };

        let supported_extensions: Vec<CString> =
            unsafe { vki.enumerate_device_extension_properties(physical) }
                .call("vkEnumerateDeviceExtensionProperties")?
                .iter()
                .filter_map(|p| p.extension_name_as_c_str().ok().map(CStr::to_owned))
                .collect();
        if !supported_extensions.iter().any(|e| e.as_c_str() == swapchain::NAME) {
            return Err(VkError::MissingExtension(
                swapchain::NAME.to_string_lossy().into_owned(),
            ));
        }

        let families =
            QueueFamilies::select(&family_props, request.compute_queue, request.transfer_queue)?;

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|index| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: index,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        if request.dynamic_rendering {
            let major = vk::api_version_major(properties.api_version);
            let minor = vk::api_version_minor(properties.api_version);
            if (major, minor) < (1, 3) {
                return Err(VkError::DynamicRenderingUnsupported { major, minor });
            }
        }

        // Only the features needed by the render path are switched on.
        let mut feats13 = vk::PhysicalDeviceVulkan13Features {
            s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
            dynamic_rendering: vk::TRUE,
            synchronization2: vk::TRUE,
            ..Default::default()
        };
        let p_next = if request.dynamic_rendering {
            (&mut feats13) as *mut _ as *const std::ffi::c_void
        } else {
            std::ptr::null()
        };

        let enabled: Vec<&CStr> = vec![swapchain::NAME];
        let ext_ptrs: Vec<_> = enabled.iter().map(|e| e.as_ptr()).collect();
        let enabled_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            p_next,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            p_enabled_features: &enabled_features,
            ..Default::default()
        };

        let raw = unsafe { vki.create_device(physical, &create_info, None) }
            .call("vkCreateDevice")?;
        let swapchain_loader = swapchain::Device::new(vki, &raw);
        let queues = unsafe {
            Queues {
                graphics: raw.get_device_queue(families.graphics, 0),
                compute: raw.get_device_queue(families.compute, 0),
                transfer: raw.get_device_queue(families.transfer, 0),
            }
        };

        info!(
            "logical device: graphics={} compute={} transfer={} ({} queue(s)), dynamic_rendering={}",
            families.graphics,
            families.compute,
            families.transfer,
            queue_infos.len(),
            request.dynamic_rendering
        );

        Ok(Arc::new(Self {
            raw,
            swapchain_loader,
            physical,
            properties,
            features,
            memory,
            depth_format,
            families,
            queues,
            supported_extensions,
            enabled_extensions: enabled.into_iter().map(CStr::to_owned).collect(),
            dynamic_rendering: request.dynamic_rendering,
            instance,
        }))
    }

    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    pub fn swapchain_loader(&self) -> &swapchain::Device {
        &self.swapchain_loader
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn physical(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn families(&self) -> QueueFamilies {
        self.families
    }

    pub fn queues(&self) -> Queues {
        self.queues
    }

    pub fn supported_extensions(&self) -> &[CString] {
        &self.supported_extensions
    }

    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    pub fn dynamic_rendering(&self) -> bool {
        self.dynamic_rendering
    }

    pub fn memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32, VkError> {
        tools::memory_type_index(&self.memory, type_bits, properties)
    }

    pub fn wait_idle(&self) -> Result<(), VkError> {
        unsafe { self.raw.device_wait_idle() }.call("vkDeviceWaitIdle")
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.raw.device_wait_idle();
            self.raw.destroy_device(None);
        }
        debug!("logical device destroyed");
    }
}

/// Reset-capable pool for the per-frame command buffers.
pub fn create_command_pool(
    device: &Arc<Device>,
    family: u32,
    flags: vk::CommandPoolCreateFlags,
) -> Result<DeviceOwned<vk::CommandPool>, VkError> {
    let ci = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        queue_family_index: family,
        flags,
        ..Default::default()
    };
    let pool = unsafe { device.raw().create_command_pool(&ci, None) }
        .call("vkCreateCommandPool")?;
    Ok(DeviceOwned::new(device.clone(), pool))
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

    #[test]
    fn unrequested_roles_share_graphics() {
        use vk::QueueFlags as Q;
        let fams = [
            family(Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER),
            family(Q::COMPUTE),
            family(Q::TRANSFER),
        ];
        let picked = QueueFamilies::select(&fams, false, false).unwrap();
        assert_eq!(picked, QueueFamilies::default());
        assert_eq!(picked.unique(), vec![0]);
    }

    #[test]
    fn requested_roles_get_dedicated_families() {
        use vk::QueueFlags as Q;
        let fams = [
            family(Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER),
            family(Q::COMPUTE | Q::TRANSFER),
            family(Q::TRANSFER),
        ];
        let picked = QueueFamilies::select(&fams, true, true).unwrap();
        assert_eq!((picked.compute, picked.transfer), (1, 2));
        assert_eq!(picked.unique(), vec![0, 1, 2]);
    }

    #[test]
    fn duplicate_indices_collapse() {
        let fams = QueueFamilies {
            graphics: 0,
            compute: 1,
            transfer: 1,
        };
        assert_eq!(fams.unique(), vec![0, 1]);
    }
}
