// SPDX-License-Identifier: CEPL-1.0
//! Small lookups shared by the init steps. Pure over queried property
//! structs so they can be tested without a GPU.

use ash::vk;

use crate::error::VkError;

/// Probed in order; the first with optimal-tiling depth/stencil support wins.
pub const DEPTH_CANDIDATES: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

/// Finds a queue family for `flags`.
///
/// A compute-only request prefers a family without graphics, a transfer-only
/// request prefers one with neither graphics nor compute. Anything else (or
/// no dedicated family) takes the first family containing all the flags.
pub fn queue_family_index(
    families: &[vk::QueueFamilyProperties],
    flags: vk::QueueFlags,
) -> Result<u32, VkError> {
    let find = |pred: &dyn Fn(vk::QueueFlags) -> bool| {
        families
            .iter()
            .position(|f| f.queue_count > 0 && pred(f.queue_flags))
            .map(|i| i as u32)
    };

    if flags == vk::QueueFlags::COMPUTE {
        if let Some(i) = find(&|q| q.contains(flags) && !q.contains(vk::QueueFlags::GRAPHICS)) {
            return Ok(i);
        }
    }

    if flags == vk::QueueFlags::TRANSFER {
        if let Some(i) = find(&|q| {
            q.contains(flags)
                && !q.contains(vk::QueueFlags::GRAPHICS)
                && !q.contains(vk::QueueFlags::COMPUTE)
        }) {
            return Ok(i);
        }
    }

    find(&|q| q.contains(flags)).ok_or(VkError::NoQueueFamily(flags))
}

/// Index of the first memory type allowed by `type_bits` that has all of
/// `properties`.
pub fn memory_type_index(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32, VkError> {
    (0..memory.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && memory.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VkError::NoMemoryType {
            type_bits,
            properties,
        })
}

/// Walks [`DEPTH_CANDIDATES`] asking `query` for each format's properties.
pub fn pick_depth_format(
    mut query: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format, VkError> {
    DEPTH_CANDIDATES
        .into_iter()
        .find(|&format| {
            query(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(VkError::NoDepthFormat)
}

/// True for the depth formats that carry an 8-bit stencil.
pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn desktop_families() -> Vec<vk::QueueFamilyProperties> {
        use vk::QueueFlags as Q;
        vec![
            family(Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER),
            family(Q::COMPUTE | Q::TRANSFER),
            family(Q::TRANSFER),
        ]
    }

    #[test]
    fn dedicated_families_are_preferred() {
        let fams = desktop_families();
        assert_eq!(queue_family_index(&fams, vk::QueueFlags::GRAPHICS).unwrap(), 0);
        assert_eq!(queue_family_index(&fams, vk::QueueFlags::COMPUTE).unwrap(), 1);
        assert_eq!(queue_family_index(&fams, vk::QueueFlags::TRANSFER).unwrap(), 2);
    }

    #[test]
    fn single_family_serves_everything() {
        use vk::QueueFlags as Q;
        let fams = [family(Q::GRAPHICS | Q::COMPUTE | Q::TRANSFER)];
        for flags in [Q::GRAPHICS, Q::COMPUTE, Q::TRANSFER] {
            assert_eq!(queue_family_index(&fams, flags).unwrap(), 0);
        }
    }

    #[test]
    fn missing_family_is_an_error() {
        let fams = [family(vk::QueueFlags::TRANSFER)];
        assert!(matches!(
            queue_family_index(&fams, vk::QueueFlags::GRAPHICS),
            Err(VkError::NoQueueFamily(f)) if f == vk::QueueFlags::GRAPHICS
        ));
    }

    #[test]
    fn memory_type_respects_bits_and_flags() {
        use vk::MemoryPropertyFlags as M;
        let mut mem = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        mem.memory_types[0].property_flags = M::DEVICE_LOCAL;
        mem.memory_types[1].property_flags = M::HOST_VISIBLE;
        mem.memory_types[2].property_flags = M::HOST_VISIBLE | M::HOST_COHERENT;

        let host = M::HOST_VISIBLE | M::HOST_COHERENT;
        assert_eq!(memory_type_index(&mem, 0b111, host).unwrap(), 2);
        assert_eq!(memory_type_index(&mem, 0b111, M::DEVICE_LOCAL).unwrap(), 0);
        assert!(memory_type_index(&mem, 0b011, host).is_err());
    }

    #[test]
    fn depth_query_walks_candidates_in_order() {
        let asked = RefCell::new(Vec::new());
        let format = pick_depth_format(|f| {
            asked.borrow_mut().push(f);
            let features = if f == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            };
            vk::FormatProperties {
                optimal_tiling_features: features,
                ..Default::default()
            }
        })
        .unwrap();

        assert_eq!(format, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(*asked.borrow(), DEPTH_CANDIDATES[..3].to_vec());
        assert!(DEPTH_CANDIDATES.contains(&format));
    }

    #[test]
    fn no_depth_format_is_an_error() {
        let res = pick_depth_format(|_| vk::FormatProperties::default());
        assert!(matches!(res, Err(VkError::NoDepthFormat)));
    }

    #[test]
    fn stencil_aspect_only_for_s8_formats() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert!(depth_aspect(vk::Format::D16_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
        assert!(!has_stencil(vk::Format::D16_UNORM));
    }
}
