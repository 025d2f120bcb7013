// SPDX-License-Identifier: CEPL-1.0
//! Move-only ownership of raw Vulkan handles.
//!
//! An [`Owned`] pairs a handle with the object that created it (a
//! [`Device`] or an [`Instance`]) and destroys it through that owner when
//! dropped or reset. Holding the owner by `Arc` keeps the device or instance
//! alive for as long as any child handle still exists.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use ash::vk::{self, Handle};

use crate::device::Device;
use crate::instance::Instance;

/// Destruction routine for a handle type created from owner `O`.
pub trait Destroy<O>: Handle + Copy + PartialEq {
    /// # Safety
    ///
    /// `handle` must have been created from `owner`, must not be null and
    /// must no longer be in use by the GPU.
    unsafe fn destroy(owner: &O, handle: Self);
}

pub struct Owned<H: Destroy<O>, O> {
    owner: Option<Arc<O>>,
    handle: H,
}

pub type DeviceOwned<H> = Owned<H, Device>;
pub type InstanceOwned<H> = Owned<H, Instance>;

impl<H: Destroy<O>, O> Owned<H, O> {
    pub fn new(owner: Arc<O>, handle: H) -> Self {
        Self {
            owner: Some(owner),
            handle,
        }
    }

    pub fn null() -> Self {
        Self {
            owner: None,
            handle: H::from_raw(0),
        }
    }

    /// Takes ownership of `handle`, first destroying whatever was held unless
    /// it is the very same owner/handle pair.
    pub fn attach(&mut self, owner: Arc<O>, handle: H) {
        let same_owner = self
            .owner
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &owner));
        if same_owner && self.handle == handle {
            return;
        }
        self.reset();
        self.owner = Some(owner);
        self.handle = handle;
    }

    /// Destroys the held handle (if any) and nulls both fields.
    pub fn reset(&mut self) {
        let handle = std::mem::replace(&mut self.handle, H::from_raw(0));
        if let Some(owner) = self.owner.take() {
            if handle.as_raw() != 0 {
                // SAFETY: handle came from this owner and callers reset only
                // once the GPU is done with it.
                unsafe { H::destroy(&owner, handle) };
            }
        }
    }

    /// Gives up ownership without destroying.
    pub fn release(&mut self) -> H {
        self.owner = None;
        std::mem::replace(&mut self.handle, H::from_raw(0))
    }

    pub fn raw(&self) -> H {
        self.handle
    }

    pub fn is_null(&self) -> bool {
        self.handle.as_raw() == 0
    }

    pub fn owner(&self) -> Option<&Arc<O>> {
        self.owner.as_ref()
    }
}

impl<H: Destroy<O>, O> Deref for Owned<H, O> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H: Destroy<O>, O> Default for Owned<H, O> {
    fn default() -> Self {
        Self::null()
    }
}

impl<H: Destroy<O>, O> Drop for Owned<H, O> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<H: Destroy<O> + fmt::Debug, O> fmt::Debug for Owned<H, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}

macro_rules! device_owned {
    ($($ty:ty => $destroy:ident),* $(,)?) => {$(
        impl Destroy<Device> for $ty {
            unsafe fn destroy(owner: &Device, handle: Self) {
                unsafe { owner.raw().$destroy(handle, None) }
            }
        }
    )*};
}

device_owned! {
    vk::Buffer => destroy_buffer,
    vk::CommandPool => destroy_command_pool,
    vk::DescriptorPool => destroy_descriptor_pool,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::DeviceMemory => free_memory,
    vk::Fence => destroy_fence,
    vk::Framebuffer => destroy_framebuffer,
    vk::Image => destroy_image,
    vk::ImageView => destroy_image_view,
    vk::Pipeline => destroy_pipeline,
    vk::PipelineCache => destroy_pipeline_cache,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::RenderPass => destroy_render_pass,
    vk::Semaphore => destroy_semaphore,
    vk::ShaderModule => destroy_shader_module,
}

impl Destroy<Device> for vk::SwapchainKHR {
    unsafe fn destroy(owner: &Device, handle: Self) {
        unsafe { owner.swapchain_loader().destroy_swapchain(handle, None) }
    }
}

impl Destroy<Instance> for vk::SurfaceKHR {
    unsafe fn destroy(owner: &Instance, handle: Self) {
        unsafe { owner.surface_loader().destroy_surface(handle, None) }
    }
}

impl Destroy<Instance> for vk::DebugUtilsMessengerEXT {
    unsafe fn destroy(owner: &Instance, handle: Self) {
        if let Some(debug_utils) = owner.debug_utils() {
            unsafe { debug_utils.destroy_debug_utils_messenger(handle, None) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingOwner {
        destroyed: RefCell<Vec<u64>>,
    }

    impl Destroy<RecordingOwner> for vk::Fence {
        unsafe fn destroy(owner: &RecordingOwner, handle: Self) {
            owner.destroyed.borrow_mut().push(handle.as_raw());
        }
    }

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn drop_destroys_once() {
        let owner = Arc::new(RecordingOwner::default());
        {
            let _f = Owned::new(owner.clone(), fence(7));
        }
        assert_eq!(*owner.destroyed.borrow(), vec![7]);
    }

    #[test]
    fn reset_is_idempotent_and_skips_null() {
        let owner = Arc::new(RecordingOwner::default());
        let mut f = Owned::new(owner.clone(), fence(3));
        f.reset();
        f.reset();
        assert!(f.is_null());
        drop(f);

        let null = Owned::new(owner.clone(), fence(0));
        drop(null);
        assert_eq!(*owner.destroyed.borrow(), vec![3]);
    }

    #[test]
    fn attach_releases_previous_pair() {
        let owner = Arc::new(RecordingOwner::default());
        let mut f = Owned::new(owner.clone(), fence(1));
        f.attach(owner.clone(), fence(2));
        assert_eq!(*owner.destroyed.borrow(), vec![1]);
        assert_eq!(f.raw(), fence(2));

        // same pair again: nothing destroyed
        f.attach(owner.clone(), fence(2));
        assert_eq!(*owner.destroyed.borrow(), vec![1]);

        drop(f);
        assert_eq!(*owner.destroyed.borrow(), vec![1, 2]);
    }

    #[test]
    fn attach_with_other_owner_releases_old_handle_on_old_owner() {
        let first = Arc::new(RecordingOwner::default());
        let second = Arc::new(RecordingOwner::default());
        let mut f = Owned::new(first.clone(), fence(5));
        f.attach(second.clone(), fence(5));
        assert_eq!(*first.destroyed.borrow(), vec![5]);
        assert!(second.destroyed.borrow().is_empty());
    }

    #[test]
    fn move_transfers_without_double_destroy() {
        let owner = Arc::new(RecordingOwner::default());
        let mut a = Owned::new(owner.clone(), fence(9));
        let b = std::mem::take(&mut a);
        assert!(a.is_null());
        assert_eq!(*b, fence(9));
        drop(a);
        assert!(owner.destroyed.borrow().is_empty());
        drop(b);
        assert_eq!(*owner.destroyed.borrow(), vec![9]);
    }

    #[test]
    fn release_hands_back_raw_handle() {
        let owner = Arc::new(RecordingOwner::default());
        let mut f = Owned::new(owner.clone(), fence(4));
        assert_eq!(f.release(), fence(4));
        drop(f);
        assert!(owner.destroyed.borrow().is_empty());
    }

    #[test]
    fn child_keeps_owner_alive() {
        let owner = Arc::new(RecordingOwner::default());
        let f = Owned::new(owner.clone(), fence(11));
        drop(owner);
        assert_eq!(Arc::strong_count(f.owner().unwrap()), 1);
    }
}
