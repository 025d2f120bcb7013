// SPDX-License-Identifier: CEPL-1.0
//! Fixed-capacity bump allocator.
//!
//! An [`Arena`] hands out aligned byte ranges from one heap block and only
//! ever frees them all at once ([`Arena::reset`]) or back to a previously
//! taken [`ArenaMarker`]. The Vulkan backend uses one to pack geometry into
//! a single staging upload.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment of the backing block. Requests up to this alignment start at
/// offset 0 on a fresh arena.
pub const BASE_ALIGN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArenaMarker {
    offset: usize,
}

impl ArenaMarker {
    pub fn offset(self) -> usize {
        self.offset
    }
}

pub struct Arena {
    base: NonNull<u8>,
    layout: Layout,
    capacity: usize,
    offset: usize,
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl Arena {
    pub fn new(capacity: usize) -> Self {
        // zero-sized layouts are not allowed by the global allocator
        let layout = Layout::from_size_align(capacity.max(1), BASE_ALIGN)
            .unwrap_or_else(|_| alloc::handle_alloc_error(Layout::new::<u8>()));
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Self {
            base,
            layout,
            capacity,
            offset: 0,
        }
    }

    /// Reserves `size` bytes aligned to `align`, or `None` when the aligned
    /// range would run past the end of the arena.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    pub fn allocate(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let start = self.aligned_offset(align)?;
        if start.checked_add(size)? > self.capacity {
            return None;
        }
        self.offset = start + size;
        // SAFETY: start <= capacity, so the pointer stays inside (or one past) the block.
        Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(start)) })
    }

    /// Copies `bytes` into the arena and returns the offset they landed at.
    pub fn push_bytes(&mut self, bytes: &[u8], align: usize) -> Option<usize> {
        let dst = self.allocate(bytes.len(), align)?;
        let offset = dst.as_ptr() as usize - self.base.as_ptr() as usize;
        // SAFETY: allocate reserved bytes.len() writable bytes at dst, and the
        // source slice cannot alias memory owned by this arena mutably.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_ptr(), bytes.len());
        }
        Some(offset)
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }

    pub fn used(&self) -> usize {
        self.offset
    }

    pub fn available(&self) -> usize {
        self.capacity - self.offset
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The bytes handed out so far, including alignment padding.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the block was zero-initialised and offset <= capacity.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.offset) }
    }

    pub fn save(&self) -> ArenaMarker {
        ArenaMarker {
            offset: self.offset,
        }
    }

    /// Rewinds to `marker`.
    ///
    /// # Panics
    ///
    /// Panics if `marker` lies beyond the current offset.
    pub fn restore(&mut self, marker: ArenaMarker) {
        assert!(
            marker.offset <= self.offset,
            "arena marker {} is past the current offset {}",
            marker.offset,
            self.offset
        );
        self.offset = marker.offset;
    }

    fn aligned_offset(&self, align: usize) -> Option<usize> {
        assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
        let base = self.base.as_ptr() as usize;
        let cursor = base.checked_add(self.offset)?;
        let aligned = cursor.checked_add(align - 1)? & !(align - 1);
        Some(aligned - base)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: base was allocated in `new` with exactly this layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_arena_starts_at_zero() {
        let mut arena = Arena::new(64);
        let base = arena.allocate(0, 1).unwrap().as_ptr() as usize;
        arena.allocate(24, 8).unwrap();
        arena.reset();
        assert_eq!(arena.used(), 0);
        let again = arena.allocate(4, 4).unwrap().as_ptr() as usize;
        assert_eq!(again, base);
    }

    #[test]
    fn allocations_honour_alignment() {
        let mut arena = Arena::new(1024);
        for align in [1usize, 2, 4, 8, 16, 32, 64, 128] {
            arena.allocate(3, 1).unwrap();
            let p = arena.allocate(5, align).unwrap();
            assert_eq!(p.as_ptr() as usize % align, 0, "align {align}");
        }
    }

    #[test]
    fn allocate_fails_exactly_when_out_of_room() {
        let mut arena = Arena::new(32);
        assert!(arena.allocate(1, 1).is_some());
        // 1 used, next 16-aligned offset is 16, 16 + 16 == 32 fits
        assert!(arena.allocate(16, 16).is_some());
        assert_eq!(arena.used(), 32);
        assert_eq!(arena.available(), 0);
        assert!(arena.allocate(1, 1).is_none());
        assert!(arena.allocate(0, 1).is_some());

        let mut arena = Arena::new(32);
        arena.allocate(1, 1).unwrap();
        assert!(arena.allocate(17, 16).is_none());
        // a failed request leaves the offset untouched
        assert_eq!(arena.used(), 1);
    }

    #[test]
    fn save_restore_round_trip() {
        let mut arena = Arena::new(256);
        arena.allocate(10, 1).unwrap();
        let marker = arena.save();
        arena.allocate(100, 8).unwrap();
        arena.allocate(7, 4).unwrap();
        arena.restore(marker);
        assert_eq!(arena.used(), 10);
        assert_eq!(marker.offset(), 10);
    }

    #[test]
    #[should_panic(expected = "past the current offset")]
    fn restore_past_offset_panics() {
        let mut arena = Arena::new(64);
        arena.allocate(32, 1).unwrap();
        let marker = arena.save();
        arena.reset();
        arena.restore(marker);
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn non_power_of_two_alignment_panics() {
        let mut arena = Arena::new(64);
        let _ = arena.allocate(4, 3);
    }

    #[test]
    fn push_bytes_packs_with_padding() {
        let mut arena = Arena::new(64);
        let a = arena.push_bytes(&[1, 2, 3], 1).unwrap();
        let b = arena.push_bytes(&[9, 9, 9, 9], 4).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 4);
        assert_eq!(arena.as_bytes(), &[1, 2, 3, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn zero_capacity_arena_rejects_everything_but_empty() {
        let mut arena = Arena::new(0);
        assert!(arena.allocate(1, 1).is_none());
        assert!(arena.allocate(0, 1).is_some());
        assert_eq!(arena.capacity(), 0);
    }
}
