// SPDX-License-Identifier: CEPL-1.0
//! Generational slot storage.
//!
//! [`Slots`] hands out [`Handle`]s that stay cheap to copy and go stale once
//! the value they point at is removed, even if the slot is reused later.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Same slot coordinates, different payload type.
    pub const fn retag<U>(self) -> Handle<U> {
        Handle::new(self.index, self.generation)
    }
}

// manual impls so T does not need to be Copy/Eq/etc.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    /// A handle that never resolves.
    fn default() -> Self {
        Self::new(u32::MAX, 0)
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    value: Option<T>,
    generation: u32,
}

pub struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Stores `value`, reusing the most recently freed slot if there is one.
    /// Returns `None` once every `u32` index is taken.
    pub fn insert(&mut self, value: T) -> Option<Handle<T>> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            return Some(Handle::new(index, slot.generation));
        }
        let index = next_index(self.slots.len())?;
        self.slots.push(Slot {
            value: Some(value),
            generation: 0,
        });
        Some(Handle::new(index, 0))
    }

    /// Removes and returns the value; stale handles return `None`.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        if !self.is_valid(handle) {
            return None;
        }
        let value = self.slots[handle.index as usize].value.take();
        self.free.push(handle.index);
        value
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.value.as_mut())
    }

    pub fn is_valid(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (Handle::new(i as u32, s.generation), v))
        })
    }

    /// Drops every value; outstanding handles go stale.
    pub fn clear(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                self.free.push(i as u32);
            }
        }
    }

    /// Consumes the storage, yielding the live values in slot order.
    pub fn into_values(self) -> impl Iterator<Item = T> {
        self.slots.into_iter().filter_map(|s| s.value)
    }
}

/// Index a fresh slot gets when `len` slots exist.
fn next_index(len: usize) -> Option<u32> {
    u32::try_from(len).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_slots_are_reused_with_bumped_generation() {
        let mut slots = Slots::new();
        let a = slots.insert("a").unwrap();
        let b = slots.insert("b").unwrap();
        let c = slots.insert("c").unwrap();
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));

        slots.remove(b);
        let d = slots.insert("d").unwrap();
        assert_eq!(d.index(), 1);
        assert_eq!(d.generation(), b.generation() + 1);
        assert_eq!(slots.get(d), Some(&"d"));
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut slots = Slots::new();
        let a = slots.insert(10).unwrap();
        assert!(slots.is_valid(a));

        assert_eq!(slots.remove(a), Some(10));
        assert!(!slots.is_valid(a));
        assert_eq!(slots.remove(a), None);

        let reused = slots.insert(20).unwrap();
        assert_eq!(reused.index(), a.index());
        assert!(!slots.is_valid(a));
        assert!(slots.get_mut(a).is_none());
        assert!(slots.is_valid(reused));
    }

    #[test]
    fn live_count_tracks_inserts_minus_removes() {
        let mut slots = Slots::new();
        let mut handles = Vec::new();
        let mut created = 0;
        let mut destroyed = 0;
        for round in 0..5 {
            for i in 0..8 {
                handles.push(slots.insert(round * 100 + i).unwrap());
                created += 1;
                assert_eq!(slots.len(), created - destroyed);
            }
            for h in handles.drain(..).step_by(3) {
                if slots.remove(h).is_some() {
                    destroyed += 1;
                }
                assert_eq!(slots.len(), created - destroyed);
            }
        }
    }

    #[test]
    fn default_handle_never_resolves() {
        let mut slots = Slots::new();
        slots.insert(1u8).unwrap();
        assert!(!slots.is_valid(Handle::default()));
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut slots = Slots::new();
        let a = slots.insert(1).unwrap();
        let b = slots.insert(2).unwrap();
        slots.clear();
        assert!(slots.is_empty());
        assert!(!slots.is_valid(a));
        assert!(!slots.is_valid(b));
        let c = slots.insert(3).unwrap();
        assert!(c.index() < 2);
        assert_eq!(slots.iter().count(), 1);
    }

    #[test]
    fn index_space_exhaustion_is_reported() {
        assert_eq!(next_index(0), Some(0));
        assert_eq!(next_index(u32::MAX as usize), Some(u32::MAX));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(next_index(u32::MAX as usize + 1), None);
    }

    #[test]
    fn retag_keeps_coordinates() {
        struct A;
        struct B;
        let h: Handle<A> = Handle::new(4, 7);
        let r: Handle<B> = h.retag();
        assert_eq!((r.index(), r.generation()), (4, 7));
    }

    #[test]
    fn into_values_skips_freed_slots() {
        let mut slots = Slots::new();
        let a = slots.insert("a").unwrap();
        slots.insert("b").unwrap();
        slots.insert("c").unwrap();
        slots.remove(a);
        assert_eq!(slots.into_values().collect::<Vec<_>>(), ["b", "c"]);
    }
}
