//! Dense resource storage addressed through generation-checked handles.
//!
//! Objects live contiguously in `objects`. Each slot ever handed out owns a
//! header recording where its object currently sits and which generation it
//! is on. `index_remap` maps a dense position back to its header; positions
//! at or past `objects.len()` park free headers, which the next `add` picks up.
//!
//! Removal swaps the victim with the last object and pops, so iteration order
//! changes whenever something is removed.

use std::marker::PhantomData;
use std::slice;

use crate::error::{CoreError, Result};
use crate::handle::{Handle, ResourceHandle};

/// Highest generation a header can carry. A header freed at this generation
/// is retired instead of being reused.
const MAX_GENERATION: u32 = u32::MAX - 1;

/// `object_index` of a retired header. Always out of range.
const RETIRED: u32 = u32::MAX;

/// Maximum number of headers, keeping the null index unreachable.
const MAX_HEADERS: usize = u32::MAX as usize;

#[derive(Debug, Clone, Copy)]
struct Header {
    object_index: u32,
    generation: u32,
}

/// Owns values of `T` and hands out handles of type `H` to them.
///
/// Lookups with a null, stale or foreign handle return `None`, and removing
/// such a handle does nothing.
#[derive(Debug)]
pub struct ResourceContainer<T, H = ResourceHandle> {
    headers: Vec<Header>,
    objects: Vec<T>,
    index_remap: Vec<u32>,
    _handle: PhantomData<fn() -> H>,
}

impl<T, H> Default for ResourceContainer<T, H> {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            objects: Vec::new(),
            index_remap: Vec::new(),
            _handle: PhantomData,
        }
    }
}

impl<T, H: Handle> ResourceContainer<T, H> {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty container with room for `capacity` objects.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut container = Self::default();
        container.reserve(capacity);
        container
    }

    /// Reserve room for `additional` more objects.
    pub fn reserve(&mut self, additional: usize) {
        self.objects.reserve(additional);
        self.headers.reserve(additional);
        self.index_remap.reserve(additional);
    }

    /// Number of live objects.
    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if no object is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Take ownership of `value` and return a handle to it.
    ///
    /// # Panics
    /// Panics if the container cannot grow, like `Vec::push`.
    pub fn add(&mut self, value: T) -> H {
        match self.try_add(value) {
            Ok(handle) => handle,
            Err(e) => panic!("resource container: {e}"),
        }
    }

    /// Take ownership of `value` and return a handle to it, reporting
    /// allocation failure instead of panicking.
    pub fn try_add(&mut self, value: T) -> Result<H> {
        self.objects.try_reserve(1)?;

        let object_index = self.objects.len();
        self.retire_exhausted(object_index);

        if object_index == self.index_remap.len() {
            let header_index = self.headers.len();
            if header_index >= MAX_HEADERS {
                return Err(CoreError::CapacityExceeded(header_index));
            }
            self.headers.try_reserve(1)?;
            self.index_remap.try_reserve(1)?;

            // First bump below wraps this to generation 0.
            self.headers.push(Header {
                object_index: object_index as u32,
                generation: u32::MAX,
            });
            self.index_remap.push(header_index as u32);
        }

        let header_index = self.index_remap[object_index];
        let header = &mut self.headers[header_index as usize];
        header.object_index = object_index as u32;
        header.generation = header.generation.wrapping_add(1);
        let generation = header.generation;

        self.objects.push(value);

        Ok(H::from_raw(ResourceHandle::new(header_index, generation)))
    }

    /// Remove the object behind `handle` and give it back.
    ///
    /// Returns `None` and leaves the container untouched for null, stale,
    /// out-of-range or already removed handles.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let object_index = self.get_index(handle)?;
        let last = self.objects.len() - 1;

        if object_index != last {
            self.swap_positions(object_index, last);
        }

        // The freed header now sits at position `last`, which is past the
        // end of `objects` once popped.
        self.objects.pop()
    }

    /// Dense position of the object behind `handle`.
    pub fn get_index(&self, handle: H) -> Option<usize> {
        let raw = handle.raw();
        if raw.is_null() {
            return None;
        }

        let header = self.headers.get(raw.index() as usize)?;
        if header.generation != raw.generation() {
            return None;
        }

        let object_index = header.object_index as usize;
        (object_index < self.objects.len()).then_some(object_index)
    }

    /// Borrow the object behind `handle`.
    pub fn get(&self, handle: H) -> Option<&T> {
        let index = self.get_index(handle)?;
        self.objects.get(index)
    }

    /// Mutably borrow the object behind `handle`.
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        let index = self.get_index(handle)?;
        self.objects.get_mut(index)
    }

    /// Returns `true` if `handle` resolves to a live object.
    pub fn contains(&self, handle: H) -> bool {
        self.get_index(handle).is_some()
    }

    /// Iterate over live objects in dense order.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.objects.iter()
    }

    /// Mutably iterate over live objects in dense order.
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.objects.iter_mut()
    }

    /// Live objects as a contiguous slice.
    pub fn as_slice(&self) -> &[T] {
        &self.objects
    }

    /// Iterate over `(handle, object)` pairs in dense order.
    pub fn handles(&self) -> impl Iterator<Item = (H, &T)> + '_ {
        self.objects.iter().enumerate().map(|(position, object)| {
            let header_index = self.index_remap[position];
            let header = &self.headers[header_index as usize];
            let handle = H::from_raw(ResourceHandle::new(header_index, header.generation));
            (handle, object)
        })
    }

    /// Drop every live object and invalidate every outstanding handle.
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Remove every live object, yielding them in dense order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.objects.drain(..)
    }

    /// Swap the objects at two dense positions along with their bookkeeping.
    fn swap_positions(&mut self, a: usize, b: usize) {
        self.objects.swap(a, b);

        let header_a = self.index_remap[a] as usize;
        let header_b = self.index_remap[b] as usize;
        self.headers[header_a].object_index = b as u32;
        self.headers[header_b].object_index = a as u32;

        self.index_remap.swap(a, b);
    }

    /// Drop free headers at `position` that have run out of generations.
    fn retire_exhausted(&mut self, position: usize) {
        while let Some(&header_index) = self.index_remap.get(position) {
            let header = &mut self.headers[header_index as usize];
            if header.generation != MAX_GENERATION {
                break;
            }
            header.object_index = RETIRED;

            self.index_remap.swap_remove(position);
            if let Some(&moved) = self.index_remap.get(position) {
                self.headers[moved as usize].object_index = position as u32;
            }
        }
    }
}

impl<'a, T, H: Handle> IntoIterator for &'a ResourceContainer<T, H> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, H: Handle> IntoIterator for &'a mut ResourceContainer<T, H> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::MeshHandle;
    use std::collections::{HashMap, HashSet};

    /// Every live object's header must point back at its dense position.
    fn assert_consistent<T, H: Handle>(container: &ResourceContainer<T, H>) {
        assert!(container.index_remap.len() >= container.objects.len());
        for (position, &header_index) in container.index_remap.iter().enumerate() {
            let header = container.headers[header_index as usize];
            assert_eq!(header.object_index as usize, position);
        }
    }

    #[test]
    fn add_remove_reuse_scenario() {
        let mut container: ResourceContainer<&str> = ResourceContainer::new();

        let h1 = container.add("A");
        let h2 = container.add("B");
        assert_eq!(h1, ResourceHandle::new(0, 0));
        assert_eq!(h2, ResourceHandle::new(1, 0));

        assert_eq!(container.remove(h1), Some("A"));
        assert_eq!(container.get(h1), None);
        assert_eq!(container.as_slice(), &["B"]);
        assert_eq!(container.get_index(h2), Some(0));

        let h3 = container.add("C");
        assert_eq!(h3, ResourceHandle::new(0, 1));
        assert_eq!(container.get(h1), None);
        assert_eq!(container.get(h3), Some(&"C"));
        assert_eq!(container.get(h2), Some(&"B"));
        assert_consistent(&container);
    }

    #[test]
    fn remove_null_is_noop() {
        let mut container: ResourceContainer<u32> = ResourceContainer::new();
        container.add(1);
        container.add(2);

        assert_eq!(container.remove(ResourceHandle::NULL), None);
        assert_eq!(container.remove(ResourceHandle::default()), None);
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn remove_twice_is_noop() {
        let mut container: ResourceContainer<u32> = ResourceContainer::new();
        let a = container.add(10);
        let b = container.add(20);

        assert_eq!(container.remove(a), Some(10));
        assert_eq!(container.remove(a), None);
        assert_eq!(container.len(), 1);
        assert_eq!(container.get(b), Some(&20));
    }

    #[test]
    fn out_of_range_handle_is_ignored() {
        let mut container: ResourceContainer<u32> = ResourceContainer::new();
        container.add(1);

        let bogus = ResourceHandle::new(42, 0);
        assert_eq!(container.get(bogus), None);
        assert_eq!(container.remove(bogus), None);
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn stale_handle_never_aliases_new_object() {
        let mut container: ResourceContainer<&str> = ResourceContainer::new();
        let old = container.add("old");
        container.remove(old);
        let new = container.add("new");

        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert_eq!(container.get(old), None);
        assert_eq!(container.remove(old), None);
        assert_eq!(container.get(new), Some(&"new"));
    }

    #[test]
    fn handles_stay_unique_under_churn() {
        let mut container: ResourceContainer<usize> = ResourceContainer::new();
        let mut seen = HashSet::new();
        let mut live = Vec::new();

        for i in 0..200 {
            let handle = container.add(i);
            assert!(seen.insert(handle), "handle {handle:?} issued twice");
            live.push(handle);

            if i % 3 == 0 {
                let victim = live.swap_remove(i % live.len());
                assert!(container.remove(victim).is_some());
            }
        }
    }

    #[test]
    fn matches_reference_model() {
        let mut container: ResourceContainer<u64> = ResourceContainer::new();
        let mut model: HashMap<ResourceHandle, u64> = HashMap::new();
        let mut removed = Vec::new();

        // Small LCG so the sequence is deterministic.
        let mut state = 0x2545_f491_u64;
        let mut next = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            state >> 33
        };

        for step in 0..2_000 {
            if model.is_empty() || next() % 5 < 3 {
                let value = next();
                let handle = container.add(value);
                assert!(model.insert(handle, value).is_none());
            } else {
                let keys: Vec<_> = model.keys().copied().collect();
                let victim = keys[(next() as usize) % keys.len()];
                assert_eq!(container.remove(victim), model.remove(&victim));
                removed.push(victim);
            }

            if step % 97 == 0 {
                assert_consistent(&container);
            }
        }

        assert_eq!(container.len(), model.len());
        for (&handle, value) in &model {
            assert_eq!(container.get(handle), Some(value));
        }
        for handle in removed {
            if !model.contains_key(&handle) {
                assert_eq!(container.get(handle), None);
            }
        }

        let mut dense: Vec<u64> = container.iter().copied().collect();
        let mut expected: Vec<u64> = model.values().copied().collect();
        dense.sort_unstable();
        expected.sort_unstable();
        assert_eq!(dense, expected);
    }

    #[test]
    fn swap_remove_reorders_iteration() {
        let mut container: ResourceContainer<i32> = ResourceContainer::new();
        let first = container.add(1);
        container.add(2);
        container.add(3);

        container.remove(first);
        assert_eq!(container.iter().copied().collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn removing_last_object_keeps_order() {
        let mut container: ResourceContainer<i32> = ResourceContainer::new();
        container.add(1);
        container.add(2);
        let last = container.add(3);

        container.remove(last);
        assert_eq!(container.as_slice(), &[1, 2]);
        assert_consistent(&container);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut container: ResourceContainer<String> = ResourceContainer::new();
        let handle = container.add("mesh".to_string());

        if let Some(name) = container.get_mut(handle) {
            name.push_str("-lod0");
        }
        assert_eq!(container.get(handle).map(String::as_str), Some("mesh-lod0"));
    }

    #[test]
    fn handles_iterator_resolves_back() {
        let mut container: ResourceContainer<char> = ResourceContainer::new();
        let a = container.add('a');
        container.add('b');
        container.add('c');
        container.remove(a);

        for (handle, value) in container.handles() {
            assert_eq!(container.get(handle), Some(value));
        }
        assert_eq!(container.handles().count(), 2);
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut container: ResourceContainer<u8> = ResourceContainer::new();
        let a = container.add(1);
        let b = container.add(2);

        container.clear();
        assert!(container.is_empty());
        assert_eq!(container.get(a), None);
        assert_eq!(container.get(b), None);

        let c = container.add(3);
        assert_eq!(c, ResourceHandle::new(0, 1));
        assert_eq!(container.get(a), None);
        assert_consistent(&container);
    }

    #[test]
    fn exhausted_header_is_retired() {
        let mut container: ResourceContainer<&str> = ResourceContainer::new();
        container.add("first");
        container.headers[0].generation = MAX_GENERATION;
        let old = ResourceHandle::new(0, MAX_GENERATION);
        let keep = container.add("keep");

        assert_eq!(container.remove(old), Some("first"));

        let next = container.add("next");
        assert_eq!(next, ResourceHandle::new(2, 0));
        assert_eq!(container.get(old), None);
        assert_eq!(container.get(keep), Some(&"keep"));
        assert_eq!(container.headers[0].object_index, RETIRED);
        assert_consistent(&container);

        container.remove(next);
        assert_eq!(container.add("again"), ResourceHandle::new(2, 1));
    }

    #[test]
    fn typed_handles() {
        let mut container: ResourceContainer<&str, MeshHandle> = ResourceContainer::with_capacity(4);
        let cube = container.add("cube");

        assert_eq!(container.get(cube), Some(&"cube"));
        assert!(container.contains(cube));
        assert!(!container.contains(MeshHandle::NULL));
    }

    #[test]
    fn try_add_reports_success() {
        let mut container: ResourceContainer<u32> = ResourceContainer::new();
        let handle = container.try_add(5).unwrap();
        assert_eq!(container.get(handle), Some(&5));
    }

    #[test]
    fn drain_empties_container() {
        let mut container: ResourceContainer<u32> = ResourceContainer::new();
        let a = container.add(1);
        container.add(2);

        let drained: Vec<u32> = container.drain().collect();
        assert_eq!(drained, vec![1, 2]);
        assert!(container.is_empty());
        assert_eq!(container.get(a), None);
    }
}
