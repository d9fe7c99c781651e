//! Get-or-create cache for expensive GPU objects.

use crate::key::PipelineConfiguration;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use std::hash::Hash;

/// Map from a structural key to the object built for it.
///
/// Objects are built at most once per key. The cache never destroys GPU
/// objects itself: owners take them back with [`PipelineCache::drain`] and
/// release them.
pub struct PipelineCache<P, K = PipelineConfiguration> {
    entries: HashMap<K, P>,
}

impl<P, K> Default for PipelineCache<P, K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<P, K: Eq + Hash + Clone> PipelineCache<P, K> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the object cached for `key`, building it with `factory` on a
    /// miss.
    ///
    /// A failing factory leaves the cache as it was, so the next call with
    /// the same key tries again.
    pub fn get_or_create<E, F>(&mut self, key: &K, factory: F) -> Result<&P, E>
    where
        F: FnOnce(&K) -> Result<P, E>,
    {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let value = factory(entry.key())?;
                tracing::debug!("Pipeline cache miss");
                Ok(entry.insert(value))
            }
        }
    }

    /// Get the object cached for `key` without building it.
    pub fn get(&self, key: &K) -> Option<&P> {
        self.entries.get(key)
    }

    /// Check whether `key` has an entry.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Get the number of cached objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over keys and their objects in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &P)> {
        self.entries.iter()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::info!("Clearing {} cached pipeline objects", self.entries.len());
        }
        self.entries.clear();
    }

    /// Remove every entry, handing the objects back to the caller.
    pub fn drain(&mut self) -> impl Iterator<Item = P> + '_ {
        if !self.entries.is_empty() {
            tracing::info!("Releasing {} cached pipeline objects", self.entries.len());
        }
        self.entries.drain().map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Clone, PartialEq, Eq, Hash)]
    struct Key {
        width: u32,
        height: u32,
    }

    const SMALL: Key = Key {
        width: 800,
        height: 600,
    };
    const LARGE: Key = Key {
        width: 1920,
        height: 1080,
    };

    #[test]
    fn builds_once_per_key() {
        let mut cache: PipelineCache<u32, Key> = PipelineCache::new();
        let builds = Cell::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_create(&SMALL, |key| {
                    builds.set(builds.get() + 1);
                    Ok::<_, ()>(key.width)
                })
                .copied();
            assert_eq!(value, Ok(800));
        }

        assert_eq!(builds.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_extents_get_distinct_entries() {
        let mut cache: PipelineCache<u32, Key> = PipelineCache::new();

        cache.get_or_create(&SMALL, |key| Ok::<_, ()>(key.width)).ok();
        cache.get_or_create(&LARGE, |key| Ok::<_, ()>(key.width)).ok();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&SMALL), Some(&800));
        assert_eq!(cache.get(&LARGE), Some(&1920));
    }

    #[test]
    fn hit_returns_the_stored_object() {
        let mut cache: PipelineCache<String, Key> = PipelineCache::new();

        let first: *const String = cache
            .get_or_create(&SMALL, |_| Ok::<_, ()>("pipeline".to_string()))
            .unwrap();
        let second: *const String = cache
            .get_or_create(&SMALL, |_| Ok::<_, ()>("other".to_string()))
            .unwrap();

        assert!(std::ptr::eq(first, second));
        assert_eq!(cache.get(&SMALL).map(String::as_str), Some("pipeline"));
    }

    #[test]
    fn failed_factory_leaves_no_entry() {
        let mut cache: PipelineCache<u32, Key> = PipelineCache::new();

        let result = cache.get_or_create(&SMALL, |_| Err("compile failed"));
        assert_eq!(result, Err("compile failed"));
        assert!(!cache.contains(&SMALL));
        assert!(cache.is_empty());

        let retried = cache.get_or_create(&SMALL, |_| Ok::<_, &str>(7)).copied();
        assert_eq!(retried, Ok(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_forces_rebuild() {
        let mut cache: PipelineCache<u32, Key> = PipelineCache::new();
        let builds = Cell::new(0);
        let build = |cache: &mut PipelineCache<u32, Key>| {
            cache
                .get_or_create(&SMALL, |_| {
                    builds.set(builds.get() + 1);
                    Ok::<_, ()>(1)
                })
                .ok();
        };

        build(&mut cache);
        cache.clear();
        assert!(cache.is_empty());
        build(&mut cache);

        assert_eq!(builds.get(), 2);
    }

    #[test]
    fn drain_hands_back_every_object() {
        let mut cache: PipelineCache<u32, Key> = PipelineCache::new();
        cache.get_or_create(&SMALL, |_| Ok::<_, ()>(1)).ok();
        cache.get_or_create(&LARGE, |_| Ok::<_, ()>(2)).ok();

        let mut drained: Vec<u32> = cache.drain().collect();
        drained.sort_unstable();

        assert_eq!(drained, vec![1, 2]);
        assert!(cache.is_empty());
    }
}
