//! Megamorphic property cache
//!
//! Shared by every access site that has seen too many shapes for its own
//! inline cache. Two tables, one for reads and one for writes, map
//! (property key, shape) to the property's location. Each table is an array
//! of cache lines probed linearly; a miss is always safe and falls back to
//! the shape's own property table.
//!
//! Entries hold shapes weakly. A dead shape, a different shape at a reused
//! address, or a dictionary whose generation moved on simply fails to
//! validate; nothing is ever removed eagerly.

use crate::config::CacheConfig;
use memory_manager::{GcRef, PropertyKey, PropertyMetadata, Shape, Weak};
use rustc_hash::FxHasher;
use serde::Serialize;
use std::cell::Cell;
use std::hash::{Hash, Hasher};

/// One cached (key, shape) → location mapping.
#[derive(Debug, Clone)]
struct Entry {
    key: PropertyKey,
    shape: Weak<Shape>,
    shape_dictionary_generation: u64,
    metadata: PropertyMetadata,
}

impl Entry {
    fn is_reusable(&self) -> bool {
        !self.shape.is_alive()
    }

    fn matches(&self, key: &PropertyKey, shape: GcRef<Shape>) -> bool {
        if !self.shape.points_to(shape) || self.key != *key {
            return false;
        }
        !shape.is_dictionary() || shape.dictionary_generation() == self.shape_dictionary_generation
    }
}

/// Counters for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheTableStatistics {
    /// Lookups that found a valid entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Inserts that evicted a live entry
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: Cell<u64>,
    misses: Cell<u64>,
    evictions: Cell<u64>,
}

impl Counters {
    fn bump(counter: &Cell<u64>) {
        counter.set(counter.get() + 1);
    }

    fn snapshot(&self) -> CacheTableStatistics {
        CacheTableStatistics {
            hits: self.hits.get(),
            misses: self.misses.get(),
            evictions: self.evictions.get(),
        }
    }
}

#[derive(Debug)]
struct CacheTable {
    name: &'static str,
    entries: Vec<Option<Entry>>,
    salt: u64,
    counters: Counters,
}

impl CacheTable {
    fn new(name: &'static str, config: &CacheConfig, salt: u64) -> Self {
        CacheTable {
            name,
            entries: vec![None; config.table_size * config.entries_per_line],
            salt,
            counters: Counters::default(),
        }
    }

    fn lookup(&self, config: &CacheConfig, key: &PropertyKey, shape: GcRef<Shape>) -> Option<PropertyMetadata> {
        if shape.is_uncacheable_dictionary() {
            return None;
        }
        let hit = probe_lines(config, hash(self.salt, key, shape))
            .flat_map(|line| &self.entries[line_range(config, line)])
            .flatten()
            .find(|entry| entry.matches(key, shape))
            .map(|entry| entry.metadata);
        Counters::bump(if hit.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        });
        hit
    }

    fn insert(&mut self, config: &CacheConfig, key: PropertyKey, shape: GcRef<Shape>, metadata: PropertyMetadata) {
        if shape.is_uncacheable_dictionary() {
            return;
        }
        let entry = Entry {
            shape: shape.downgrade(),
            shape_dictionary_generation: shape.dictionary_generation(),
            key,
            metadata,
        };

        let mut last_line = 0;
        for line in probe_lines(config, hash(self.salt, &entry.key, shape)) {
            last_line = line;
            let slots = &mut self.entries[line_range(config, line)];
            let free = slots.iter_mut().find(|slot| match slot {
                None => true,
                Some(existing) => {
                    existing.is_reusable()
                        || (existing.key == entry.key && existing.shape.address() == entry.shape.address())
                }
            });
            if let Some(slot) = free {
                *slot = Some(entry);
                return;
            }
        }

        let victim = line_range(config, last_line).end - 1;
        log::debug!(
            "megamorphic {} cache: evicting slot {victim} for key {} on shape {:#x}",
            self.name,
            entry.key,
            shape.address()
        );
        Counters::bump(&self.counters.evictions);
        self.entries[victim] = Some(entry);
    }

    fn occupied(&self) -> usize {
        self.entries
            .iter()
            .flatten()
            .filter(|entry| !entry.is_reusable())
            .count()
    }

    fn clear(&mut self) {
        self.entries.iter_mut().for_each(|slot| *slot = None);
    }
}

fn hash(salt: u64, key: &PropertyKey, shape: GcRef<Shape>) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    let key_hash = hasher.finish();
    let shape_hash = ((shape.address() >> 4) as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    (key_hash ^ shape_hash.rotate_left(29)) ^ salt
}

fn probe_lines(config: &CacheConfig, hash: u64) -> impl Iterator<Item = usize> {
    let mask = config.table_size - 1;
    let start = hash as usize & mask;
    (0..config.max_probe).map(move |i| (start + i) & mask)
}

fn line_range(config: &CacheConfig, line: usize) -> std::ops::Range<usize> {
    let start = line * config.entries_per_line;
    start..start + config.entries_per_line
}

/// Statistics for both tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MegamorphicCacheStatistics {
    /// Read table
    pub get: CacheTableStatistics,
    /// Write table
    pub put: CacheTableStatistics,
}

/// Fixed-size, allocation-free (key, shape) → location cache.
///
/// # Example
///
/// ```
/// use interpreter::{CacheConfig, MegamorphicCache};
/// use memory_manager::{Heap, PropertyAttributes, PropertyKey, Shape, ShapeConfig};
///
/// let heap = Heap::new();
/// let root = Shape::create_root(&heap, ShapeConfig::default(), None).unwrap();
/// let shape = root
///     .create_put_transition(&heap, PropertyKey::from("x"), PropertyAttributes::DEFAULT)
///     .unwrap();
/// let x = shape.lookup(&PropertyKey::from("x")).unwrap();
///
/// let mut cache = MegamorphicCache::new(CacheConfig::default());
/// assert_eq!(cache.lookup_get(&PropertyKey::from("x"), shape), None);
/// cache.insert_get(PropertyKey::from("x"), shape, x);
/// assert_eq!(cache.lookup_get(&PropertyKey::from("x"), shape), Some(x));
/// ```
#[derive(Debug)]
pub struct MegamorphicCache {
    config: CacheConfig,
    get_table: CacheTable,
    put_table: CacheTable,
}

impl MegamorphicCache {
    /// Creates empty tables sized by `config`, which must be valid.
    pub fn new(config: CacheConfig) -> Self {
        MegamorphicCache {
            get_table: CacheTable::new("get", &config, config.get_salt),
            put_table: CacheTable::new("put", &config, config.put_salt),
            config,
        }
    }

    /// Table geometry.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Location of `key` for a read from an object with `shape`.
    pub fn lookup_get(&self, key: &PropertyKey, shape: GcRef<Shape>) -> Option<PropertyMetadata> {
        self.get_table.lookup(&self.config, key, shape)
    }

    /// Location of `key` for a write to an object with `shape`.
    pub fn lookup_put(&self, key: &PropertyKey, shape: GcRef<Shape>) -> Option<PropertyMetadata> {
        self.put_table.lookup(&self.config, key, shape)
    }

    /// Remembers a read location. Uncacheable dictionaries are ignored.
    pub fn insert_get(&mut self, key: PropertyKey, shape: GcRef<Shape>, metadata: PropertyMetadata) {
        self.get_table.insert(&self.config, key, shape, metadata);
    }

    /// Remembers a write location. Uncacheable dictionaries are ignored.
    pub fn insert_put(&mut self, key: PropertyKey, shape: GcRef<Shape>, metadata: PropertyMetadata) {
        self.put_table.insert(&self.config, key, shape, metadata);
    }

    /// Entries in both tables whose shape is still alive.
    pub fn live_entry_count(&self) -> usize {
        self.get_table.occupied() + self.put_table.occupied()
    }

    /// Hit, miss and eviction counters.
    pub fn statistics(&self) -> MegamorphicCacheStatistics {
        MegamorphicCacheStatistics {
            get: self.get_table.counters.snapshot(),
            put: self.put_table.counters.snapshot(),
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.get_table.clear();
        self.put_table.clear();
    }
}
