//! Virtual Machine context
//!
//! Owns the heap, the megamorphic cache and the empty root shape every
//! fresh object starts from. Property access entry points live in
//! [`property_access`](crate::property_access).

use crate::config::RuntimeConfig;
use crate::megamorphic_cache::MegamorphicCache;
use core_types::RuntimeResult;
use memory_manager::{CollectionReport, CollectionType, GcRef, Heap, Object, Root, Shape};
use serde::Serialize;

/// Where property accesses were answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccessStatistics {
    /// Answered by the access site's own cache
    pub site_cache_hits: u64,
    /// Answered by the megamorphic cache
    pub megamorphic_hits: u64,
    /// Resolved through shape property tables
    pub slow_lookups: u64,
}

/// Virtual Machine state shared by every executable it runs
///
/// The VM manages:
/// - The garbage-collected heap
/// - The megamorphic property cache
/// - The empty root shape, kept alive for the VM's lifetime
///
/// # Example
///
/// ```
/// use core_types::Value;
/// use interpreter::VM;
/// use memory_manager::PropertyKey;
///
/// let vm = VM::new();
/// let object = vm.heap().root(vm.create_object().unwrap());
/// object.put(vm.heap(), PropertyKey::from("x"), Value::from_i32(3)).unwrap();
/// assert_eq!(object.get(&PropertyKey::from("x")), Some(Value::from_i32(3)));
/// ```
pub struct VM {
    // Declared before `heap` so the root unregisters before the heap sweeps.
    empty_shape: Root<Shape>,
    pub(crate) megamorphic_cache: MegamorphicCache,
    pub(crate) statistics: AccessStatistics,
    config: RuntimeConfig,
    pub(crate) heap: Heap,
}

impl VM {
    /// Create a new VM instance with the default configuration
    pub fn new() -> Self {
        match Self::with_config(RuntimeConfig::default()) {
            Ok(vm) => vm,
            Err(error) => panic!("default configuration rejected: {error}"),
        }
    }

    /// Create a VM from a configuration, validating it first.
    pub fn with_config(config: RuntimeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        let heap = Heap::with_config(config.heap.clone())?;
        let empty_shape = heap.root(Shape::create_root(&heap, config.shapes, None)?);
        log::debug!(
            "vm created: {} size classes, cache {}x{}",
            config.heap.size_classes.len(),
            config.cache.table_size,
            config.cache.entries_per_line
        );
        Ok(VM {
            empty_shape,
            megamorphic_cache: MegamorphicCache::new(config.cache),
            statistics: AccessStatistics::default(),
            config,
            heap,
        })
    }

    /// The heap objects are allocated on
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The effective configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The shared megamorphic cache
    pub fn megamorphic_cache(&self) -> &MegamorphicCache {
        &self.megamorphic_cache
    }

    /// Counters of where property accesses were answered
    pub fn access_statistics(&self) -> AccessStatistics {
        self.statistics
    }

    /// The shape of an object with no properties and no prototype
    pub fn empty_shape(&self) -> GcRef<Shape> {
        self.empty_shape.gc_ref()
    }

    /// Allocates an empty object without a prototype.
    pub fn create_object(&self) -> RuntimeResult<GcRef<Object>> {
        Object::create(&self.heap, self.empty_shape())
    }

    /// Allocates an empty object inheriting from `prototype`.
    ///
    /// The object comes back rooted: a collection postponed during setup
    /// runs as soon as the deferral scope ends.
    pub fn create_object_with_prototype(&self, prototype: GcRef<Object>) -> RuntimeResult<Root<Object>> {
        let _defer = self.heap.defer_gc();
        let object = self.heap.root(self.create_object()?);
        object.set_prototype(&self.heap, Some(prototype))?;
        Ok(object)
    }

    /// Runs a full mark/sweep collection.
    ///
    /// Returns `None` when collection is currently deferred.
    pub fn collect_garbage(&self) -> Option<CollectionReport> {
        self.heap.collect_garbage(CollectionType::CollectGarbage)
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VM")
            .field("config", &self.config)
            .field("live_cells", &self.heap.live_cell_count())
            .field("statistics", &self.statistics)
            .finish()
    }
}
