//! Workloads run by the CLI
//!
//! The Runtime owns a [`VM`] and drives it the way compiled code would:
//! through an executable's access sites, so that inline caches, the
//! megamorphic cache, shape transitions and the collector all take part.

use crate::error::{CliError, CliResult};
use bytecode_system::{Executable, ExecutableBuilder};
use core_types::Value;
use interpreter::{AccessStatistics, MegamorphicCacheStatistics, RuntimeConfig, VM};
use memory_manager::{AllocatorStatistics, CollectionReport, Object, PropertyKey, Root};
use serde::Serialize;
use std::path::Path;

/// Everything a stress run reports.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    /// Objects created
    pub objects: usize,
    /// Properties per object
    pub properties: usize,
    /// Objects still rooted when the final collection ran
    pub retained_objects: usize,
    /// Sum of every property value read back through the fast paths
    pub checksum: i64,
    /// Where accesses were answered
    pub access: AccessStatistics,
    /// Megamorphic cache counters
    pub megamorphic_cache: MegamorphicCacheStatistics,
    /// Collections run during the workload, including the final one
    pub collections: u64,
    /// The final collection
    pub final_collection: CollectionReport,
    /// Per size class occupancy after the final collection
    pub allocators: Vec<AllocatorStatistics>,
}

// Property access sites of the stress executable.
const READ_SITE: usize = 0;
const INHERITED_READ_SITE: usize = 1;
const WRITE_SITE: usize = 2;
const GLOBAL_SITE: usize = 0;

/// Main runtime that drives workloads against one VM
pub struct Runtime {
    vm: VM,
}

impl Runtime {
    /// Create a runtime with `config`
    ///
    /// # Example
    /// ```
    /// use interpreter::RuntimeConfig;
    /// use js_cli::Runtime;
    ///
    /// let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
    /// assert_eq!(runtime.config().cache.table_size, 1024);
    /// ```
    pub fn new(config: RuntimeConfig) -> CliResult<Self> {
        Ok(Self {
            vm: VM::with_config(config)?,
        })
    }

    /// Load the configuration at `path`, or the defaults without one
    pub fn load_config(path: Option<&Path>) -> CliResult<RuntimeConfig> {
        match path {
            Some(path) => Ok(RuntimeConfig::from_json_file(path)?),
            None => Ok(RuntimeConfig::default()),
        }
    }

    /// Create a runtime from an optional configuration file
    pub fn from_config_file(path: Option<&Path>) -> CliResult<Self> {
        Self::new(Self::load_config(path)?)
    }

    /// The effective configuration
    pub fn config(&self) -> &RuntimeConfig {
        self.vm.config()
    }

    /// The underlying VM
    pub fn vm(&self) -> &VM {
        &self.vm
    }

    fn stress_executable(&self, properties: u32) -> CliResult<Root<Executable>> {
        let mut builder = ExecutableBuilder::new("stress");
        builder.reserve_property_lookup_caches(3)?;
        builder.reserve_global_variable_caches(1)?;
        builder.reserve_object_shape_caches(properties)?;
        builder.add_identifier("objects")?;
        let heap = self.vm.heap();
        Ok(heap.root(builder.build(heap)?))
    }

    /// Creates `objects` objects with `properties` properties each, reads
    /// and writes them through cached access sites, drops a third of them
    /// and collects.
    ///
    /// Objects get their properties in one of `properties` rotated orders,
    /// so access sites see several shapes and the read site goes
    /// megamorphic once more than four orders are in use. Every other
    /// object inherits a `kind` property from a shared prototype.
    ///
    /// Both counts are stored as int32 values, so each must fit in one.
    pub fn run_stress(&mut self, objects: usize, properties: usize) -> CliResult<StressReport> {
        if properties == 0 {
            return Err(CliError::InvalidWorkload("properties must be at least 1".into()));
        }
        let object_count = workload_bound(objects, "objects")?;
        let property_count = workload_bound(properties, "properties")?;
        let code = self.stress_executable(property_count.unsigned_abs())?;
        let keys: Vec<PropertyKey> = (0..properties).map(|i| PropertyKey::from(format!("p{i}"))).collect();
        let values: Vec<Value> = (0..property_count).map(Value::from_i32).collect();
        let kind = PropertyKey::from("kind");
        let objects_key = PropertyKey::from(code.identifier(0));

        let prototype = self.vm.heap().root(self.vm.create_object()?);
        prototype.put(self.vm.heap(), kind.clone(), Value::from_i32(7))?;
        let global = self.vm.heap().root(self.vm.create_object()?);
        global.put(self.vm.heap(), objects_key.clone(), Value::from_i32(0))?;

        let mut live: Vec<Root<Object>> = Vec::with_capacity(objects);
        for i in 0..objects {
            let rotation = i % properties;
            let literal: Vec<(PropertyKey, Value)> = (0..properties)
                .map(|j| {
                    let index = (rotation + j) % properties;
                    (keys[index].clone(), values[index])
                })
                .collect();
            let object = self.vm.create_object_literal(&code, rotation, &literal)?;
            if i % 2 == 0 {
                object.set_prototype(self.vm.heap(), Some(prototype.gc_ref()))?;
            }
            live.push(object);
        }
        global.put(self.vm.heap(), objects_key.clone(), Value::from_i32(object_count))?;

        let mut checksum = 0i64;
        for object in &live {
            let value = self.vm.get_by_id(&code, READ_SITE, object.gc_ref(), &keys[0])?;
            checksum += i64::from(value.as_i32());
            self.vm.put_by_id(&code, WRITE_SITE, object.gc_ref(), &keys[0], Value::from_i32(1))?;
            let inherited = self.vm.get_by_id(&code, INHERITED_READ_SITE, object.gc_ref(), &kind)?;
            if inherited.is_int32() {
                checksum += i64::from(inherited.as_i32());
            }
        }
        for object in &live {
            let value = self.vm.get_by_id(&code, READ_SITE, object.gc_ref(), &keys[0])?;
            checksum += i64::from(value.as_i32());
        }
        if let Some(count) = self.vm.get_global(&code, GLOBAL_SITE, global.gc_ref(), &objects_key) {
            checksum += i64::from(count.as_i32());
        }

        let mut index = 0;
        live.retain(|_| {
            index += 1;
            index % 3 != 0
        });
        let retained_objects = live.len();
        let final_collection = self.vm.collect_garbage().ok_or(CliError::CollectionDeferred)?;
        log::debug!(
            "stress: {objects} objects, {retained_objects} retained, {} cells collected",
            final_collection.collected_cells
        );

        Ok(StressReport {
            objects,
            properties,
            retained_objects,
            checksum,
            access: self.vm.access_statistics(),
            megamorphic_cache: self.vm.megamorphic_cache().statistics(),
            collections: self.vm.heap().collection_count(),
            final_collection,
            allocators: self.vm.heap().allocator_statistics(),
        })
    }

    /// Builds a small object graph and returns the heap graph as JSON.
    pub fn dump_graph(&self) -> CliResult<serde_json::Value> {
        let heap = self.vm.heap();
        let prototype = heap.root(self.vm.create_object()?);
        prototype.put(heap, PropertyKey::from("kind"), Value::from_i32(1))?;
        let child = self.vm.create_object_with_prototype(prototype.gc_ref())?;
        child.put(heap, PropertyKey::from("parent"), prototype.gc_ref().to_value())?;
        child.put(heap, PropertyKey::from("x"), Value::from_i32(2))?;
        self.vm.collect_garbage().ok_or(CliError::CollectionDeferred)?;
        Ok(self.vm.heap().dump_graph())
    }
}

fn workload_bound(count: usize, what: &str) -> CliResult<i32> {
    i32::try_from(count).map_err(|_| CliError::InvalidWorkload(format!("{what} must be at most {}", i32::MAX)))
}
