//! Unit tests for interpreter components

use bytecode_system::ExecutableBuilder;
use core_types::Value;
use interpreter::{CacheConfig, MegamorphicCache, RuntimeConfig, VM};
use memory_manager::{Heap, PropertyAttributes, PropertyKey, Shape, ShapeConfig};

fn key(name: &str) -> PropertyKey {
    PropertyKey::from(name)
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_runtime_config_sections_are_independent() {
    let config = RuntimeConfig::from_json_str(
        r#"{
            "heap": { "collect_on_every_allocation": true },
            "shapes": { "dictionary_depth_threshold": 8 },
            "cache": { "max_probe": 2 }
        }"#,
    )
    .unwrap();
    assert!(config.heap.collect_on_every_allocation);
    assert_eq!(config.heap.marking_threads, 1);
    assert_eq!(config.shapes.dictionary_depth_threshold, 8);
    assert_eq!(config.shapes.dictionary_fanout_threshold, 64);
    assert_eq!(config.cache.max_probe, 2);
    assert_eq!(config.cache.table_size, 1024);
}

#[test]
fn test_vm_uses_configured_shape_thresholds() {
    let mut config = RuntimeConfig::default();
    config.shapes.dictionary_depth_threshold = 3;
    let vm = VM::with_config(config).unwrap();
    let object = vm.heap().root(vm.create_object().unwrap());
    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        object.put(vm.heap(), key(name), Value::from_i32(i as i32)).unwrap();
    }
    assert!(object.shape().is_dictionary());
    assert_eq!(object.get(&key("d")), Some(Value::from_i32(3)));
}

// ============================================================================
// Megamorphic Cache Tests
// ============================================================================

#[test]
fn test_megamorphic_cache_statistics() {
    let heap = Heap::new();
    let _defer = heap.defer_gc();
    let shape = Shape::create_root(&heap, ShapeConfig::default(), None)
        .unwrap()
        .create_put_transition(&heap, key("x"), PropertyAttributes::DEFAULT)
        .unwrap();
    let x = shape.lookup(&key("x")).unwrap();
    let mut cache = MegamorphicCache::new(CacheConfig::default());

    assert!(cache.lookup_get(&key("x"), shape).is_none());
    cache.insert_get(key("x"), shape, x);
    assert!(cache.lookup_get(&key("x"), shape).is_some());
    assert!(cache.lookup_put(&key("x"), shape).is_none());

    let statistics = cache.statistics();
    assert_eq!((statistics.get.hits, statistics.get.misses), (1, 1));
    assert_eq!((statistics.put.hits, statistics.put.misses), (0, 1));
}

// ============================================================================
// VM Tests
// ============================================================================

#[test]
fn test_vm_get_by_id_on_dictionary_object() {
    let mut config = RuntimeConfig::default();
    config.shapes.dictionary_depth_threshold = 1;
    let mut vm = VM::with_config(config).unwrap();
    let mut builder = ExecutableBuilder::new("dictionary");
    builder.reserve_property_lookup_caches(1).unwrap();
    let code = vm.heap().root(builder.build(vm.heap()).unwrap());

    let object = vm.heap().root(vm.create_object().unwrap());
    object.put(vm.heap(), key("a"), Value::from_i32(1)).unwrap();
    object.put(vm.heap(), key("b"), Value::from_i32(2)).unwrap();
    assert!(object.shape().is_cacheable_dictionary());

    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("b")).unwrap(), Value::from_i32(2));
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("b")).unwrap(), Value::from_i32(2));
    assert_eq!(vm.access_statistics().site_cache_hits, 1);

    // In-place mutation bumps the generation; the cached entry must not be used.
    object.put(vm.heap(), key("c"), Value::from_i32(3)).unwrap();
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("b")).unwrap(), Value::from_i32(2));
    assert_eq!(vm.access_statistics().site_cache_hits, 1);

    // Delete makes the dictionary uncacheable and shifts later offsets.
    object.delete(vm.heap(), &key("a")).unwrap();
    assert!(object.shape().is_uncacheable_dictionary());
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("c")).unwrap(), Value::from_i32(3));
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("c")).unwrap(), Value::from_i32(3));
    assert_eq!(vm.access_statistics().site_cache_hits, 1);
}
