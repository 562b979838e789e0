//! Contract tests for interpreter API
//!
//! These tests verify the surface the bytecode dispatcher relies on.

use bytecode_system::ExecutableBuilder;
use core_types::Value;
use interpreter::{CacheConfig, MegamorphicCache, VM};
use memory_manager::{Heap, PropertyAttributes, PropertyKey, Shape, ShapeConfig};

/// Inline cache exposes lookup_get / lookup_put / insert_get / insert_put
/// keyed by (property key, shape).
#[test]
fn contract_megamorphic_cache_interface() {
    let heap = Heap::new();
    let _defer = heap.defer_gc();
    let shape = Shape::create_root(&heap, ShapeConfig::default(), None)
        .unwrap()
        .create_put_transition(&heap, PropertyKey::from("x"), PropertyAttributes::DEFAULT)
        .unwrap();
    let metadata = shape.lookup(&PropertyKey::from("x")).unwrap();
    let mut cache = MegamorphicCache::new(CacheConfig::default());
    cache.insert_get(PropertyKey::from("x"), shape, metadata);
    cache.insert_put(PropertyKey::from("x"), shape, metadata);
    assert_eq!(cache.lookup_get(&PropertyKey::from("x"), shape), Some(metadata));
    assert_eq!(cache.lookup_put(&PropertyKey::from("x"), shape), Some(metadata));
}

/// Missing properties read as undefined; missing globals as None.
#[test]
fn contract_missing_properties() {
    let mut vm = VM::new();
    let mut builder = ExecutableBuilder::new("missing");
    builder.reserve_property_lookup_caches(1).unwrap();
    builder.reserve_global_variable_caches(1).unwrap();
    let code = vm.heap().root(builder.build(vm.heap()).unwrap());
    let object = vm.heap().root(vm.create_object().unwrap());

    assert_eq!(
        vm.get_by_id(&code, 0, object.gc_ref(), &PropertyKey::from("nope")).unwrap(),
        Value::undefined()
    );
    assert_eq!(vm.get_global(&code, 0, object.gc_ref(), &PropertyKey::from("nope")), None);
}

/// Every access resolves to the same value the object reports directly.
#[test]
fn contract_fast_paths_agree_with_object_get() {
    let mut vm = VM::new();
    let mut builder = ExecutableBuilder::new("agree");
    builder.reserve_property_lookup_caches(1).unwrap();
    let code = vm.heap().root(builder.build(vm.heap()).unwrap());
    let names = ["a", "b", "c", "d", "e", "f"];
    let objects: Vec<_> = (0..names.len())
        .map(|i| {
            let object = vm.heap().root(vm.create_object().unwrap());
            for filler in &names[..i] {
                object.put(vm.heap(), PropertyKey::from(*filler), Value::null()).unwrap();
            }
            object.put(vm.heap(), PropertyKey::from("v"), Value::from_i32(i as i32)).unwrap();
            object
        })
        .collect();

    for _ in 0..3 {
        for object in &objects {
            let key = PropertyKey::from("v");
            assert_eq!(Some(vm.get_by_id(&code, 0, object.gc_ref(), &key).unwrap()), object.get(&key));
        }
    }
}
