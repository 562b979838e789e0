//! Integration tests for interpreter
//!
//! Tests interaction between VM, executables, caches and the collector

use bytecode_system::ExecutableBuilder;
use core_types::Value;
use interpreter::{RuntimeConfig, VM};
use memory_manager::{Object, PropertyKey, Shape};

fn key(name: &str) -> PropertyKey {
    PropertyKey::from(name)
}

#[test]
fn test_cached_access_survives_collection() {
    let mut vm = VM::new();
    let mut builder = ExecutableBuilder::new("gc");
    builder.reserve_property_lookup_caches(1).unwrap();
    let code = vm.heap().root(builder.build(vm.heap()).unwrap());
    let object = vm.heap().root(vm.create_object().unwrap());
    object.put(vm.heap(), key("x"), Value::from_i32(9)).unwrap();

    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("x")).unwrap(), Value::from_i32(9));
    vm.collect_garbage().unwrap();
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("x")).unwrap(), Value::from_i32(9));
    assert_eq!(vm.access_statistics().site_cache_hits, 1);
}

#[test]
fn test_dead_shapes_stop_matching_after_collection() {
    let mut vm = VM::new();
    let mut builder = ExecutableBuilder::new("weak");
    builder.reserve_property_lookup_caches(1).unwrap();
    let code = vm.heap().root(builder.build(vm.heap()).unwrap());

    {
        let temporary = vm.heap().root(vm.create_object().unwrap());
        temporary.put(vm.heap(), key("t"), Value::from_i32(1)).unwrap();
        vm.get_by_id(&code, 0, temporary.gc_ref(), &key("t")).unwrap();
    }
    vm.collect_garbage().unwrap();
    assert_eq!(code.property_lookup_cache(0).borrow().lookup(vm.empty_shape()), None);

    let object = vm.heap().root(vm.create_object().unwrap());
    object.put(vm.heap(), key("u"), Value::from_i32(2)).unwrap();
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("u")).unwrap(), Value::from_i32(2));
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("u")).unwrap(), Value::from_i32(2));
    assert_eq!(vm.access_statistics().site_cache_hits, 1);
}

#[test]
fn test_stress_collection_keeps_rooted_objects() {
    let mut config = RuntimeConfig::default();
    config.heap.collect_on_every_allocation = true;
    let mut vm = VM::with_config(config).unwrap();
    let mut builder = ExecutableBuilder::new("stress");
    builder.reserve_property_lookup_caches(2).unwrap();
    let code = vm.heap().root(builder.build(vm.heap()).unwrap());

    let objects: Vec<_> = (0..16)
        .map(|i| {
            let object = vm.heap().root(vm.create_object().unwrap());
            object.put(vm.heap(), key("id"), Value::from_i32(i)).unwrap();
            object
        })
        .collect();
    for (i, object) in objects.iter().enumerate() {
        assert!(vm
            .put_by_id(&code, 1, object.gc_ref(), &key("seen"), Value::from_bool(true))
            .unwrap());
        assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("id")).unwrap(), Value::from_i32(i as i32));
    }
    assert!(vm.heap().collection_count() > 16);
}

#[test]
fn test_shadowing_on_plain_prototype_invalidates_inherited_hit() {
    let mut vm = VM::new();
    let mut builder = ExecutableBuilder::new("shadow");
    builder.reserve_property_lookup_caches(1).unwrap();
    let code = vm.heap().root(builder.build(vm.heap()).unwrap());

    let grandparent = vm.heap().root(vm.create_object().unwrap());
    grandparent.put(vm.heap(), key("k"), Value::from_i32(2)).unwrap();
    let parent = vm.heap().root(vm.create_object().unwrap());
    parent.set_prototype(vm.heap(), Some(grandparent.gc_ref())).unwrap();

    // A root shape built directly on `parent` must make it a prototype.
    let shape = vm.heap().root(Shape::create_root(vm.heap(), vm.config().shapes, Some(parent.gc_ref())).unwrap());
    assert!(parent.shape().is_prototype_shape());
    let object = vm.heap().root(Object::create(vm.heap(), shape.gc_ref()).unwrap());

    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("k")).unwrap(), Value::from_i32(2));
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("k")).unwrap(), Value::from_i32(2));
    assert_eq!(vm.access_statistics().site_cache_hits, 1);

    parent.put(vm.heap(), key("k"), Value::from_i32(5)).unwrap();
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &key("k")).unwrap(), Value::from_i32(5));
}
