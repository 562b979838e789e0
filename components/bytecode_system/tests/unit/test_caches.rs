//! Per-site caches reached through an executable

use bytecode_system::{ExecutableBuilder, PropertyLookupCacheEntry};
use core_types::Value;
use memory_manager::{CollectionType, Heap, Object, PropertyKey, Shape, ShapeConfig};

#[test]
fn test_site_cache_hits_after_update() {
    let heap = Heap::new();
    let root = heap.root(Shape::create_root(&heap, ShapeConfig::default(), None).unwrap());
    let mut builder = ExecutableBuilder::new("site");
    let site = builder.reserve_property_lookup_caches(1).unwrap() as usize;
    let executable = heap.root(builder.build(&heap).unwrap());

    let object = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
    object.put(&heap, PropertyKey::from("x"), Value::from_i32(5)).unwrap();
    let shape = object.shape();
    let metadata = shape.lookup(&PropertyKey::from("x")).unwrap();

    assert!(executable.property_lookup_cache(site).borrow().lookup(shape).is_none());
    executable
        .property_lookup_cache(site)
        .borrow_mut()
        .update(PropertyLookupCacheEntry::own(shape, metadata));

    let hit = executable.property_lookup_cache(site).borrow().lookup(shape).unwrap();
    assert_eq!(hit.holder, None);
    assert_eq!(object.get_direct(hit.metadata.offset), Value::from_i32(5));
}

#[test]
fn test_prototype_entry_invalidated_by_prototype_change() {
    let heap = Heap::new();
    let root = heap.root(Shape::create_root(&heap, ShapeConfig::default(), None).unwrap());
    let prototype = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
    prototype.put(&heap, PropertyKey::from("method"), Value::from_i32(1)).unwrap();
    let receiver = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
    receiver.set_prototype(&heap, Some(prototype.gc_ref())).unwrap();

    let shape = receiver.shape();
    let validity = shape.ensure_prototype_chain_validity(&heap).unwrap();
    let metadata = prototype.own_property_metadata(&PropertyKey::from("method")).unwrap();
    let mut builder = ExecutableBuilder::new("proto");
    builder.reserve_property_lookup_caches(1).unwrap();
    let executable = heap.root(builder.build(&heap).unwrap());
    executable
        .property_lookup_cache(0)
        .borrow_mut()
        .update(PropertyLookupCacheEntry::inherited(shape, prototype.gc_ref(), validity, metadata));
    assert!(executable.property_lookup_cache(0).borrow().lookup(shape).is_some());

    prototype.put(&heap, PropertyKey::from("other"), Value::from_i32(2)).unwrap();
    assert!(executable.property_lookup_cache(0).borrow().lookup(shape).is_none());
}

#[test]
fn test_caches_do_not_keep_shapes_alive() {
    let heap = Heap::new();
    let mut builder = ExecutableBuilder::new("weak");
    builder.reserve_property_lookup_caches(1).unwrap();
    builder.reserve_object_shape_caches(1).unwrap();
    let executable = heap.root(builder.build(&heap).unwrap());

    let root = Shape::create_root(&heap, ShapeConfig::default(), None).unwrap();
    let shape = root
        .create_put_transition(&heap, PropertyKey::from("x"), Default::default())
        .unwrap();
    let metadata = shape.lookup(&PropertyKey::from("x")).unwrap();
    executable
        .property_lookup_cache(0)
        .borrow_mut()
        .update(PropertyLookupCacheEntry::own(shape, metadata));
    let mut shape_cache = executable.object_shape_cache(0).get();
    shape_cache.set(shape);
    executable.object_shape_cache(0).set(shape_cache);
    let weak = shape.downgrade();

    heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    assert!(!weak.is_alive());
    assert!(executable.object_shape_cache(0).get().get().is_none());
}
