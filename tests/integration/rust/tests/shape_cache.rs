//! Shape transitions and the megamorphic cache
//!
//! Walks objects through transitions, dictionary mode and deletes, and
//! checks which cached lookups stay valid.

use core_types::Value;
use interpreter::{CacheConfig, MegamorphicCache};
use memory_manager::{GcRef, Heap, Object, PropertyAttributes, PropertyKey, Shape, ShapeConfig};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test: cached entries survive transitions of other objects and miss on
/// the shape a delete produces
#[test]
fn test_transition_chain_and_delete() {
    init_logging();
    let heap = Heap::new();
    let x = PropertyKey::from("x");
    let y = PropertyKey::from("y");

    let root = heap.root(Shape::create_root(&heap, ShapeConfig::default(), None).unwrap());
    let s1 = heap.root(root.gc_ref().create_put_transition(&heap, x.clone(), PropertyAttributes::DEFAULT).unwrap());
    let again = root.gc_ref().create_put_transition(&heap, x.clone(), PropertyAttributes::DEFAULT).unwrap();
    assert!(GcRef::ptr_eq(again, s1.gc_ref()), "identical transitions share a shape");

    let s2 = heap.root(s1.gc_ref().create_put_transition(&heap, y.clone(), PropertyAttributes::DEFAULT).unwrap());
    assert_eq!(s2.property_count(), 2);
    assert_eq!(s2.lookup(&x).unwrap().offset, 0);
    assert_eq!(s2.lookup(&y).unwrap().offset, 1);

    let object = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
    object.put(&heap, x.clone(), Value::from_i32(1)).unwrap();
    object.put(&heap, y.clone(), Value::from_i32(2)).unwrap();
    assert!(GcRef::ptr_eq(object.shape(), s2.gc_ref()));

    let mut cache = MegamorphicCache::new(CacheConfig::default());
    cache.insert_get(x.clone(), s2.gc_ref(), s2.lookup(&x).unwrap());

    assert!(object.delete(&heap, &x).unwrap());
    let s3 = object.shape();
    assert!(!GcRef::ptr_eq(s3, s2.gc_ref()));
    assert!(s3.lookup(&x).is_none());
    assert_eq!(object.get(&y), Some(Value::from_i32(2)));

    assert_eq!(cache.lookup_get(&x, s2.gc_ref()).map(|metadata| metadata.offset), Some(0));
    assert!(cache.lookup_get(&x, s3).is_none());
}

/// Test: in-place dictionary edits invalidate cached entries
#[test]
fn test_dictionary_generation_invalidates_cache() {
    init_logging();
    let heap = Heap::new();
    let x = PropertyKey::from("x");

    let root = heap.root(Shape::create_root(&heap, ShapeConfig::default(), None).unwrap());
    let object = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
    object.put(&heap, x.clone(), Value::from_i32(5)).unwrap();

    let dictionary = object.shape().create_cacheable_dictionary_transition(&heap).unwrap();
    object.set_shape(&heap, dictionary).unwrap();
    assert!(object.shape().is_cacheable_dictionary());

    let mut cache = MegamorphicCache::new(CacheConfig::default());
    let metadata = dictionary.lookup(&x).unwrap();
    cache.insert_get(x.clone(), dictionary, metadata);
    assert!(cache.lookup_get(&x, dictionary).is_some());

    let generation = dictionary.dictionary_generation();
    object.put(&heap, PropertyKey::from("z"), Value::from_i32(6)).unwrap();
    assert!(GcRef::ptr_eq(object.shape(), dictionary), "dictionaries change in place");
    assert!(dictionary.dictionary_generation() > generation);
    assert!(cache.lookup_get(&x, dictionary).is_none());

    // The first delete makes the dictionary uncacheable.
    assert!(object.delete(&heap, &x).unwrap());
    let uncacheable = object.shape();
    assert!(uncacheable.is_uncacheable_dictionary());
    let z = PropertyKey::from("z");
    cache.insert_get(z.clone(), uncacheable, uncacheable.lookup(&z).unwrap());
    assert!(cache.lookup_get(&z, uncacheable).is_none());
    assert_eq!(object.get(&z), Some(Value::from_i32(6)));
}

/// Test: an object with many properties falls back to dictionary mode
#[test]
fn test_deep_objects_become_dictionaries() {
    init_logging();
    let heap = Heap::new();
    let config = ShapeConfig::default();
    let root = heap.root(Shape::create_root(&heap, config, None).unwrap());
    let object = heap.root(Object::create(&heap, root.gc_ref()).unwrap());

    for i in 0..=config.dictionary_depth_threshold {
        object.put(&heap, PropertyKey::from(format!("p{i}")), Value::from_i32(i as i32)).unwrap();
    }
    assert!(object.shape().is_dictionary());
    for i in 0..=config.dictionary_depth_threshold {
        assert_eq!(
            object.get(&PropertyKey::from(format!("p{i}"))),
            Some(Value::from_i32(i as i32))
        );
    }
}

/// Test: replacing a prototype's shape invalidates chains cached through it
#[test]
fn test_prototype_change_invalidates_validity() {
    init_logging();
    let heap = Heap::new();
    let root = heap.root(Shape::create_root(&heap, ShapeConfig::default(), None).unwrap());
    let prototype = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
    prototype.put(&heap, PropertyKey::from("kind"), Value::from_i32(1)).unwrap();

    let child = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
    child.set_prototype(&heap, Some(prototype.gc_ref())).unwrap();
    assert!(prototype.shape().is_prototype_shape());

    let validity = heap.root(child.shape().ensure_prototype_chain_validity(&heap).unwrap());
    assert!(validity.is_valid());
    let same = child.shape().ensure_prototype_chain_validity(&heap).unwrap();
    assert!(GcRef::ptr_eq(same, validity.gc_ref()));

    prototype.put(&heap, PropertyKey::from("extra"), Value::from_i32(2)).unwrap();
    assert!(!validity.is_valid());
    let fresh = child.shape().ensure_prototype_chain_validity(&heap).unwrap();
    assert!(!GcRef::ptr_eq(fresh, validity.gc_ref()));
    assert!(fresh.is_valid());
}
