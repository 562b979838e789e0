//! Shape transitions seen from outside the crate

use core_types::Value;
use memory_manager::{
    CollectionType, Heap, Object, PropertyAttributes, PropertyKey, Shape, ShapeConfig, TransitionType,
};

/// Replaying the same mutations from the same root converges on one shape.
#[test]
fn test_identical_histories_share_shapes() {
    let heap = Heap::new();
    let root = heap.root(Shape::create_root(&heap, ShapeConfig::default(), None).unwrap());
    let objects: Vec<_> = (0..10)
        .map(|_| heap.root(Object::create(&heap, root.gc_ref()).unwrap()))
        .collect();
    for object in &objects {
        for name in ["a", "b", "c"] {
            object.put(&heap, PropertyKey::from(name), Value::from_i32(1)).unwrap();
        }
        object.delete(&heap, &PropertyKey::from("b")).unwrap();
    }
    let shape = objects[0].shape();
    assert!(objects.iter().all(|object| object.shape() == shape));
    assert_eq!(shape.transition_type(), TransitionType::Delete);
    assert_eq!(shape.property_keys(), vec![PropertyKey::from("a"), PropertyKey::from("c")]);
}

/// Shape chains survive collection while an object uses them.
#[test]
fn test_shape_chain_survives_collection() {
    let heap = Heap::new();
    let root = Shape::create_root(&heap, ShapeConfig::default(), None).unwrap();
    let object = heap.root(Object::create(&heap, root).unwrap());
    for i in 0..20 {
        object.put(&heap, PropertyKey::Index(i), Value::from_i32(i as i32)).unwrap();
    }
    heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    for i in 0..20 {
        let metadata = object.shape().lookup(&PropertyKey::Index(i)).unwrap();
        assert_eq!(metadata.offset, i);
        assert_eq!(metadata.attributes, PropertyAttributes::DEFAULT);
    }
}

/// A wide fan-out sends later objects into dictionary mode.
#[test]
fn test_fanout_promotes_to_dictionary() {
    let heap = Heap::new();
    let config = ShapeConfig {
        dictionary_fanout_threshold: 4,
        ..ShapeConfig::default()
    };
    let root = heap.root(Shape::create_root(&heap, config, None).unwrap());
    let objects: Vec<_> = (0..6)
        .map(|i| {
            let object = heap.root(Object::create(&heap, root.gc_ref()).unwrap());
            object
                .put(&heap, PropertyKey::from(format!("p{i}")), Value::from_i32(i))
                .unwrap();
            object
        })
        .collect();
    assert!(objects[..4].iter().all(|object| !object.shape().is_dictionary()));
    assert!(objects[4..].iter().all(|object| object.shape().is_cacheable_dictionary()));
    assert_eq!(objects[5].get(&PropertyKey::from("p5")), Some(Value::from_i32(5)));
}
