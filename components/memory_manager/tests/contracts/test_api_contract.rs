//! These pin down the surface the bytecode system and interpreter use.

use core_types::RuntimeError;
use memory_manager::{
    Cell, CellState, CollectionType, GcPhase, Heap, HeapConfig, Object, PropertyKey, PrototypeChainValidity,
    Shape, ShapeConfig, Weak,
};

/// Heap exposes allocate / deallocate / is_valid_cell_pointer / for_each_cell_in_state.
#[test]
fn contract_heap_interface() {
    let heap = Heap::new();
    let validity = heap.allocate(PrototypeChainValidity::new()).unwrap();
    assert!(heap.is_valid_cell_pointer(validity.address()));
    let mut seen = 0;
    heap.for_each_cell_in_state(CellState::Live, |_| seen += 1);
    assert_eq!(seen, 1);
    unsafe { heap.deallocate(validity.cell()) };
    assert_eq!(heap.live_cell_count(), 0);
}

/// A fresh heap is idle and reports a collection.
#[test]
fn contract_collect_garbage_reports() {
    let heap = Heap::new();
    assert_eq!(heap.phase(), GcPhase::Idle);
    let report = heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    assert_eq!(report.live_cells, 0);
    assert_eq!(heap.collection_count(), 1);
}

/// Invalid configuration is rejected with InvalidConfig.
#[test]
fn contract_invalid_heap_config() {
    let result = Heap::with_config(HeapConfig {
        size_classes: vec![],
        ..HeapConfig::default()
    });
    assert!(matches!(result, Err(RuntimeError::InvalidConfig(_))));
}

/// Shape exposes lookup and the four transition constructors.
#[test]
fn contract_shape_transitions() {
    let heap = Heap::new();
    let _defer = heap.defer_gc();
    let root = Shape::create_root(&heap, ShapeConfig::default(), None).unwrap();
    let key = PropertyKey::from("x");
    let put = root
        .create_put_transition(&heap, key.clone(), Default::default())
        .unwrap();
    let configure = put
        .create_configure_transition(&heap, key.clone(), memory_manager::PropertyAttributes::ENUMERABLE)
        .unwrap();
    let delete = configure.create_delete_transition(&heap, key.clone()).unwrap();
    let prototype = Object::create(&heap, root).unwrap();
    let reparented = delete.create_prototype_transition(&heap, Some(prototype)).unwrap();
    let dictionary = reparented.create_cacheable_dictionary_transition(&heap).unwrap();
    assert!(put.lookup(&key).is_some());
    assert!(delete.lookup(&key).is_none());
    assert_eq!(reparented.prototype(), Some(prototype));
    assert!(prototype.shape().is_prototype_shape());
    assert!(dictionary.is_dictionary());
}

/// Weak references are Copy and report death.
#[test]
fn contract_weak_references() {
    fn assert_copy<T: Copy>() {}
    assert_copy::<Weak<Shape>>();
    let heap = Heap::new();
    let weak = heap.allocate(PrototypeChainValidity::new()).unwrap().downgrade();
    heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    assert!(weak.upgrade().is_none());
}

/// Cell types name themselves.
#[test]
fn contract_cell_class_names() {
    assert_eq!(PrototypeChainValidity::new().class_name(), "PrototypeChainValidity");
}
