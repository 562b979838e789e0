//! Collection cycles driven through the public heap API

use core_types::Value;
use memory_manager::{
    Cell, CellState, CollectionType, GcRef, Heap, HeapConfig, HeapRootKind, Object, PropertyKey, Shape,
    ShapeConfig, Visitor,
};
use std::cell::Cell as Mutable;
use std::rc::Rc;

struct ListNode {
    next: Mutable<Option<GcRef<ListNode>>>,
}

impl Cell for ListNode {
    fn class_name(&self) -> &'static str {
        "ListNode"
    }

    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit_option(self.next.get());
    }
}

fn node() -> ListNode {
    ListNode {
        next: Mutable::new(None),
    }
}

/// Only the reachable prefix of a list survives once the link is cut.
#[test]
fn test_cutting_a_list_frees_the_tail() {
    let heap = Heap::new();
    let head = heap.root(heap.allocate(node()).unwrap());
    let mut tail = head.gc_ref();
    let mut middle = None;
    for i in 0..100 {
        let next = heap.allocate(node()).unwrap();
        tail.next.set(Some(next));
        tail = next;
        if i == 49 {
            middle = Some(next);
        }
    }
    let report = heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    assert_eq!(report.live_cells, 101);

    middle.unwrap().next.set(None);
    let report = heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    assert_eq!(report.collected_cells, 50);
    assert_eq!(report.live_cells, 51);
}

/// Objects stored in other objects' properties are traced.
#[test]
fn test_object_graph_tracing() {
    let heap = Heap::new();
    let root_shape = heap.root(Shape::create_root(&heap, ShapeConfig::default(), None).unwrap());
    let outer = heap.root(Object::create(&heap, root_shape.gc_ref()).unwrap());
    let inner = Object::create(&heap, root_shape.gc_ref()).unwrap();
    inner.put(&heap, PropertyKey::from("n"), Value::from_i32(42)).unwrap();
    outer.put(&heap, PropertyKey::from("inner"), inner.to_value()).unwrap();

    heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    let reached = outer.get(&PropertyKey::from("inner")).unwrap();
    let inner = GcRef::<Object>::from_value(reached).unwrap();
    assert_eq!(inner.get(&PropertyKey::from("n")), Some(Value::from_i32(42)));
}

/// A collection triggered by an allocation keeps the cells the new value
/// points at.
#[test]
fn test_pending_allocation_edges_are_roots() {
    let heap = Heap::with_config(HeapConfig {
        collect_on_every_allocation: true,
        ..HeapConfig::default()
    })
    .unwrap();
    let first = heap.allocate(node()).unwrap();
    let second = node();
    second.next.set(Some(first));
    let second = heap.root(heap.allocate(second).unwrap());
    assert_eq!(first.cell().state(), CellState::Live);
    assert_eq!(second.next.get(), Some(first));
}

/// Graph dumps name roots by kind.
#[test]
fn test_dump_graph_root_kinds() {
    let heap = Heap::new();
    let rooted = heap.root(heap.allocate(node()).unwrap());
    let scanned = heap.allocate(node()).unwrap();
    let words = heap.conservative_vector();
    words.push_value(scanned.to_value());

    let graph = heap.dump_graph();
    let kind = |address: usize| graph[format!("{address:#x}")]["root"].clone();
    assert_eq!(kind(rooted.gc_ref().address()), format!("{:?}", HeapRootKind::Root));
    assert_eq!(kind(scanned.address()), format!("{:?}", HeapRootKind::Conservative));
    assert_eq!(graph.as_object().unwrap().len(), 2);
}

/// Deferral holds collections back, including allocation-triggered ones.
#[test]
fn test_defer_gc_blocks_allocation_triggered_collection() {
    let heap = Heap::with_config(HeapConfig {
        collect_on_every_allocation: true,
        ..HeapConfig::default()
    })
    .unwrap();
    {
        let _defer = heap.defer_gc();
        let a = heap.allocate(node()).unwrap();
        let b = heap.allocate(node()).unwrap();
        a.next.set(Some(b));
        assert_eq!(heap.collection_count(), 0);
        assert!(heap.is_gc_deferred());
    }
    assert_eq!(heap.collection_count(), 1);
    assert_eq!(heap.live_cell_count(), 0);
}

/// Post-collection tasks run after the sweep and may allocate.
#[test]
fn test_post_gc_task_may_allocate() {
    let heap = Rc::new(Heap::new());
    let allocated = Rc::new(Mutable::new(false));
    let task_heap = Rc::downgrade(&heap);
    let flag = Rc::clone(&allocated);
    heap.enqueue_post_gc_task(move || {
        if let Some(heap) = task_heap.upgrade() {
            flag.set(heap.allocate(node()).is_ok());
        }
    });
    heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    assert!(allocated.get());
    assert_eq!(heap.live_cell_count(), 1);
}

/// The threshold follows the live heap and never drops below the minimum.
#[test]
fn test_threshold_tracks_live_bytes() {
    let minimum = 1024;
    let heap = Heap::with_config(HeapConfig {
        gc_min_bytes_threshold: minimum,
        ..HeapConfig::default()
    })
    .unwrap();
    let roots: Vec<_> = (0..200).map(|_| heap.root(heap.allocate(node()).unwrap())).collect();
    let report = heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    assert_eq!(report.next_threshold, report.live_bytes.max(minimum));
    assert!(report.next_threshold > minimum);
    drop(roots);
    let report = heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
    assert_eq!(report.next_threshold, minimum);
}
