//! Collector behavior across component boundaries
//!
//! Executables, caches and the VM each hold heap references with different
//! strength; these tests check what a collection keeps.

use bytecode_system::{ExecutableBuilder, OperandKind};
use core_types::Value;
use interpreter::{CacheConfig, MegamorphicCache, RuntimeConfig, VM};
use memory_manager::{CollectionType, GcRef, HeapConfig, Object, PropertyKey};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn vm_with_marking_threads(threads: usize) -> VM {
    let config = RuntimeConfig {
        heap: HeapConfig {
            marking_threads: threads,
            ..HeapConfig::default()
        },
        ..RuntimeConfig::default()
    };
    VM::with_config(config).unwrap()
}

/// Test: constants and template objects are strong; shape caches are weak
#[test]
fn test_executable_references() {
    init_logging();
    let vm = VM::new();
    let heap = vm.heap();

    let constant = vm.create_object().unwrap();
    let constant_weak = constant.downgrade();
    let mut builder = ExecutableBuilder::new("references");
    let operand = builder.add_constant(constant.to_value()).unwrap();
    builder.reserve_object_shape_caches(1).unwrap();
    builder.reserve_template_object_caches(1).unwrap();
    let executable = heap.root(builder.build(heap).unwrap());
    assert_eq!(executable.classify_operand(operand), OperandKind::Constant(0));

    let template = vm.create_object().unwrap();
    let template_weak = template.downgrade();
    let mut cache = executable.template_object_cache(0).get();
    cache.set(template);
    executable.template_object_cache(0).set(cache);

    let scratch = vm.create_object().unwrap();
    scratch.put(heap, PropertyKey::from("only_here"), Value::from_i32(1)).unwrap();
    let shape_weak = scratch.shape().downgrade();
    let mut cache = executable.object_shape_cache(0).get();
    cache.set(scratch.shape());
    executable.object_shape_cache(0).set(cache);

    vm.collect_garbage().unwrap();
    assert!(constant_weak.is_alive());
    assert!(template_weak.is_alive());
    assert!(!shape_weak.is_alive());
    assert!(executable.object_shape_cache(0).get().get().is_none());

    drop(executable);
    vm.collect_garbage().unwrap();
    assert!(!constant_weak.is_alive());
    assert!(!template_weak.is_alive());
}

/// Test: megamorphic entries die with their shapes
#[test]
fn test_megamorphic_entries_do_not_retain_shapes() {
    init_logging();
    let vm = VM::new();
    let heap = vm.heap();
    let mut cache = MegamorphicCache::new(CacheConfig::default());
    let x = PropertyKey::from("x");

    let kept = heap.root(vm.create_object().unwrap());
    kept.put(heap, x.clone(), Value::from_i32(1)).unwrap();
    cache.insert_get(x.clone(), kept.shape(), kept.own_property_metadata(&x).unwrap());

    let dropped = vm.create_object().unwrap();
    let y = PropertyKey::from("y");
    dropped.put(heap, y.clone(), Value::from_i32(2)).unwrap();
    cache.insert_get(y.clone(), dropped.shape(), dropped.own_property_metadata(&y).unwrap());
    assert_eq!(cache.live_entry_count(), 2);

    vm.collect_garbage().unwrap();
    assert_eq!(cache.live_entry_count(), 1);
    assert!(cache.lookup_get(&x, kept.shape()).is_some());
}

/// Test: parallel marking keeps exactly what serial marking keeps
#[test]
fn test_parallel_marking_matches_serial() {
    init_logging();
    let mut live_counts = Vec::new();
    for threads in [1, 4] {
        let vm = vm_with_marking_threads(threads);
        let heap = vm.heap();
        let next = PropertyKey::from("next");

        let head = heap.root(vm.create_object().unwrap());
        let mut tail: GcRef<Object> = head.gc_ref();
        for i in 0..300 {
            let node = vm.create_object().unwrap();
            node.put(heap, PropertyKey::from("index"), Value::from_i32(i)).unwrap();
            tail.put(heap, next.clone(), node.to_value()).unwrap();
            tail = node;
            // Unreachable siblings.
            vm.create_object().unwrap();
        }

        let report = heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
        assert_eq!(report.marked_per_worker.len(), threads);
        live_counts.push(report.live_cells);

        let mut length = 0;
        let mut current = head.gc_ref();
        while let Some(value) = current.get(&next) {
            current = GcRef::<Object>::from_value(value).unwrap();
            length += 1;
        }
        assert_eq!(length, 300, "threads = {threads}");
    }
    assert_eq!(live_counts[0], live_counts[1]);
}

/// Test: a deferred collection runs when the scope ends
#[test]
fn test_deferred_collection_runs_at_scope_end() {
    init_logging();
    let vm = VM::new();
    let heap = vm.heap();
    let collections = heap.collection_count();
    let orphan = {
        let _defer = heap.defer_gc();
        let orphan = vm.create_object().unwrap().downgrade();
        assert!(vm.collect_garbage().is_none());
        assert!(orphan.is_alive());
        orphan
    };
    assert_eq!(heap.collection_count(), collections + 1);
    assert!(!orphan.is_alive());
}
