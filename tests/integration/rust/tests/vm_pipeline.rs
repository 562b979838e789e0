//! Executables driven through the VM and the CLI runtime

use bytecode_system::{Executable, ExecutableBuilder};
use core_types::Value;
use interpreter::{RuntimeConfig, VM};
use js_cli::Runtime;
use memory_manager::{PropertyKey, Root};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn executable(vm: &VM, sites: u32) -> Root<Executable> {
    let mut builder = ExecutableBuilder::new("pipeline");
    builder.reserve_property_lookup_caches(sites).unwrap();
    builder.reserve_object_shape_caches(1).unwrap();
    vm.heap().root(builder.build(vm.heap()).unwrap())
}

/// Test: a site sees more shapes than it can hold and keeps answering
/// correctly through the megamorphic cache
#[test]
fn test_site_goes_megamorphic() {
    init_logging();
    let mut vm = VM::new();
    let code = executable(&vm, 1);
    let target = PropertyKey::from("target");

    let mut objects = Vec::new();
    for i in 0..8 {
        let object = vm.heap().root(vm.create_object().unwrap());
        object
            .put(vm.heap(), PropertyKey::from(format!("pad{i}")), Value::from_i32(0))
            .unwrap();
        object.put(vm.heap(), target.clone(), Value::from_i32(i)).unwrap();
        objects.push(object);
    }

    for _ in 0..3 {
        for (i, object) in objects.iter().enumerate() {
            let value = vm.get_by_id(&code, 0, object.gc_ref(), &target).unwrap();
            assert_eq!(value, Value::from_i32(i as i32));
        }
    }
    assert!(code.property_lookup_cache(0).borrow().is_megamorphic());
    let statistics = vm.access_statistics();
    assert!(statistics.megamorphic_hits > 0);
    assert!(vm.megamorphic_cache().statistics().get.hits > 0);
}

/// Test: an inherited read is cached until the prototype changes
#[test]
fn test_inherited_read_follows_prototype_changes() {
    init_logging();
    let mut vm = VM::new();
    let code = executable(&vm, 1);
    let kind = PropertyKey::from("kind");

    let prototype = vm.heap().root(vm.create_object().unwrap());
    prototype.put(vm.heap(), kind.clone(), Value::from_i32(1)).unwrap();
    let object = vm.create_object_with_prototype(prototype.gc_ref()).unwrap();

    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &kind).unwrap(), Value::from_i32(1));
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &kind).unwrap(), Value::from_i32(1));
    assert_eq!(vm.access_statistics().site_cache_hits, 1);

    // Adding a property replaces the prototype's shape.
    prototype.put(vm.heap(), PropertyKey::from("other"), Value::from_i32(0)).unwrap();
    prototype.put(vm.heap(), kind.clone(), Value::from_i32(2)).unwrap();
    assert_eq!(vm.get_by_id(&code, 0, object.gc_ref(), &kind).unwrap(), Value::from_i32(2));

    assert!(prototype.delete(vm.heap(), &kind).unwrap());
    assert!(vm.get_by_id(&code, 0, object.gc_ref(), &kind).unwrap().is_undefined());
}

/// Test: object literal sites reuse their shape across collections
#[test]
fn test_object_literal_site() {
    init_logging();
    let mut vm = VM::new();
    let code = executable(&vm, 1);
    let literal = [
        (PropertyKey::from("a"), Value::from_i32(1)),
        (PropertyKey::from("b"), Value::from_i32(2)),
    ];

    let first = vm.create_object_literal(&code, 0, &literal).unwrap();
    vm.collect_garbage().unwrap();
    let second = vm.create_object_literal(&code, 0, &literal).unwrap();
    assert!(memory_manager::GcRef::ptr_eq(first.shape(), second.shape()));
    assert_eq!(second.get(&PropertyKey::from("b")), Some(Value::from_i32(2)));
    assert_eq!(vm.access_statistics().site_cache_hits, 1);
}

/// Test: the CLI workload gives the same answers with and without
/// collection on every allocation
#[test]
fn test_cli_stress_under_collection_pressure() {
    init_logging();
    let mut relaxed = Runtime::new(RuntimeConfig::default()).unwrap();
    let mut config = RuntimeConfig::default();
    config.heap.collect_on_every_allocation = true;
    let mut stressed = Runtime::new(config).unwrap();

    let relaxed = relaxed.run_stress(40, 5).unwrap();
    let stressed = stressed.run_stress(40, 5).unwrap();
    assert_eq!(relaxed.checksum, stressed.checksum);
    assert_eq!(relaxed.retained_objects, stressed.retained_objects);
    assert!(stressed.collections > relaxed.collections);
}
