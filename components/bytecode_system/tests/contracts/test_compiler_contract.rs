//! These pin down what the compiler may rely on when handing over an
//! executable, and what the interpreter may rely on when reading one.

use bytecode_system::{ExecutableBuilder, Operand, MAX_OPERAND_INDEX};
use core_types::RuntimeError;
use memory_manager::Heap;

/// Unknown offsets never resolve to a neighbouring range.
#[test]
fn contract_uncovered_offsets_return_none() {
    let heap = Heap::new();
    let mut builder = ExecutableBuilder::new("gaps");
    builder.set_bytecode(vec![0; 30]);
    builder.add_exception_handler(10, 20, Some(25), None);
    let executable = builder.build(&heap).unwrap();
    for offset in [0, 9, 20, 29, 1000] {
        assert!(executable.exception_handlers_for_offset(offset).is_none());
        assert!(executable.source_range_at(offset).is_none());
    }
}

/// The operand space is capped at 29 bits.
#[test]
fn contract_operand_space_limit() {
    let heap = Heap::new();
    let mut fits = ExecutableBuilder::new("fits");
    fits.set_register_count(MAX_OPERAND_INDEX);
    fits.set_argument_count(1);
    let executable = fits.build(&heap).unwrap();
    assert_eq!(executable.layout().operand_count(), MAX_OPERAND_INDEX + 1);
    assert!(executable.try_classify_operand(Operand::new(MAX_OPERAND_INDEX)).is_ok());

    let mut too_big = ExecutableBuilder::new("too_big");
    too_big.set_register_count(MAX_OPERAND_INDEX);
    too_big.set_argument_count(2);
    assert!(matches!(too_big.build(&heap), Err(RuntimeError::MalformedExecutable(_))));
}

/// Out-of-range operands are reported with their limit.
#[test]
fn contract_operand_out_of_range_error() {
    let heap = Heap::new();
    let mut builder = ExecutableBuilder::new("range");
    builder.set_register_count(2);
    let executable = builder.build(&heap).unwrap();
    match executable.try_classify_operand(Operand::new(2)) {
        Err(RuntimeError::OperandOutOfRange { index, limit }) => assert_eq!((index, limit), (2, 2)),
        other => panic!("unexpected {other:?}"),
    }
}
