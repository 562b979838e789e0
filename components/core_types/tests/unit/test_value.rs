//! Unit tests for the boxed value encoding

use core_types::{CellTag, Value};

#[test]
fn test_every_double_class_round_trips() {
    let mut bits = 0x0010_0000_0000_0000_u64;
    // Walk exponents across the whole range, skipping the NaN/infinity exponent.
    while bits < 0x7FF0_0000_0000_0000 {
        for sign in [0, 1u64 << 63] {
            let number = f64::from_bits(bits | sign | 0x5_5555);
            let value = Value::from(number);
            assert_eq!(value.as_double().to_bits(), number.to_bits());
        }
        bits += 0x0010_0000_0000_0000;
    }
}

#[test]
fn test_subnormals_round_trip() {
    for raw in [1u64, 0xF_FFFF_FFFF_FFFF, 0x8000_0000_0000_0001] {
        let number = f64::from_bits(raw);
        assert_eq!(Value::from(number).as_double().to_bits(), raw);
    }
}

#[test]
fn test_is_cell_is_a_pure_tag_check() {
    let cell = Value::from_cell_address(CellTag::String, 0x1000);
    assert!(cell.is_cell());
    assert!(!cell.is_number());
    assert!(!cell.is_nullish());
    assert_eq!(cell.cell_tag(), Some(CellTag::String));
    assert_eq!(Value::from(1.25).cell_tag(), None);
}

#[test]
fn test_from_encoded_preserves_bits() {
    let original = Value::from_cell_address(CellTag::Object, 0x2040);
    let copy = Value::from_encoded(original.encoded());
    assert_eq!(copy, original);
    assert_eq!(copy.as_cell_address(), 0x2040);
}

#[test]
fn test_default_is_undefined() {
    assert!(Value::default().is_undefined());
    assert!(Value::default().is_nullish());
}

#[test]
#[should_panic(expected = "as_i32 on non-int32")]
fn test_as_i32_on_double_panics() {
    Value::from(0.25).as_i32();
}
