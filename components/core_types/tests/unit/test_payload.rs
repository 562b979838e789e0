//! Unit tests for per-architecture payload extraction

use core_types::payload::{
    direct_payload, extract_pointer_bits, sign_extended_payload, zero_extended_payload,
    PAYLOAD_MASK,
};
use core_types::{CellTag, Value};

fn box_address(address: u64) -> u64 {
    Value::from_cell_address(CellTag::Object, 0x10).encoded() & !PAYLOAD_MASK | (address & PAYLOAD_MASK)
}

#[test]
fn test_sign_extended_variant() {
    for address in [0x1000_u64, 0x0000_7FFF_FFFF_F000, 0xFFFF_8000_0000_0010] {
        assert_eq!(sign_extended_payload(box_address(address)), address);
    }
}

#[test]
fn test_zero_extended_variant() {
    for address in [0x1000_u64, 0x0000_FFFF_FFFF_F000] {
        assert_eq!(zero_extended_payload(box_address(address)), address);
    }
}

#[test]
fn test_direct_variant() {
    for address in [0x1000_u64, 0xFFFF_F000] {
        assert_eq!(direct_payload(box_address(address)), address);
    }
}

#[test]
fn test_host_variant_matches_value_decoding() {
    let storage = Box::new(0u128);
    let address = &*storage as *const u128 as usize;
    let value = Value::from_cell_address(CellTag::Cell, address);
    assert_eq!(extract_pointer_bits(value.encoded()), address);
    assert_eq!(value.as_cell_address(), address);
}
