//! NaN-boxed value representation.
//!
//! Every [`Value`] is a single `u64`. Doubles are stored as their IEEE-754
//! bits; everything else lives inside the quiet-NaN space:
//!
//! ```text
//!  63  62..51 (12)   50..48   47..0
//! +---+------------+--------+------------------------+
//! | S | 1111111111 1|  tag   |        payload         |
//! +---+------------+--------+------------------------+
//! ```
//!
//! The upper 13 bits equal `0x7FF8` for every boxed value. The sign bit marks
//! a cell reference, in which case the payload is a heap address and the
//! three tag bits give its [`CellTag`]. Every NaN is canonicalized to
//! `0x7FF8_0000_0000_0000` before it is stored, so no other NaN pattern can
//! ever collide with a boxed value.

use crate::payload::{extract_pointer_bits, PAYLOAD_MASK};
use std::fmt;

const TAG_SHIFT: u64 = 48;
const BASE_TAG: u64 = 0x7FF8;
const IS_CELL_BIT: u64 = 0x8000 | BASE_TAG;

const BOOLEAN_TAG: u64 = 0b001 | BASE_TAG;
const INT32_TAG: u64 = 0b010 | BASE_TAG;
const EMPTY_TAG: u64 = 0b011 | BASE_TAG;
const UNDEFINED_TAG: u64 = 0b110 | BASE_TAG;
const NULL_TAG: u64 = 0b111 | BASE_TAG;

const SHIFTED_BASE_TAG: u64 = BASE_TAG << TAG_SHIFT;
const SHIFTED_IS_CELL_PATTERN: u64 = IS_CELL_BIT << TAG_SHIFT;
const TAG_EXTRACTION: u64 = 0xFFFF_0000_0000_0000;

/// Bit pattern of the only NaN a [`Value`] may hold.
pub(crate) const CANONICAL_NAN_BITS: u64 = SHIFTED_BASE_TAG;

/// Kind of heap cell referenced by a cell-valued [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CellTag {
    /// Any cell with no more specific tag (shapes, executables, ...)
    Cell = 0b000,
    /// Ordinary object
    Object = 0b001,
    /// Heap string
    String = 0b010,
    /// Symbol
    Symbol = 0b011,
    /// Accessor pair
    Accessor = 0b100,
    /// Arbitrary-precision integer
    BigInt = 0b101,
}

impl CellTag {
    fn from_bits(bits: u64) -> Self {
        match bits & 0b111 {
            0b001 => CellTag::Object,
            0b010 => CellTag::String,
            0b011 => CellTag::Symbol,
            0b100 => CellTag::Accessor,
            0b101 => CellTag::BigInt,
            _ => CellTag::Cell,
        }
    }
}

/// A 64-bit tagged value.
///
/// Equality compares the encoded bits: `+0.0` and `-0.0` differ, and the
/// canonical NaN equals itself.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let undefined = Value::undefined();
/// let flag = Value::from(true);
/// let half = Value::from(0.5);
///
/// assert!(undefined.is_undefined());
/// assert!(flag.as_bool());
/// assert_eq!(half.as_double(), 0.5);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    const fn tagged(tag: u64, payload: u64) -> Self {
        Value((tag << TAG_SHIFT) | payload)
    }

    /// The `undefined` value.
    pub const fn undefined() -> Self {
        Self::tagged(UNDEFINED_TAG, 0)
    }

    /// The `null` value.
    pub const fn null() -> Self {
        Self::tagged(NULL_TAG, 0)
    }

    /// Marker for a slot that holds no value (e.g. a hole).
    pub const fn empty() -> Self {
        Self::tagged(EMPTY_TAG, 0)
    }

    /// Boxes a double. NaNs are canonicalized; integral values that fit
    /// in an `i32` (other than `-0.0`) are stored as int32.
    pub fn from_f64(number: f64) -> Self {
        if number.is_nan() {
            return Value(CANONICAL_NAN_BITS);
        }
        if number.fract() == 0.0
            && number >= i32::MIN as f64
            && number <= i32::MAX as f64
            && !(number == 0.0 && number.is_sign_negative())
        {
            return Self::from_i32(number as i32);
        }
        Value(number.to_bits())
    }

    /// Boxes a double without int32 narrowing. The NaN canonicalization
    /// still applies.
    pub fn from_f64_exact(number: f64) -> Self {
        if number.is_nan() {
            Value(CANONICAL_NAN_BITS)
        } else {
            Value(number.to_bits())
        }
    }

    /// Boxes a 32-bit integer.
    pub const fn from_i32(number: i32) -> Self {
        Self::tagged(INT32_TAG, number as u32 as u64)
    }

    /// Boxes a boolean.
    pub const fn from_bool(flag: bool) -> Self {
        Self::tagged(BOOLEAN_TAG, flag as u64)
    }

    /// Boxes a reference to the cell at `address`.
    ///
    /// A zero address produces `null`, matching how a missing cell reads.
    pub fn from_cell_address(tag: CellTag, address: usize) -> Self {
        if address == 0 {
            return Self::null();
        }
        let payload = address as u64 & PAYLOAD_MASK;
        debug_assert_eq!(
            extract_pointer_bits(payload),
            address,
            "cell address {address:#x} does not survive boxing on this target"
        );
        Self::tagged(IS_CELL_BIT | tag as u64, payload)
    }

    /// Reinterprets raw bits as a value, as when scanning words that may
    /// or may not hold boxed values.
    pub const fn from_encoded(encoded: u64) -> Self {
        Value(encoded)
    }

    /// The raw 64-bit encoding.
    pub const fn encoded(self) -> u64 {
        self.0
    }

    const fn tag(self) -> u64 {
        (self.0 & TAG_EXTRACTION) >> TAG_SHIFT
    }

    /// True for the `undefined` value.
    pub const fn is_undefined(self) -> bool {
        self.tag() == UNDEFINED_TAG
    }

    /// True for the `null` value.
    pub const fn is_null(self) -> bool {
        self.tag() == NULL_TAG
    }

    /// True for `undefined` or `null`.
    pub const fn is_nullish(self) -> bool {
        self.is_undefined() || self.is_null()
    }

    /// True for the empty marker.
    pub const fn is_empty(self) -> bool {
        self.tag() == EMPTY_TAG
    }

    /// True for booleans.
    pub const fn is_boolean(self) -> bool {
        self.tag() == BOOLEAN_TAG
    }

    /// True for values stored as int32.
    pub const fn is_int32(self) -> bool {
        self.tag() == INT32_TAG
    }

    /// True for values stored as raw double bits (including the canonical NaN).
    pub const fn is_double(self) -> bool {
        (self.0 & SHIFTED_BASE_TAG) != SHIFTED_BASE_TAG || self.0 == CANONICAL_NAN_BITS
    }

    /// True for any numeric value.
    pub const fn is_number(self) -> bool {
        self.is_double() || self.is_int32()
    }

    /// True for the canonical NaN.
    pub const fn is_nan(self) -> bool {
        self.0 == CANONICAL_NAN_BITS
    }

    /// True when the value references a heap cell.
    pub const fn is_cell(self) -> bool {
        (self.0 & SHIFTED_IS_CELL_PATTERN) == SHIFTED_IS_CELL_PATTERN
    }

    /// Reads a boolean.
    ///
    /// # Panics
    ///
    /// Panics if the value is not a boolean.
    pub fn as_bool(self) -> bool {
        assert!(self.is_boolean(), "as_bool on non-boolean value {self:?}");
        self.0 & 1 == 1
    }

    /// Reads an int32.
    ///
    /// # Panics
    ///
    /// Panics if the value is not stored as int32.
    pub fn as_i32(self) -> i32 {
        assert!(self.is_int32(), "as_i32 on non-int32 value {self:?}");
        self.0 as u32 as i32
    }

    /// Reads any numeric value as a double.
    ///
    /// # Panics
    ///
    /// Panics if the value is not a number.
    pub fn as_double(self) -> f64 {
        if self.is_int32() {
            return self.as_i32() as f64;
        }
        assert!(self.is_double(), "as_double on non-number value {self:?}");
        f64::from_bits(self.0)
    }

    /// Recovers the cell address.
    ///
    /// # Panics
    ///
    /// Panics if the value is not a cell; treating arbitrary bits as an
    /// address would corrupt the heap.
    pub fn as_cell_address(self) -> usize {
        assert!(self.is_cell(), "as_cell on non-cell value {self:?}");
        extract_pointer_bits(self.0)
    }

    /// The cell tag of a cell-valued value, `None` otherwise.
    pub fn cell_tag(self) -> Option<CellTag> {
        self.is_cell().then(|| CellTag::from_bits(self.tag()))
    }

    /// The payload reinterpreted as an address, without checking the tag.
    /// Used when scanning ambiguous words.
    pub fn payload_address(self) -> usize {
        extract_pointer_bits(self.0)
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::undefined()
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::from_bool(flag)
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Self::from_i32(number)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::from_f64(number)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cell() {
            let tag = CellTag::from_bits(self.tag());
            return write!(f, "Cell({tag:?}, {:#x})", extract_pointer_bits(self.0));
        }
        if self.is_double() {
            return f.debug_tuple("Double").field(&f64::from_bits(self.0)).finish();
        }
        match self.tag() {
            UNDEFINED_TAG => write!(f, "Undefined"),
            NULL_TAG => write!(f, "Null"),
            EMPTY_TAG => write!(f, "Empty"),
            BOOLEAN_TAG => f.debug_tuple("Boolean").field(&(self.0 & 1 == 1)).finish(),
            INT32_TAG => f.debug_tuple("Int32").field(&(self.0 as u32 as i32)).finish(),
            _ => write!(f, "Invalid({:#018x})", self.0),
        }
    }
}
