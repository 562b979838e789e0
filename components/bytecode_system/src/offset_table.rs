//! Tables of half-open bytecode ranges, sorted and non-overlapping.

use core_types::{RuntimeError, RuntimeResult};

/// An entry covering `[start_offset, end_offset)` of the bytecode.
pub trait OffsetRange {
    /// First covered offset.
    fn start_offset(&self) -> u32;
    /// One past the last covered offset.
    fn end_offset(&self) -> u32;
}

/// The entry covering `offset`, by binary search.
pub(crate) fn find_covering<T: OffsetRange>(table: &[T], offset: u32) -> Option<&T> {
    let after = table.partition_point(|entry| entry.start_offset() <= offset);
    let candidate = table.get(after.checked_sub(1)?)?;
    (offset < candidate.end_offset()).then_some(candidate)
}

/// Checks that every range is non-empty, that ranges are sorted by start
/// and that none overlaps its successor.
pub(crate) fn validate<T: OffsetRange>(table: &[T], what: &str) -> RuntimeResult<()> {
    for entry in table {
        if entry.start_offset() >= entry.end_offset() {
            return Err(RuntimeError::MalformedExecutable(format!(
                "{what} range {}..{} is empty",
                entry.start_offset(),
                entry.end_offset()
            )));
        }
    }
    for pair in table.windows(2) {
        if pair[1].start_offset() < pair[0].end_offset() {
            return Err(RuntimeError::MalformedExecutable(format!(
                "{what} ranges {}..{} and {}..{} are unsorted or overlap",
                pair[0].start_offset(),
                pair[0].end_offset(),
                pair[1].start_offset(),
                pair[1].end_offset()
            )));
        }
    }
    Ok(())
}
