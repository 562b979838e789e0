//! Mapping from bytecode ranges back to source text.

use crate::offset_table::OffsetRange;

/// Position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePosition {
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
    /// Byte offset from start of source
    pub offset: u32,
}

impl SourcePosition {
    /// Create a new source position
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Self { line, column, offset }
    }
}

/// Span of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceRange {
    /// First position
    pub start: SourcePosition,
    /// Position just past the end
    pub end: SourcePosition,
}

/// One source-map row: the bytecode in `[start_offset, end_offset)` was
/// generated from `source_range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMapEntry {
    /// First covered bytecode offset
    pub start_offset: u32,
    /// One past the last covered bytecode offset
    pub end_offset: u32,
    /// Originating source text
    pub source_range: SourceRange,
}

impl OffsetRange for SourceMapEntry {
    fn start_offset(&self) -> u32 {
        self.start_offset
    }

    fn end_offset(&self) -> u32 {
        self.end_offset
    }
}
