//! Exception handler table entries.

use crate::offset_table::OffsetRange;

/// Where control goes when an exception is thrown inside
/// `[start_offset, end_offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandlers {
    /// First covered bytecode offset
    pub start_offset: u32,
    /// One past the last covered bytecode offset
    pub end_offset: u32,
    /// Start of the catch block, if any
    pub handler_offset: Option<u32>,
    /// Start of the finally block, if any
    pub finalizer_offset: Option<u32>,
}

impl ExceptionHandlers {
    /// Where execution resumes: the catch block, else the finally block.
    pub fn resume_offset(&self) -> Option<u32> {
        self.handler_offset.or(self.finalizer_offset)
    }
}

impl OffsetRange for ExceptionHandlers {
    fn start_offset(&self) -> u32 {
        self.start_offset
    }

    fn end_offset(&self) -> u32 {
        self.end_offset
    }
}
