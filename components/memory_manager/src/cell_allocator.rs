//! Per-size-class allocation over lists of heap blocks.

use crate::cell::{CellPtr, CellState};
use crate::heap_block::{BlockBox, HeapBlock};
use serde::Serialize;
use std::cell::RefCell;

/// Occupancy of one size class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatorStatistics {
    /// Slot size served by the allocator
    pub cell_size: usize,
    /// Blocks owned, whatever their occupancy
    pub blocks: usize,
    /// Blocks holding no live cell
    pub empty_blocks: usize,
    /// Live cells across all blocks
    pub live_cells: usize,
    /// Total slots across all blocks
    pub capacity: usize,
}

/// Outcome of sweeping one allocator.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SweepTally {
    pub(crate) collected_cells: usize,
    pub(crate) collected_bytes: usize,
    pub(crate) live_cells: usize,
    pub(crate) live_bytes: usize,
    pub(crate) blocks_emptied: usize,
}

/// Serves one cell size from a set of blocks.
///
/// Blocks move between three lists:
/// - usable: has at least one free slot
/// - full: no free slot at the last look
/// - empty: no live cell; kept for reuse rather than returned to the
///   system, so weak references into them stay readable
pub struct CellAllocator {
    cell_size: usize,
    usable_blocks: RefCell<Vec<BlockBox>>,
    full_blocks: RefCell<Vec<BlockBox>>,
    empty_blocks: RefCell<Vec<BlockBox>>,
}

impl CellAllocator {
    /// Creates an allocator without blocks.
    pub fn new(cell_size: usize) -> Self {
        CellAllocator {
            cell_size,
            usable_blocks: RefCell::new(Vec::new()),
            full_blocks: RefCell::new(Vec::new()),
            empty_blocks: RefCell::new(Vec::new()),
        }
    }

    /// Slot size this allocator serves.
    pub fn cell_size(&self) -> usize {
        self.cell_size
    }

    /// Takes a slot from an existing block, or `None` if every block is full.
    pub(crate) fn allocate_cell(&self) -> Option<CellPtr> {
        let mut usable = self.usable_blocks.borrow_mut();
        loop {
            if let Some(block) = usable.last() {
                if let Some(cell) = block.allocate() {
                    return Some(cell);
                }
                if let Some(full) = usable.pop() {
                    self.full_blocks.borrow_mut().push(full);
                }
                continue;
            }
            let recycled = self.empty_blocks.borrow_mut().pop()?;
            usable.push(recycled);
        }
    }

    /// Adopts a freshly created block.
    pub(crate) fn add_block(&self, block: BlockBox) {
        self.usable_blocks.borrow_mut().push(block);
    }

    /// Total blocks owned.
    pub fn block_count(&self) -> usize {
        self.usable_blocks.borrow().len() + self.full_blocks.borrow().len() + self.empty_blocks.borrow().len()
    }

    /// Calls `f` with every block.
    pub fn for_each_block(&self, mut f: impl FnMut(&HeapBlock)) {
        for list in [&self.usable_blocks, &self.full_blocks, &self.empty_blocks] {
            for block in list.borrow().iter() {
                f(block);
            }
        }
    }

    /// Reclaims every live, unmarked cell and re-files blocks by occupancy.
    ///
    /// Marks are cleared afterwards, ready for the next cycle.
    pub(crate) fn sweep(&self) -> SweepTally {
        let mut tally = SweepTally::default();
        let mut blocks: Vec<BlockBox> = Vec::new();
        blocks.append(&mut self.usable_blocks.borrow_mut());
        blocks.append(&mut self.full_blocks.borrow_mut());

        for block in blocks {
            let mut live = 0;
            block.for_each_cell_in_state(CellState::Live, |cell| {
                if block.is_marked(cell) {
                    live += 1;
                    return;
                }
                log::trace!("sweep: freeing {} at {:#x}", cell.class_name(), cell.address());
                // SAFETY: the cell is unreachable and finalizers have already
                // run for this collection.
                unsafe { cell.drop_value() };
                block.deallocate(cell);
                tally.collected_cells += 1;
                tally.collected_bytes += self.cell_size;
            });
            block.clear_all_marks();
            tally.live_cells += live;
            tally.live_bytes += live * self.cell_size;

            if live == 0 {
                tally.blocks_emptied += 1;
                self.empty_blocks.borrow_mut().push(block);
            } else if block.is_full() {
                self.full_blocks.borrow_mut().push(block);
            } else {
                self.usable_blocks.borrow_mut().push(block);
            }
        }
        tally
    }

    /// Snapshot of the allocator's occupancy.
    pub fn statistics(&self) -> AllocatorStatistics {
        let mut stats = AllocatorStatistics {
            cell_size: self.cell_size,
            blocks: 0,
            empty_blocks: self.empty_blocks.borrow().len(),
            live_cells: 0,
            capacity: 0,
        };
        self.for_each_block(|block| {
            stats.blocks += 1;
            stats.live_cells += block.live_cell_count();
            stats.capacity += block.cell_count();
        });
        stats
    }
}
