//! Fixed-size slabs of same-sized cells.
//!
//! A block is one `BLOCK_SIZE`-aligned allocation. Its metadata sits at the
//! start and the cell slots follow, so the block owning any cell can be found
//! by masking the cell address. Slots are handed out from the free list first
//! and from a lazy cursor second; the cursor marks the allocation frontier
//! below which every slot has been initialized at least once.

use crate::cell::{CellHeader, CellPtr, CellState};
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size and alignment of every heap block.
pub const BLOCK_SIZE: usize = 16 * 1024;

/// Smallest cell size the mark bitmap is dimensioned for.
pub const MIN_CELL_SIZE: usize = 32;

/// Alignment of every cell slot.
pub const CELL_ALIGNMENT: usize = 16;

const BITS_PER_WORD: usize = u64::BITS as usize;
const MARK_WORDS: usize = BLOCK_SIZE / MIN_CELL_SIZE / BITS_PER_WORD;

/// One mark bit per slot, packed into 64-bit words.
///
/// Marking workers share blocks, so every update is an atomic
/// read-modify-write. Relaxed ordering is enough: the heap switches phase
/// between marking and sweeping, and the thread join at the end of marking
/// publishes every bit.
pub struct MarkBitmap {
    words: [AtomicU64; MARK_WORDS],
}

impl MarkBitmap {
    /// Creates a bitmap with every bit clear.
    pub fn new() -> Self {
        MarkBitmap {
            words: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn locate(index: usize) -> (usize, u64) {
        debug_assert!(index < MARK_WORDS * BITS_PER_WORD);
        (index / BITS_PER_WORD, 1u64 << (index % BITS_PER_WORD))
    }

    /// Sets the bit for `index`. Returns true if this call set it.
    pub fn set_marked(&self, index: usize) -> bool {
        let (word, bit) = Self::locate(index);
        self.words[word].fetch_or(bit, Ordering::Relaxed) & bit == 0
    }

    /// Clears the bit for `index`.
    pub fn clear_marked(&self, index: usize) {
        let (word, bit) = Self::locate(index);
        self.words[word].fetch_and(!bit, Ordering::Relaxed);
    }

    /// Reads the bit for `index`.
    pub fn is_marked(&self, index: usize) -> bool {
        let (word, bit) = Self::locate(index);
        self.words[word].load(Ordering::Relaxed) & bit != 0
    }

    /// Clears every bit.
    pub fn clear_all_marks(&self) {
        for word in &self.words {
            word.store(0, Ordering::Relaxed);
        }
    }

    /// Number of set bits.
    pub fn count_marked(&self) -> usize {
        self.words
            .iter()
            .map(|word| word.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }
}

impl Default for MarkBitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata header of a heap block.
#[repr(C)]
pub struct HeapBlock {
    cell_size: usize,
    cell_count: usize,
    next_lazy_freelist_index: std::cell::Cell<usize>,
    freelist: std::cell::Cell<Option<CellPtr>>,
    overrides_must_survive: std::cell::Cell<bool>,
    overrides_finalize: std::cell::Cell<bool>,
    mark_bitmap: MarkBitmap,
}

const STORAGE_OFFSET: usize =
    (std::mem::size_of::<HeapBlock>() + CELL_ALIGNMENT - 1) & !(CELL_ALIGNMENT - 1);

/// Largest cell size a block can hold at least one of.
pub const MAX_CELL_SIZE: usize = BLOCK_SIZE - STORAGE_OFFSET;

fn block_layout() -> Layout {
    // BLOCK_SIZE is a non-zero power of two.
    Layout::from_size_align(BLOCK_SIZE, BLOCK_SIZE).unwrap_or_else(|_| unreachable!())
}

impl HeapBlock {
    /// Acquires a fresh block from the system allocator.
    ///
    /// Returns `None` when the system allocator is out of memory.
    pub(crate) fn create(cell_size: usize) -> Option<BlockBox> {
        assert!(
            cell_size >= MIN_CELL_SIZE && cell_size <= MAX_CELL_SIZE && cell_size % CELL_ALIGNMENT == 0,
            "invalid cell size {cell_size}"
        );
        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { alloc::alloc(block_layout()) } as *mut HeapBlock;
        let block = NonNull::new(raw)?;
        let header = HeapBlock {
            cell_size,
            cell_count: MAX_CELL_SIZE / cell_size,
            next_lazy_freelist_index: std::cell::Cell::new(0),
            freelist: std::cell::Cell::new(None),
            overrides_must_survive: std::cell::Cell::new(false),
            overrides_finalize: std::cell::Cell::new(false),
            mark_bitmap: MarkBitmap::new(),
        };
        // SAFETY: the allocation is BLOCK_SIZE bytes, aligned to BLOCK_SIZE,
        // which covers the header.
        unsafe { block.as_ptr().write(header) };
        Some(BlockBox(block))
    }

    /// The block containing `cell`.
    pub fn from_cell(cell: CellPtr) -> NonNull<HeapBlock> {
        let base = cell.address() & !(BLOCK_SIZE - 1);
        // SAFETY: cell addresses lie past a block header, so the masked
        // address is never null.
        unsafe { NonNull::new_unchecked(base as *mut HeapBlock) }
    }

    /// Mark bitmap of the block containing `cell`, reachable from any thread.
    pub(crate) fn mark_bitmap_for<'a>(cell: CellPtr) -> (&'a MarkBitmap, usize) {
        let block = Self::from_cell(cell).as_ptr();
        // SAFETY: the block outlives the collection that calls this; only the
        // atomic bitmap is borrowed, so workers never share the non-atomic
        // fields.
        let bitmap = unsafe { &*std::ptr::addr_of!((*block).mark_bitmap) };
        let cell_size = unsafe { std::ptr::addr_of!((*block).cell_size).read() };
        let index = (cell.address() - block as usize - STORAGE_OFFSET) / cell_size;
        (bitmap, index)
    }

    fn base(&self) -> usize {
        self as *const HeapBlock as usize
    }

    fn storage_start(&self) -> usize {
        self.base() + STORAGE_OFFSET
    }

    /// Size of every cell in this block.
    pub fn cell_size(&self) -> usize {
        self.cell_size
    }

    /// Number of slots in this block.
    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Slot at `index`.
    pub fn cell(&self, index: usize) -> CellPtr {
        debug_assert!(index < self.cell_count);
        let address = self.storage_start() + index * self.cell_size;
        // SAFETY: storage addresses are non-null.
        CellPtr::from_non_null(unsafe { NonNull::new_unchecked(address as *mut CellHeader) })
    }

    /// Slot index of `cell`, which must belong to this block.
    pub fn cell_index(&self, cell: CellPtr) -> usize {
        (cell.address() - self.storage_start()) / self.cell_size
    }

    /// Hands out a slot: free list head first, then the lazy cursor.
    ///
    /// Returns `None` when the block is full.
    pub fn allocate(&self) -> Option<CellPtr> {
        if let Some(cell) = self.freelist.get() {
            self.freelist.set(cell.header().next_free());
            cell.header().set_next_free(None);
            return Some(cell);
        }
        let index = self.next_lazy_freelist_index.get();
        if index == self.cell_count {
            return None;
        }
        self.next_lazy_freelist_index.set(index + 1);
        let cell = self.cell(index);
        // SAFETY: the slot lies inside the block and has never been handed
        // out, so nothing else references it.
        unsafe { cell.as_ptr().write(CellHeader::dead()) };
        Some(cell)
    }

    /// Returns a slot to the free list.
    ///
    /// The cell's value must already have been dropped.
    pub fn deallocate(&self, cell: CellPtr) {
        debug_assert!(self.is_valid_cell_pointer(cell.address()));
        cell.header().mark_dead();
        cell.header().set_next_free(self.freelist.get());
        self.freelist.set(Some(cell));
    }

    /// Whether `address` is the start of a slot below the allocation frontier.
    ///
    /// An address passing this check may still be a dead cell; callers must
    /// check [`CellPtr::state`] as well.
    pub fn is_valid_cell_pointer(&self, address: usize) -> bool {
        let start = self.storage_start();
        let end = start + self.cell_count * self.cell_size;
        if address < start || address >= end {
            return false;
        }
        let offset = address - start;
        offset % self.cell_size == 0 && offset / self.cell_size < self.next_lazy_freelist_index.get()
    }

    /// True when neither the free list nor the lazy cursor has a slot left.
    pub fn is_full(&self) -> bool {
        self.freelist.get().is_none() && self.next_lazy_freelist_index.get() == self.cell_count
    }

    /// Calls `f` for every slot ever handed out.
    pub fn for_each_cell(&self, mut f: impl FnMut(CellPtr)) {
        for index in 0..self.next_lazy_freelist_index.get() {
            f(self.cell(index));
        }
    }

    /// Calls `f` for every slot in `state`.
    pub fn for_each_cell_in_state(&self, state: CellState, mut f: impl FnMut(CellPtr)) {
        self.for_each_cell(|cell| {
            if cell.state() == state {
                f(cell);
            }
        });
    }

    /// Number of live cells.
    pub fn live_cell_count(&self) -> usize {
        let mut count = 0;
        self.for_each_cell_in_state(CellState::Live, |_| count += 1);
        count
    }

    /// Mark bitmap of this block.
    pub fn mark_bitmap(&self) -> &MarkBitmap {
        &self.mark_bitmap
    }

    /// Whether `cell` is marked.
    pub fn is_marked(&self, cell: CellPtr) -> bool {
        self.mark_bitmap.is_marked(self.cell_index(cell))
    }

    /// Marks `cell`. Returns true if it was not marked before.
    pub fn set_marked(&self, cell: CellPtr) -> bool {
        self.mark_bitmap.set_marked(self.cell_index(cell))
    }

    /// Unmarks `cell`.
    pub fn clear_marked(&self, cell: CellPtr) {
        self.mark_bitmap.clear_marked(self.cell_index(cell))
    }

    /// Unmarks every cell.
    pub fn clear_all_marks(&self) {
        self.mark_bitmap.clear_all_marks()
    }

    /// Whether a cell type overriding must-survive was ever placed here.
    pub fn overrides_must_survive_garbage_collection(&self) -> bool {
        self.overrides_must_survive.get()
    }

    /// Whether a finalizing cell type was ever placed here.
    pub fn overrides_finalize(&self) -> bool {
        self.overrides_finalize.get()
    }

    pub(crate) fn note_cell_type(&self, overrides_must_survive: bool, overrides_finalize: bool) {
        if overrides_must_survive {
            self.overrides_must_survive.set(true);
        }
        if overrides_finalize {
            self.overrides_finalize.set(true);
        }
    }
}

/// Owning handle to a block; returns the memory to the system on drop.
pub(crate) struct BlockBox(NonNull<HeapBlock>);

impl BlockBox {
    pub(crate) fn address(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl std::ops::Deref for BlockBox {
    type Target = HeapBlock;

    fn deref(&self) -> &HeapBlock {
        // SAFETY: the block stays allocated until this box is dropped.
        unsafe { self.0.as_ref() }
    }
}

impl Drop for BlockBox {
    fn drop(&mut self) {
        debug_assert_eq!(self.live_cell_count(), 0, "dropping a block with live cells");
        // SAFETY: allocated in `HeapBlock::create` with the same layout; the
        // header has no drop glue.
        unsafe { alloc::dealloc(self.0.as_ptr() as *mut u8, block_layout()) }
    }
}
