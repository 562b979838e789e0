//! The garbage-collected heap.
//!
//! Cells are allocated from size-class allocators and reclaimed by a
//! stop-the-world mark/sweep cycle:
//!
//! 1. gather roots (root handles, must-survive cells, embedder providers,
//!    conservative vectors, the payload of an in-flight allocation)
//! 2. trace from the roots, setting mark bits
//! 3. clear the marks of uprooted cells
//! 4. finalize unmarked cells of finalizing types
//! 5. sweep: drop and free every unmarked cell, clear marks
//! 6. run post-collection tasks
//!
//! A collection is triggered when the bytes allocated since the last one
//! exceed a threshold that follows the live heap size, or when a size class
//! runs out of blocks.

use crate::cell::{self, Cell, CellHeader, CellPtr, CellState, GcRef, Visitor};
use crate::cell_allocator::{AllocatorStatistics, CellAllocator, SweepTally};
use crate::config::HeapConfig;
use crate::heap_block::{HeapBlock, BLOCK_SIZE, CELL_ALIGNMENT};
use crate::marking::{self, MarkingSummary};
use crate::root::{ConservativeVector, HeapRootKind, Root, RootCollector, RootProvider, RootRegistry};
use core_types::{RuntimeError, RuntimeResult, Value};
use crossbeam::atomic::AtomicCell;
use serde::Serialize;
use std::cell::{Cell as Mutable, RefCell};
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::rc::{self, Rc};
use std::time::{Duration, Instant};

/// Phase of the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GcPhase {
    /// No collection in progress; the mutator may allocate
    #[default]
    Idle,
    /// Tracing from roots
    Marking,
    /// Finalizing and reclaiming unmarked cells
    Sweeping,
}

/// What a collection reclaims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionType {
    /// Reclaim unreachable cells
    CollectGarbage,
    /// Reclaim every cell, reachable or not; used when the heap goes away
    CollectEverything,
}

/// Outcome of one collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    /// Kind of collection that ran
    pub collection_type: CollectionType,
    /// Distinct root cells
    pub roots: usize,
    /// Marking statistics
    pub marked_cells: usize,
    /// Cells marked per marking thread
    pub marked_per_worker: Vec<usize>,
    /// Cells still live after the sweep
    pub live_cells: usize,
    /// Bytes held by live cells
    pub live_bytes: usize,
    /// Cells reclaimed
    pub collected_cells: usize,
    /// Bytes reclaimed
    pub collected_bytes: usize,
    /// Blocks owned by the heap
    pub blocks: usize,
    /// Blocks left without any live cell
    pub blocks_emptied: usize,
    /// Allocation volume that triggers the next collection
    pub next_threshold: usize,
    /// Time spent gathering roots and marking
    pub marking_time: Duration,
    /// Time spent finalizing and sweeping
    pub sweeping_time: Duration,
}

type PendingEdges<'a> = &'a dyn Fn(&mut dyn Visitor);

/// A garbage-collected heap.
///
/// The heap belongs to a single mutator thread. Marking may fan out to
/// worker threads internally, but every public method must be called from
/// the owning thread.
///
/// # Example
///
/// ```
/// use memory_manager::{CollectionType, Heap, PrototypeChainValidity};
///
/// let heap = Heap::new();
/// let kept = heap.root(heap.allocate(PrototypeChainValidity::new()).unwrap());
/// let dropped = heap.allocate(PrototypeChainValidity::new()).unwrap().downgrade();
///
/// let report = heap.collect_garbage(CollectionType::CollectGarbage).unwrap();
/// assert_eq!(report.collected_cells, 1);
/// assert!(kept.is_valid());
/// assert!(dropped.upgrade().is_none());
/// ```
pub struct Heap {
    config: HeapConfig,
    allocators: Vec<CellAllocator>,
    live_blocks: RefCell<HashSet<usize>>,
    phase: AtomicCell<GcPhase>,
    gc_deferrals: Mutable<usize>,
    should_collect_when_deferral_ends: Mutable<bool>,
    allocated_bytes_since_last_gc: Mutable<usize>,
    gc_bytes_threshold: Mutable<usize>,
    collections: Mutable<u64>,
    roots: Rc<RootRegistry>,
    root_providers: RefCell<Vec<rc::Weak<dyn RootProvider>>>,
    conservative_vectors: RefCell<Vec<rc::Weak<RefCell<Vec<u64>>>>>,
    uprooted_cells: RefCell<Vec<CellPtr>>,
    post_gc_tasks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl Heap {
    /// Creates a heap with the default configuration.
    pub fn new() -> Self {
        Self::build(HeapConfig::default())
    }

    /// Creates a heap after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if the configuration is rejected.
    pub fn with_config(config: HeapConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: HeapConfig) -> Self {
        let allocators = config.size_classes.iter().map(|&size| CellAllocator::new(size)).collect();
        Heap {
            allocators,
            live_blocks: RefCell::new(HashSet::new()),
            phase: AtomicCell::new(GcPhase::Idle),
            gc_deferrals: Mutable::new(0),
            should_collect_when_deferral_ends: Mutable::new(false),
            allocated_bytes_since_last_gc: Mutable::new(0),
            gc_bytes_threshold: Mutable::new(config.gc_min_bytes_threshold),
            collections: Mutable::new(0),
            roots: Rc::new(RootRegistry::default()),
            root_providers: RefCell::new(Vec::new()),
            conservative_vectors: RefCell::new(Vec::new()),
            uprooted_cells: RefCell::new(Vec::new()),
            post_gc_tasks: RefCell::new(Vec::new()),
            config,
        }
    }

    /// The configuration the heap runs with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Current collector phase.
    pub fn phase(&self) -> GcPhase {
        self.phase.load()
    }

    /// Moves `value` onto the heap.
    ///
    /// May run a collection first. Cells referenced by `value` itself are
    /// kept alive by that collection; any other unrooted reference the
    /// caller holds is not.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::CellTooLarge`] if no size class fits `T`
    /// - [`RuntimeError::HeapExhausted`] if no slot is free after a
    ///   collection and no further block can be acquired
    ///
    /// # Panics
    ///
    /// Panics when called while a collection is in progress (e.g. from a
    /// finalizer).
    pub fn allocate<T: Cell>(&self, value: T) -> RuntimeResult<GcRef<T>> {
        assert_eq!(self.phase(), GcPhase::Idle, "allocation during garbage collection");
        let layout = cell::slot_layout::<T>();
        assert!(
            layout.align() <= CELL_ALIGNMENT,
            "{} needs {}-byte alignment",
            std::any::type_name::<T>(),
            layout.align()
        );
        let allocator = self.allocator_for(layout.size())?;

        let pending = |visitor: &mut dyn Visitor| value.visit_edges(visitor);
        self.will_allocate(allocator.cell_size(), &pending);
        let cell = self.allocate_cell(allocator, &pending)?;

        // SAFETY: `from_cell` of a freshly allocated slot is its owning block.
        let block = unsafe { HeapBlock::from_cell(cell).as_ref() };
        block.note_cell_type(T::OVERRIDES_MUST_SURVIVE_GARBAGE_COLLECTION, T::OVERRIDES_FINALIZE);
        // SAFETY: the slot is dead, at least `layout.size()` bytes and
        // 16-byte aligned.
        Ok(unsafe { cell::initialize(cell, value) })
    }

    fn allocator_for(&self, size: usize) -> RuntimeResult<&CellAllocator> {
        self.allocators
            .iter()
            .find(|allocator| allocator.cell_size() >= size)
            .ok_or_else(|| RuntimeError::CellTooLarge {
                size,
                max: self.allocators.last().map_or(0, CellAllocator::cell_size),
            })
    }

    fn will_allocate(&self, size: usize, pending: PendingEdges<'_>) {
        if self.config.collect_on_every_allocation
            || self.allocated_bytes_since_last_gc.get() + size > self.gc_bytes_threshold.get()
        {
            self.collect(CollectionType::CollectGarbage, Some(pending));
        }
        self.allocated_bytes_since_last_gc
            .set(self.allocated_bytes_since_last_gc.get() + size);
    }

    fn allocate_cell(&self, allocator: &CellAllocator, pending: PendingEdges<'_>) -> RuntimeResult<CellPtr> {
        if let Some(cell) = self.allocate_or_grow(allocator) {
            return Ok(cell);
        }
        log::debug!(
            "size class {} exhausted, collecting before retry",
            allocator.cell_size()
        );
        self.collect(CollectionType::CollectGarbage, Some(pending));
        self.allocate_or_grow(allocator).ok_or(RuntimeError::HeapExhausted {
            cell_size: allocator.cell_size(),
        })
    }

    fn allocate_or_grow(&self, allocator: &CellAllocator) -> Option<CellPtr> {
        if let Some(cell) = allocator.allocate_cell() {
            return Some(cell);
        }
        let mut live_blocks = self.live_blocks.borrow_mut();
        if self.config.max_blocks.is_some_and(|max| live_blocks.len() >= max) {
            return None;
        }
        let block = HeapBlock::create(allocator.cell_size())?;
        log::debug!(
            "acquired block {:#x} for {}-byte cells",
            block.address(),
            allocator.cell_size()
        );
        live_blocks.insert(block.address());
        drop(live_blocks);
        allocator.add_block(block);
        allocator.allocate_cell()
    }

    /// Frees a cell immediately, without a collection.
    ///
    /// # Safety
    ///
    /// No live cell or handle may reference `cell` afterwards.
    ///
    /// # Panics
    ///
    /// Panics if `cell` is not a live cell of this heap.
    pub unsafe fn deallocate(&self, cell: CellPtr) {
        assert!(
            self.is_valid_cell_pointer(cell.address()) && cell.state() == CellState::Live,
            "deallocate of {:#x}, which is not a live cell",
            cell.address()
        );
        cell.drop_value();
        HeapBlock::from_cell(cell).as_ref().deallocate(cell);
    }

    /// Whether `address` is the start of a slot this heap has handed out.
    ///
    /// The slot may be dead; only addresses passing this check may be read
    /// as cells at all.
    pub fn is_valid_cell_pointer(&self, address: usize) -> bool {
        let base = address & !(BLOCK_SIZE - 1);
        if !self.live_blocks.borrow().contains(&base) {
            return false;
        }
        // SAFETY: `base` is a block this heap created and still owns.
        let block = unsafe { &*(base as *const HeapBlock) };
        block.is_valid_cell_pointer(address)
    }

    /// The live cell starting at `address`, if there is one.
    pub fn live_cell_at(&self, address: usize) -> Option<CellPtr> {
        if !self.is_valid_cell_pointer(address) {
            return None;
        }
        let cell = CellPtr::from_non_null(NonNull::new(address as *mut CellHeader)?);
        (cell.state() == CellState::Live).then_some(cell)
    }

    /// Calls `f` for every cell in `state`.
    ///
    /// `f` must not allocate.
    pub fn for_each_cell_in_state(&self, state: CellState, mut f: impl FnMut(CellPtr)) {
        for allocator in &self.allocators {
            allocator.for_each_block(|block| block.for_each_cell_in_state(state, &mut f));
        }
    }

    /// Calls `f` for every live cell of type `T`.
    ///
    /// `f` must not allocate.
    pub fn for_each_live_cell_of_type<T: Cell>(&self, mut f: impl FnMut(GcRef<T>)) {
        self.for_each_cell_in_state(CellState::Live, |cell| {
            if let Some(typed) = cell.downcast::<T>() {
                f(typed);
            }
        });
    }

    /// Number of live cells.
    pub fn live_cell_count(&self) -> usize {
        let mut count = 0;
        self.for_each_cell_in_state(CellState::Live, |_| count += 1);
        count
    }

    /// Number of blocks acquired from the system.
    pub fn block_count(&self) -> usize {
        self.live_blocks.borrow().len()
    }

    /// Allocation volume that triggers the next collection.
    pub fn gc_bytes_threshold(&self) -> usize {
        self.gc_bytes_threshold.get()
    }

    /// Bytes allocated since the last collection.
    pub fn allocated_bytes_since_last_gc(&self) -> usize {
        self.allocated_bytes_since_last_gc.get()
    }

    /// Number of completed collections.
    pub fn collection_count(&self) -> u64 {
        self.collections.get()
    }

    /// Per-size-class occupancy.
    pub fn allocator_statistics(&self) -> Vec<AllocatorStatistics> {
        self.allocators.iter().map(CellAllocator::statistics).collect()
    }

    /// Keeps `cell` alive until the returned handle is dropped.
    pub fn root<T: Cell>(&self, cell: GcRef<T>) -> Root<T> {
        Root::new(cell, Rc::clone(&self.roots))
    }

    /// Registers a root provider. The heap holds it weakly; it stops being
    /// consulted once the last strong reference goes away.
    pub fn add_root_provider<P: RootProvider + 'static>(&self, provider: &Rc<P>) {
        let weak: rc::Weak<dyn RootProvider> = Rc::downgrade(provider) as rc::Weak<dyn RootProvider>;
        self.root_providers.borrow_mut().push(weak);
    }

    /// Creates a vector of words that are scanned conservatively for as long
    /// as any clone of it exists.
    pub fn conservative_vector(&self) -> ConservativeVector {
        let vector = ConservativeVector::new();
        self.conservative_vectors.borrow_mut().push(vector.downgrade());
        vector
    }

    /// Forces `cell` to be reclaimed by the next collection even if it is
    /// still reachable. Anything still referencing it is left dangling.
    pub fn uproot_cell(&self, cell: CellPtr) {
        self.uprooted_cells.borrow_mut().push(cell);
    }

    /// Queues `task` to run once after the next collection.
    pub fn enqueue_post_gc_task(&self, task: impl FnOnce() + 'static) {
        self.post_gc_tasks.borrow_mut().push(Box::new(task));
    }

    /// Suppresses collections until the returned guard is dropped.
    ///
    /// Scopes nest. A collection requested while suppressed runs when the
    /// outermost scope ends.
    pub fn defer_gc(&self) -> DeferGc<'_> {
        self.gc_deferrals.set(self.gc_deferrals.get() + 1);
        DeferGc { heap: self }
    }

    /// Whether a [`DeferGc`] scope is active.
    pub fn is_gc_deferred(&self) -> bool {
        self.gc_deferrals.get() > 0
    }

    fn undefer_gc(&self) {
        let deferrals = self.gc_deferrals.get();
        assert!(deferrals > 0, "unbalanced defer_gc scope");
        self.gc_deferrals.set(deferrals - 1);
        if deferrals == 1 && self.should_collect_when_deferral_ends.replace(false) {
            self.collect(CollectionType::CollectGarbage, None);
        }
    }

    /// Runs a collection now.
    ///
    /// Returns `None` when the collection is postponed by a [`DeferGc`]
    /// scope. [`CollectionType::CollectEverything`] ignores deferral.
    ///
    /// # Panics
    ///
    /// Panics if called while a collection is already running.
    pub fn collect_garbage(&self, collection_type: CollectionType) -> Option<CollectionReport> {
        self.collect(collection_type, None)
    }

    fn collect(&self, collection_type: CollectionType, pending: Option<PendingEdges<'_>>) -> Option<CollectionReport> {
        assert_eq!(self.phase(), GcPhase::Idle, "collection requested while collecting");
        if collection_type == CollectionType::CollectGarbage && self.is_gc_deferred() {
            self.should_collect_when_deferral_ends.set(true);
            return None;
        }
        log::debug!("collection #{} ({collection_type:?}) starting", self.collections.get() + 1);

        let marking_started = Instant::now();
        self.phase.store(GcPhase::Marking);
        let (roots, summary) = match collection_type {
            CollectionType::CollectGarbage => {
                let roots = self.gather_roots(pending);
                let root_cells: Vec<CellPtr> = roots.keys().copied().collect();
                // SAFETY: roots are live cells; the mutator is inside this
                // call and cannot run until marking returns.
                let summary = unsafe { marking::mark_live_cells(&root_cells, self.config.marking_threads) };
                (roots.len(), summary)
            }
            CollectionType::CollectEverything => (0, MarkingSummary::default()),
        };
        for cell in self.uprooted_cells.take() {
            if cell.state() == CellState::Live {
                // SAFETY: uprooted cells are cells of this heap.
                unsafe { HeapBlock::from_cell(cell).as_ref() }.clear_marked(cell);
            }
        }
        let marking_time = marking_started.elapsed();

        let sweeping_started = Instant::now();
        self.phase.store(GcPhase::Sweeping);
        self.finalize_unmarked_cells();
        let tally = self.sweep_dead_cells();
        let sweeping_time = sweeping_started.elapsed();

        let next_threshold = tally.live_bytes.max(self.config.gc_min_bytes_threshold);
        self.gc_bytes_threshold.set(next_threshold);
        self.allocated_bytes_since_last_gc.set(0);
        self.collections.set(self.collections.get() + 1);
        self.phase.store(GcPhase::Idle);

        let report = CollectionReport {
            collection_type,
            roots,
            marked_cells: summary.marked_cells,
            marked_per_worker: summary.per_worker,
            live_cells: tally.live_cells,
            live_bytes: tally.live_bytes,
            collected_cells: tally.collected_cells,
            collected_bytes: tally.collected_bytes,
            blocks: self.block_count(),
            blocks_emptied: tally.blocks_emptied,
            next_threshold,
            marking_time,
            sweeping_time,
        };
        log::debug!(
            "collection #{} done: {} live cells ({} bytes), {} collected ({} bytes), {} of {} blocks empty, next threshold {} bytes",
            self.collections.get(),
            report.live_cells,
            report.live_bytes,
            report.collected_cells,
            report.collected_bytes,
            report.blocks_emptied,
            report.blocks,
            next_threshold
        );

        self.run_post_gc_tasks();
        Some(report)
    }

    fn gather_roots(&self, pending: Option<PendingEdges<'_>>) -> HashMap<CellPtr, HeapRootKind> {
        let mut roots = HashMap::new();

        self.roots.for_each(|cell| {
            roots.entry(cell).or_insert(HeapRootKind::Root);
        });

        for allocator in &self.allocators {
            allocator.for_each_block(|block| {
                if !block.overrides_must_survive_garbage_collection() {
                    return;
                }
                block.for_each_cell_in_state(CellState::Live, |cell| {
                    if cell.must_survive_garbage_collection() {
                        roots.entry(cell).or_insert(HeapRootKind::MustSurvive);
                    }
                });
            });
        }

        let providers: Vec<Rc<dyn RootProvider>> = {
            let mut registered = self.root_providers.borrow_mut();
            registered.retain(|provider| provider.strong_count() > 0);
            registered.iter().filter_map(rc::Weak::upgrade).collect()
        };
        for provider in providers {
            provider.gather_roots(&mut RootCollector {
                roots: &mut roots,
                kind: HeapRootKind::Embedder,
            });
        }

        let vectors: Vec<Rc<RefCell<Vec<u64>>>> = {
            let mut registered = self.conservative_vectors.borrow_mut();
            registered.retain(|vector| vector.strong_count() > 0);
            registered.iter().filter_map(rc::Weak::upgrade).collect()
        };
        for vector in vectors {
            for &word in vector.borrow().iter() {
                if let Some(cell) = self.cell_from_possible_value(word) {
                    log::trace!("root (Conservative): {:#x}", cell.address());
                    roots.entry(cell).or_insert(HeapRootKind::Conservative);
                }
            }
        }

        if let Some(pending) = pending {
            pending(&mut RootCollector {
                roots: &mut roots,
                kind: HeapRootKind::PendingAllocation,
            });
        }

        roots
    }

    fn cell_from_possible_value(&self, word: u64) -> Option<CellPtr> {
        let value = Value::from_encoded(word);
        let address = if value.is_cell() {
            value.payload_address()
        } else {
            usize::try_from(word).ok()?
        };
        self.live_cell_at(address)
    }

    fn finalize_unmarked_cells(&self) {
        for allocator in &self.allocators {
            allocator.for_each_block(|block| {
                if !block.overrides_finalize() {
                    return;
                }
                block.for_each_cell_in_state(CellState::Live, |cell| {
                    if !block.is_marked(cell) {
                        cell.finalize();
                    }
                });
            });
        }
    }

    fn sweep_dead_cells(&self) -> SweepTally {
        let mut total = SweepTally::default();
        for allocator in &self.allocators {
            let tally = allocator.sweep();
            total.collected_cells += tally.collected_cells;
            total.collected_bytes += tally.collected_bytes;
            total.live_cells += tally.live_cells;
            total.live_bytes += tally.live_bytes;
            total.blocks_emptied += tally.blocks_emptied;
        }
        total
    }

    fn run_post_gc_tasks(&self) {
        let tasks = self.post_gc_tasks.take();
        for task in tasks {
            task();
        }
    }

    /// The live object graph as JSON.
    ///
    /// Maps each live cell's address to its class name, outgoing edges and,
    /// for roots, the kind of root.
    pub fn dump_graph(&self) -> serde_json::Value {
        struct EdgeCollector(Vec<String>);

        impl Visitor for EdgeCollector {
            fn visit_cell(&mut self, cell: CellPtr) {
                self.0.push(format!("{:#x}", cell.address()));
            }
        }

        let roots = self.gather_roots(None);
        let mut graph = serde_json::Map::new();
        self.for_each_cell_in_state(CellState::Live, |cell| {
            let mut edges = EdgeCollector(Vec::new());
            // SAFETY: the caller is the mutator; nothing runs concurrently.
            unsafe { cell.visit_edges(&mut edges) };
            let mut node = serde_json::json!({
                "class_name": cell.class_name(),
                "edges": edges.0,
            });
            if let Some(kind) = roots.get(&cell) {
                node["root"] = serde_json::json!(format!("{kind:?}"));
            }
            graph.insert(format!("{:#x}", cell.address()), node);
        });
        serde_json::Value::Object(graph)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        if self.phase() != GcPhase::Idle {
            // Unwinding out of a collection; leak rather than sweep a heap
            // in an unknown state.
            return;
        }
        self.post_gc_tasks.borrow_mut().clear();
        self.collect(CollectionType::CollectEverything, None);
        self.post_gc_tasks.borrow_mut().clear();
    }
}

/// Guard returned by [`Heap::defer_gc`].
#[must_use = "collection is only deferred while the guard is alive"]
pub struct DeferGc<'h> {
    heap: &'h Heap,
}

impl Drop for DeferGc<'_> {
    fn drop(&mut self) {
        self.heap.undefer_gc();
    }
}
