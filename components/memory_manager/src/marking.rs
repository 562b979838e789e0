//! Tracing of the object graph.
//!
//! Marking sets one bit per reachable cell. With a single thread the work
//! list is a plain vector; with more, every worker owns a LIFO deque, roots
//! are seeded through a shared injector, and idle workers steal from the
//! injector and from each other. Mark bits are claimed with an atomic
//! fetch-or, so each cell is traced by exactly one worker.

use crate::cell::{CellPtr, Visitor};
use crate::heap_block::HeapBlock;
use crossbeam_deque::{Injector, Stealer, Worker};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Marks `cell`. Returns true if it was unmarked.
fn claim(cell: CellPtr) -> bool {
    let (bitmap, index) = HeapBlock::mark_bitmap_for(cell);
    bitmap.set_marked(index)
}

/// Marking statistics for one collection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MarkingSummary {
    /// Cells marked in total.
    pub marked_cells: usize,
    /// Cells marked by each worker, in spawn order.
    pub per_worker: Vec<usize>,
}

/// Traces everything reachable from `roots`.
///
/// # Safety
///
/// Every root and every cell reachable from it must be live, and the mutator
/// must not run until this returns.
pub(crate) unsafe fn mark_live_cells(roots: &[CellPtr], threads: usize) -> MarkingSummary {
    if threads <= 1 {
        mark_sequential(roots)
    } else {
        mark_parallel(roots, threads)
    }
}

struct MarkingVisitor {
    work_queue: Vec<CellPtr>,
    marked: usize,
}

impl Visitor for MarkingVisitor {
    fn visit_cell(&mut self, cell: CellPtr) {
        if claim(cell) {
            self.marked += 1;
            self.work_queue.push(cell);
        }
    }
}

unsafe fn mark_sequential(roots: &[CellPtr]) -> MarkingSummary {
    let mut visitor = MarkingVisitor {
        work_queue: Vec::with_capacity(roots.len()),
        marked: 0,
    };
    for &root in roots {
        visitor.visit_cell(root);
    }
    while let Some(cell) = visitor.work_queue.pop() {
        cell.visit_edges(&mut visitor);
    }
    MarkingSummary {
        marked_cells: visitor.marked,
        per_worker: vec![visitor.marked],
    }
}

struct ParallelMarkingVisitor<'a> {
    local: &'a Worker<CellPtr>,
    pending: &'a AtomicUsize,
    marked: usize,
}

impl Visitor for ParallelMarkingVisitor<'_> {
    fn visit_cell(&mut self, cell: CellPtr) {
        if claim(cell) {
            self.marked += 1;
            // Counted before the parent is retired, so `pending` only reaches
            // zero once no queued or in-flight cell is left.
            self.pending.fetch_add(1, Ordering::AcqRel);
            self.local.push(cell);
        }
    }
}

fn find_task(local: &Worker<CellPtr>, global: &Injector<CellPtr>, stealers: &[Stealer<CellPtr>]) -> Option<CellPtr> {
    local.pop().or_else(|| {
        std::iter::repeat_with(|| {
            global
                .steal_batch_and_pop(local)
                .or_else(|| stealers.iter().map(|stealer| stealer.steal()).collect())
        })
        .find(|steal| !steal.is_retry())
        .and_then(|steal| steal.success())
    })
}

unsafe fn mark_parallel(roots: &[CellPtr], threads: usize) -> MarkingSummary {
    let injector = Injector::new();
    let pending = AtomicUsize::new(0);
    let mut marked_roots = 0;
    for &root in roots {
        if claim(root) {
            marked_roots += 1;
            pending.fetch_add(1, Ordering::AcqRel);
            injector.push(root);
        }
    }

    let workers: Vec<Worker<CellPtr>> = (0..threads).map(|_| Worker::new_lifo()).collect();
    let stealers: Vec<Stealer<CellPtr>> = workers.iter().map(Worker::stealer).collect();
    let per_worker = Mutex::new(vec![0usize; threads]);

    thread::scope(|scope| {
        for (index, worker) in workers.into_iter().enumerate() {
            let injector = &injector;
            let stealers = &stealers;
            let pending = &pending;
            let per_worker = &per_worker;
            thread::Builder::new()
                .name(format!("gc-marker-{index}"))
                .spawn_scoped(scope, move || {
                    let mut visitor = ParallelMarkingVisitor {
                        local: &worker,
                        pending,
                        marked: 0,
                    };
                    loop {
                        match find_task(&worker, injector, stealers) {
                            Some(cell) => {
                                // SAFETY: the caller guarantees the mutator is
                                // stopped; this worker owns `cell` because it
                                // popped it after the mark bit was claimed.
                                unsafe { cell.visit_edges(&mut visitor) };
                                pending.fetch_sub(1, Ordering::AcqRel);
                            }
                            None if pending.load(Ordering::Acquire) == 0 => break,
                            None => thread::yield_now(),
                        }
                    }
                    per_worker.lock()[index] = visitor.marked;
                })
                .unwrap_or_else(|error| panic!("failed to spawn marking worker: {error}"));
        }
    });

    let per_worker = per_worker.into_inner();
    MarkingSummary {
        marked_cells: marked_roots + per_worker.iter().sum::<usize>(),
        per_worker,
    }
}
