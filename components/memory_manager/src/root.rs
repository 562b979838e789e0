//! Strong handles and other sources of roots.

use crate::cell::{Cell, CellPtr, GcRef, Visitor};
use core_types::Value;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Why a cell was treated as a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HeapRootKind {
    /// Held by a [`Root`] handle
    Root,
    /// Its type asked to survive collection
    MustSurvive,
    /// Reported by a [`RootProvider`]
    Embedder,
    /// Found in a [`ConservativeVector`]
    Conservative,
    /// Referenced by a value whose allocation triggered the collection
    PendingAllocation,
}

/// Counted registry of cells held by [`Root`] handles.
#[derive(Default)]
pub(crate) struct RootRegistry {
    counts: RefCell<HashMap<CellPtr, usize>>,
}

impl RootRegistry {
    fn retain(&self, cell: CellPtr) {
        *self.counts.borrow_mut().entry(cell).or_insert(0) += 1;
    }

    fn release(&self, cell: CellPtr) {
        let mut counts = self.counts.borrow_mut();
        if let Some(count) = counts.get_mut(&cell) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&cell);
            }
        }
    }

    pub(crate) fn for_each(&self, mut f: impl FnMut(CellPtr)) {
        for &cell in self.counts.borrow().keys() {
            f(cell);
        }
    }
}

/// Strong handle: keeps a cell alive for as long as the handle exists.
///
/// # Example
///
/// ```
/// use memory_manager::{CollectionType, Heap, PrototypeChainValidity};
///
/// let heap = Heap::new();
/// let cell = heap.allocate(PrototypeChainValidity::new()).unwrap();
/// let root = heap.root(cell);
/// heap.collect_garbage(CollectionType::CollectGarbage);
/// assert!(root.is_valid());
/// ```
pub struct Root<T: Cell> {
    cell: GcRef<T>,
    registry: Rc<RootRegistry>,
}

impl<T: Cell> Root<T> {
    pub(crate) fn new(cell: GcRef<T>, registry: Rc<RootRegistry>) -> Self {
        registry.retain(cell.cell());
        Root { cell, registry }
    }

    /// The rooted reference.
    ///
    /// Not called `get`: that would shadow [`Object::get`](crate::Object::get)
    /// behind `Deref`.
    pub fn gc_ref(&self) -> GcRef<T> {
        self.cell
    }
}

impl<T: Cell> Deref for Root<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.cell
    }
}

impl<T: Cell> Clone for Root<T> {
    fn clone(&self) -> Self {
        Root::new(self.cell, Rc::clone(&self.registry))
    }
}

impl<T: Cell> Drop for Root<T> {
    fn drop(&mut self) {
        self.registry.release(self.cell.cell());
    }
}

impl<T: Cell> fmt::Debug for Root<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Root").field(&self.cell).finish()
    }
}

/// Embedder-side source of roots, consulted at the start of every collection.
pub trait RootProvider {
    /// Reports every cell the embedder keeps alive.
    fn gather_roots(&self, visitor: &mut dyn Visitor);
}

/// Words that might hold cell references, scanned conservatively.
///
/// Each word is tried as a boxed [`Value`] first and as a raw address second;
/// it roots a cell only if it names the start of a live slot.
#[derive(Clone, Default)]
pub struct ConservativeVector {
    words: Rc<RefCell<Vec<u64>>>,
}

impl ConservativeVector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a raw word.
    pub fn push(&self, word: u64) {
        self.words.borrow_mut().push(word);
    }

    /// Adds the encoding of a value.
    pub fn push_value(&self, value: Value) {
        self.push(value.encoded());
    }

    /// Removes every word.
    pub fn clear(&self) {
        self.words.borrow_mut().clear();
    }

    /// Number of words held.
    pub fn len(&self) -> usize {
        self.words.borrow().len()
    }

    /// Whether no word is held.
    pub fn is_empty(&self) -> bool {
        self.words.borrow().is_empty()
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<RefCell<Vec<u64>>> {
        Rc::downgrade(&self.words)
    }
}

/// Collects visited cells into a root set.
pub(crate) struct RootCollector<'a> {
    pub(crate) roots: &'a mut HashMap<CellPtr, HeapRootKind>,
    pub(crate) kind: HeapRootKind,
}

impl Visitor for RootCollector<'_> {
    fn visit_cell(&mut self, cell: CellPtr) {
        log::trace!("root ({:?}): {:#x}", self.kind, cell.address());
        self.roots.entry(cell).or_insert(self.kind);
    }
}
