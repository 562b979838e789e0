//! Cells: the unit of garbage-collected allocation.
//!
//! Every managed value is stored in a fixed-size slot of a
//! [`HeapBlock`](crate::heap_block::HeapBlock), prefixed by a [`CellHeader`].
//! The header carries a static vtable so the collector can visit, finalize
//! and drop a cell without knowing its Rust type.
//!
//! Handles:
//! - [`CellPtr`] - untyped address of a cell
//! - [`GcRef`] - typed, non-owning reference; liveness comes from reachability
//! - [`Weak`] - reference that does not keep its target alive and detects
//!   reuse of the slot through a per-slot generation

use core_types::{CellTag, Value};
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

/// A type that can live on the garbage-collected heap.
///
/// # Example
///
/// ```
/// use memory_manager::{Cell, GcRef, Heap, Visitor};
///
/// struct Pair {
///     first: Option<GcRef<Pair>>,
///     second: Option<GcRef<Pair>>,
/// }
///
/// impl Cell for Pair {
///     fn class_name(&self) -> &'static str {
///         "Pair"
///     }
///
///     fn visit_edges(&self, visitor: &mut dyn Visitor) {
///         visitor.visit_option(self.first);
///         visitor.visit_option(self.second);
///     }
/// }
///
/// let heap = Heap::new();
/// let leaf = heap.allocate(Pair { first: None, second: None }).unwrap();
/// let pair = heap.allocate(Pair { first: Some(leaf), second: None }).unwrap();
/// assert_eq!(pair.first, Some(leaf));
/// ```
pub trait Cell: 'static {
    /// Tag used when this cell is boxed into a [`Value`].
    const TAG: CellTag = CellTag::Cell;

    /// Whether [`Cell::must_survive_garbage_collection`] is overridden.
    const OVERRIDES_MUST_SURVIVE_GARBAGE_COLLECTION: bool = false;

    /// Whether [`Cell::finalize`] is overridden.
    const OVERRIDES_FINALIZE: bool = false;

    /// Name used in heap graphs and logs.
    fn class_name(&self) -> &'static str;

    /// Reports every outgoing strong reference to `visitor`.
    ///
    /// May run on a marking worker thread while the mutator is stopped.
    fn visit_edges(&self, _visitor: &mut dyn Visitor) {}

    /// Keeps the cell alive even when unreachable, e.g. while it is pinned
    /// across a foreign boundary. Only consulted when
    /// [`Cell::OVERRIDES_MUST_SURVIVE_GARBAGE_COLLECTION`] is set.
    fn must_survive_garbage_collection(&self) -> bool {
        false
    }

    /// Called once for an unreachable cell before any cell of the same
    /// collection is swept. Only invoked when [`Cell::OVERRIDES_FINALIZE`]
    /// is set.
    fn finalize(&self) {}
}

/// Receives the outgoing references of a cell.
pub trait Visitor {
    /// Visits one referenced cell.
    fn visit_cell(&mut self, cell: CellPtr);

    /// Visits the cell inside `value`, if any.
    fn visit_value(&mut self, value: Value) {
        if let Some(cell) = CellPtr::from_value(value) {
            self.visit_cell(cell);
        }
    }
}

impl<'a> dyn Visitor + 'a {
    /// Visits a typed reference.
    pub fn visit<T: Cell>(&mut self, cell: GcRef<T>) {
        self.visit_cell(cell.cell());
    }

    /// Visits a nullable typed reference.
    pub fn visit_option<T: Cell>(&mut self, cell: Option<GcRef<T>>) {
        if let Some(cell) = cell {
            self.visit_cell(cell.cell());
        }
    }
}

/// Liveness of a cell slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum CellState {
    /// Holds a value.
    Live,
    /// Free, either on the free list or never handed out.
    Dead,
}

/// Type-erased operations for one cell type.
pub(crate) struct CellVTable {
    pub(crate) type_id: fn() -> TypeId,
    pub(crate) size: usize,
    pub(crate) overrides_must_survive: bool,
    pub(crate) overrides_finalize: bool,
    class_name: unsafe fn(CellPtr) -> &'static str,
    visit_edges: unsafe fn(CellPtr, &mut dyn Visitor),
    must_survive: unsafe fn(CellPtr) -> bool,
    finalize: unsafe fn(CellPtr),
    drop_in_place: unsafe fn(CellPtr),
}

struct VTableFor<T>(PhantomData<T>);

impl<T: Cell> VTableFor<T> {
    const VTABLE: CellVTable = CellVTable {
        type_id: TypeId::of::<T>,
        size: std::mem::size_of::<CellSlot<T>>(),
        overrides_must_survive: T::OVERRIDES_MUST_SURVIVE_GARBAGE_COLLECTION,
        overrides_finalize: T::OVERRIDES_FINALIZE,
        class_name: class_name_of::<T>,
        visit_edges: visit_edges_of::<T>,
        must_survive: must_survive_of::<T>,
        finalize: finalize_of::<T>,
        drop_in_place: drop_in_place_of::<T>,
    };
}

unsafe fn class_name_of<T: Cell>(cell: CellPtr) -> &'static str {
    cell.value_unchecked::<T>().class_name()
}

unsafe fn visit_edges_of<T: Cell>(cell: CellPtr, visitor: &mut dyn Visitor) {
    cell.value_unchecked::<T>().visit_edges(visitor)
}

unsafe fn must_survive_of<T: Cell>(cell: CellPtr) -> bool {
    cell.value_unchecked::<T>().must_survive_garbage_collection()
}

unsafe fn finalize_of<T: Cell>(cell: CellPtr) {
    cell.value_unchecked::<T>().finalize()
}

unsafe fn drop_in_place_of<T: Cell>(cell: CellPtr) {
    let slot = cell.0.cast::<CellSlot<T>>().as_ptr();
    std::ptr::drop_in_place(std::ptr::addr_of_mut!((*slot).value));
}

pub(crate) fn vtable_of<T: Cell>() -> &'static CellVTable {
    &VTableFor::<T>::VTABLE
}

/// Per-slot bookkeeping placed in front of every cell.
#[repr(C)]
pub struct CellHeader {
    vtable: std::cell::Cell<Option<&'static CellVTable>>,
    state: std::cell::Cell<CellState>,
    generation: std::cell::Cell<u32>,
    next_free: std::cell::Cell<Option<CellPtr>>,
}

impl CellHeader {
    pub(crate) const fn dead() -> Self {
        CellHeader {
            vtable: std::cell::Cell::new(None),
            state: std::cell::Cell::new(CellState::Dead),
            generation: std::cell::Cell::new(0),
            next_free: std::cell::Cell::new(None),
        }
    }

    pub(crate) fn next_free(&self) -> Option<CellPtr> {
        self.next_free.get()
    }

    pub(crate) fn set_next_free(&self, next: Option<CellPtr>) {
        self.next_free.set(next);
    }

    pub(crate) fn mark_live(&self, vtable: &'static CellVTable) {
        self.vtable.set(Some(vtable));
        self.state.set(CellState::Live);
        self.next_free.set(None);
    }

    pub(crate) fn mark_dead(&self) {
        self.vtable.set(None);
        self.state.set(CellState::Dead);
        self.generation.set(self.generation.get().wrapping_add(1));
    }
}

#[repr(C)]
pub(crate) struct CellSlot<T> {
    header: CellHeader,
    value: T,
}

/// Size and alignment a slot for `T` needs, header included.
pub(crate) fn slot_layout<T: Cell>() -> std::alloc::Layout {
    std::alloc::Layout::new::<CellSlot<T>>()
}

/// Moves `value` into the slot of `cell` and makes the cell live.
///
/// # Safety
///
/// `cell` must be a freshly allocated dead slot at least
/// `size_of::<CellSlot<T>>()` bytes wide, aligned for `CellSlot<T>`.
pub(crate) unsafe fn initialize<T: Cell>(cell: CellPtr, value: T) -> GcRef<T> {
    let slot = cell.0.cast::<CellSlot<T>>();
    std::ptr::addr_of_mut!((*slot.as_ptr()).value).write(value);
    (*slot.as_ptr()).header.mark_live(vtable_of::<T>());
    GcRef::from_slot(slot)
}

/// Untyped address of a cell.
///
/// A `CellPtr` handed out by the heap stays readable for the heap's
/// lifetime: blocks are never returned to the system while the heap
/// exists, so the header can be inspected even after the cell died.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellPtr(NonNull<CellHeader>);

impl CellPtr {
    pub(crate) fn from_non_null(ptr: NonNull<CellHeader>) -> Self {
        CellPtr(ptr)
    }

    /// Recovers the cell referenced by a cell-valued [`Value`].
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_cell() {
            return None;
        }
        NonNull::new(value.as_cell_address() as *mut CellHeader).map(CellPtr)
    }

    /// Address of the cell; also its identity.
    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }

    pub(crate) fn as_ptr(self) -> *mut CellHeader {
        self.0.as_ptr()
    }

    pub(crate) fn header(&self) -> &CellHeader {
        // SAFETY: cell pointers only come from heap blocks, which outlive
        // every pointer into them; headers are initialized before a slot is
        // first handed out.
        unsafe { self.0.as_ref() }
    }

    /// Current liveness of the slot.
    pub fn state(self) -> CellState {
        self.header().state.get()
    }

    /// Generation of the slot; bumped every time the slot is freed.
    pub fn generation(self) -> u32 {
        self.header().generation.get()
    }

    pub(crate) fn vtable(self) -> Option<&'static CellVTable> {
        self.header().vtable.get()
    }

    /// Whether the cell currently holds a `T`.
    pub fn is<T: Cell>(self) -> bool {
        self.vtable()
            .is_some_and(|vtable| (vtable.type_id)() == TypeId::of::<T>())
    }

    /// Typed view of the cell, if it is a live `T`.
    pub fn downcast<T: Cell>(self) -> Option<GcRef<T>> {
        self.is::<T>().then(|| GcRef {
            ptr: self.0.cast(),
            _marker: PhantomData,
        })
    }

    /// Class name of a live cell, `"<dead>"` otherwise.
    pub fn class_name(self) -> &'static str {
        match self.vtable() {
            // SAFETY: a vtable is only installed while the slot holds a value
            // of the matching type.
            Some(vtable) => unsafe { (vtable.class_name)(self) },
            None => "<dead>",
        }
    }

    /// Size in bytes of the slot contents, 0 for a dead cell.
    pub fn size(self) -> usize {
        self.vtable().map_or(0, |vtable| vtable.size)
    }

    pub(crate) unsafe fn value_unchecked<'a, T>(self) -> &'a T {
        &(*self.0.cast::<CellSlot<T>>().as_ptr()).value
    }

    /// # Safety
    ///
    /// The mutator must be stopped and the cell live.
    pub(crate) unsafe fn visit_edges(self, visitor: &mut dyn Visitor) {
        if let Some(vtable) = self.vtable() {
            (vtable.visit_edges)(self, visitor);
        }
    }

    pub(crate) fn must_survive_garbage_collection(self) -> bool {
        match self.vtable() {
            // SAFETY: see `class_name`.
            Some(vtable) if vtable.overrides_must_survive => unsafe { (vtable.must_survive)(self) },
            _ => false,
        }
    }

    pub(crate) fn finalize(self) {
        if let Some(vtable) = self.vtable() {
            if vtable.overrides_finalize {
                // SAFETY: see `class_name`.
                unsafe { (vtable.finalize)(self) }
            }
        }
    }

    /// Runs the destructor of the value in place.
    ///
    /// # Safety
    ///
    /// The cell must be live and unreferenced by any code that will read it
    /// again; the slot is left uninitialized.
    pub(crate) unsafe fn drop_value(self) {
        if let Some(vtable) = self.vtable() {
            (vtable.drop_in_place)(self);
        }
    }
}

impl fmt::Debug for CellPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellPtr({:#x})", self.address())
    }
}

// SAFETY: a CellPtr is an address; marking workers only read headers and
// mark bits while the mutator is stopped.
unsafe impl Send for CellPtr {}

/// Non-owning typed reference to a heap cell.
///
/// Liveness is reachability: a `GcRef` held only on the Rust stack across an
/// allocation must be protected by a [`Root`](crate::Root) or a
/// [`DeferGc`](crate::DeferGc) scope.
pub struct GcRef<T: Cell> {
    ptr: NonNull<CellSlot<T>>,
    _marker: PhantomData<*const T>,
}

impl<T: Cell> GcRef<T> {
    pub(crate) fn from_slot(ptr: NonNull<CellSlot<T>>) -> Self {
        GcRef {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Untyped pointer to the same cell.
    pub fn cell(self) -> CellPtr {
        CellPtr(self.ptr.cast())
    }

    /// Address of the cell.
    pub fn address(self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Identity comparison.
    pub fn ptr_eq(a: Self, b: Self) -> bool {
        a.ptr == b.ptr
    }

    /// Boxes the reference into a [`Value`] tagged with `T::TAG`.
    pub fn to_value(self) -> Value {
        Value::from_cell_address(T::TAG, self.address())
    }

    /// Recovers a typed reference from a [`Value`], if it holds a live `T`.
    pub fn from_value(value: Value) -> Option<Self> {
        CellPtr::from_value(value)?.downcast::<T>()
    }

    /// Creates a weak reference to the cell.
    pub fn downgrade(self) -> Weak<T> {
        Weak {
            ptr: self.ptr,
            generation: self.cell().generation(),
        }
    }
}

impl<T: Cell> Deref for GcRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a GcRef is only created for a live, initialized slot; the
        // embedder keeps it reachable while it is dereferenced.
        unsafe { &self.ptr.as_ref().value }
    }
}

impl<T: Cell> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Cell> Copy for GcRef<T> {}

impl<T: Cell> PartialEq for GcRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: Cell> Eq for GcRef<T> {}

impl<T: Cell> Hash for GcRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
    }
}

impl<T: Cell> fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRef<{}>({:#x})", std::any::type_name::<T>(), self.address())
    }
}

/// Reference that does not keep its target alive.
///
/// Stores the slot address together with the slot generation observed at
/// creation. A freed slot bumps its generation, so a weak reference can never
/// resolve to a different cell that later reuses the same address.
pub struct Weak<T: Cell> {
    ptr: NonNull<CellSlot<T>>,
    generation: u32,
}

impl<T: Cell> Weak<T> {
    /// Returns the target if it is still alive.
    pub fn upgrade(&self) -> Option<GcRef<T>> {
        self.is_alive().then(|| GcRef::from_slot(self.ptr))
    }

    /// Whether the target is still alive.
    pub fn is_alive(&self) -> bool {
        let cell = CellPtr(self.ptr.cast());
        cell.state() == CellState::Live && cell.generation() == self.generation
    }

    /// Address the reference was created for, alive or not.
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Whether this references `cell` and the cell is still alive.
    pub fn points_to(&self, cell: GcRef<T>) -> bool {
        self.ptr == cell.ptr && self.is_alive()
    }
}

impl<T: Cell> Clone for Weak<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Cell> Copy for Weak<T> {}

impl<T: Cell> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weak")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("generation", &self.generation)
            .field("alive", &self.is_alive())
            .finish()
    }
}
