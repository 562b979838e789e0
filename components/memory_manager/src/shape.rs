//! Shapes (hidden classes) and the transition graph between them.
//!
//! Objects with the same properties, added in the same order with the same
//! attributes, share a shape. Every structural change moves an object along
//! a transition to a child shape; transitions are cached on the parent so
//! identical mutation sequences converge on identical shapes.
//!
//! Ownership runs one way: a child traces its `previous` shape (its property
//! table is rebuilt from that chain), while the transition caches on the
//! parent hold children weakly and never keep them alive.
//!
//! A shape leaves the shared graph and becomes a dictionary once its chain
//! grows deeper, or its parent fans out wider, than [`ShapeConfig`] allows.
//! Dictionaries own their table privately and are mutated in place; each
//! mutation bumps [`Shape::dictionary_generation`] so cached lookups against
//! the old layout stop validating.

use crate::cell::{Cell, GcRef, Visitor, Weak};
use crate::config::ShapeConfig;
use crate::heap::Heap;
use crate::object::Object;
use crate::property::{PropertyAttributes, PropertyKey, PropertyMetadata};
use crate::prototype_chain_validity::PrototypeChainValidity;
use core_types::RuntimeResult;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::Serialize;
use std::cell::{Cell as Mutable, RefCell, RefMut};
use std::fmt;
use std::hash::{BuildHasherDefault, Hash};

/// Property table of a shape, in storage order.
pub type PropertyTable = IndexMap<PropertyKey, PropertyMetadata, BuildHasherDefault<FxHasher>>;

type TransitionCache<K> = RefCell<Option<FxHashMap<K, Weak<Shape>>>>;

/// The structural change that produced a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransitionType {
    /// Root of a lineage; no properties
    Root,
    /// Added a property
    Put,
    /// Changed the attributes of a property
    Configure,
    /// Changed the prototype
    Prototype,
    /// Removed a property
    Delete,
    /// Left the shared graph; mutated in place and cacheable by generation
    CacheableDictionary,
    /// Left the shared graph; never cached
    UncacheableDictionary,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransitionKey {
    key: PropertyKey,
    attributes: PropertyAttributes,
}

/// A hidden class.
pub struct Shape {
    config: ShapeConfig,
    transition_type: TransitionType,
    previous: Option<GcRef<Shape>>,
    property_key: Option<PropertyKey>,
    attributes: PropertyAttributes,
    depth: u32,
    property_count: Mutable<u32>,
    property_table: RefCell<Option<PropertyTable>>,
    dictionary_generation: Mutable<u64>,
    prototype: Mutable<Option<GcRef<Object>>>,
    prototype_chain_validity: Mutable<Option<GcRef<PrototypeChainValidity>>>,
    is_prototype_shape: Mutable<bool>,
    forward_transitions: TransitionCache<TransitionKey>,
    prototype_transitions: TransitionCache<usize>,
    delete_transitions: TransitionCache<PropertyKey>,
}

impl Shape {
    fn blank(config: ShapeConfig, transition_type: TransitionType, prototype: Option<GcRef<Object>>) -> Self {
        Shape {
            config,
            transition_type,
            previous: None,
            property_key: None,
            attributes: PropertyAttributes::empty(),
            depth: 0,
            property_count: Mutable::new(0),
            property_table: RefCell::new(None),
            dictionary_generation: Mutable::new(0),
            prototype: Mutable::new(prototype),
            prototype_chain_validity: Mutable::new(None),
            is_prototype_shape: Mutable::new(false),
            forward_transitions: RefCell::new(None),
            prototype_transitions: RefCell::new(None),
            delete_transitions: RefCell::new(None),
        }
    }

    /// Allocates an empty root shape.
    ///
    /// Every shape derived from it inherits `config`. A `prototype` is
    /// turned into a prototype object first, so that changes to it
    /// invalidate the chains of objects built on this root.
    pub fn create_root(heap: &Heap, config: ShapeConfig, prototype: Option<GcRef<Object>>) -> RuntimeResult<GcRef<Shape>> {
        convert_to_prototype(heap, prototype)?;
        let root = Shape::blank(config, TransitionType::Root, prototype);
        *root.property_table.borrow_mut() = Some(PropertyTable::default());
        heap.allocate(root)
    }

    /// Thresholds inherited from the root of this lineage.
    pub fn config(&self) -> ShapeConfig {
        self.config
    }

    /// The transition that produced this shape.
    pub fn transition_type(&self) -> TransitionType {
        self.transition_type
    }

    /// The shape this one was derived from; `None` for roots, dictionaries
    /// and prototype shapes, which own their table.
    pub fn previous(&self) -> Option<GcRef<Shape>> {
        self.previous
    }

    /// Transitions between this shape and the nearest shape owning a table.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of properties.
    pub fn property_count(&self) -> u32 {
        self.property_count.get()
    }

    /// Prototype of every object with this shape.
    pub fn prototype(&self) -> Option<GcRef<Object>> {
        self.prototype.get()
    }

    /// Whether the shape owns its table and mutates in place.
    pub fn is_dictionary(&self) -> bool {
        matches!(
            self.transition_type,
            TransitionType::CacheableDictionary | TransitionType::UncacheableDictionary
        )
    }

    /// A dictionary whose lookups may be cached against its generation.
    pub fn is_cacheable_dictionary(&self) -> bool {
        self.transition_type == TransitionType::CacheableDictionary
    }

    /// A dictionary whose lookups must never be cached.
    pub fn is_uncacheable_dictionary(&self) -> bool {
        self.transition_type == TransitionType::UncacheableDictionary
    }

    /// Whether lookups on this shape may be cached at all.
    pub fn is_cacheable(&self) -> bool {
        !self.is_uncacheable_dictionary()
    }

    /// Bumped on every in-place mutation of a dictionary; always 0 otherwise.
    pub fn dictionary_generation(&self) -> u64 {
        self.dictionary_generation.get()
    }

    /// Whether the shape belongs to an object that serves as a prototype.
    /// Such shapes are never shared.
    pub fn is_prototype_shape(&self) -> bool {
        self.is_prototype_shape.get()
    }

    /// Current validity flag for the prototype chain of this shape, if one
    /// was ever requested.
    pub fn prototype_chain_validity(&self) -> Option<GcRef<PrototypeChainValidity>> {
        self.prototype_chain_validity.get()
    }

    /// Live entries in the put/configure transition cache.
    pub fn forward_transition_count(&self) -> usize {
        self.forward_transitions
            .borrow()
            .as_ref()
            .map_or(0, |transitions| transitions.values().filter(|weak| weak.is_alive()).count())
    }

    /// Location and attributes of `key`, materializing the table if needed.
    ///
    /// # Panics
    ///
    /// Panics if called while the table is being mutated.
    pub fn lookup(&self, key: &PropertyKey) -> Option<PropertyMetadata> {
        self.ensure_property_table();
        let table = self
            .property_table
            .try_borrow()
            .unwrap_or_else(|_| panic!("shape looked up while its table is being mutated"));
        table.as_ref().and_then(|table| table.get(key).copied())
    }

    /// Calls `f` for every property, in storage order.
    pub fn for_each_property(&self, mut f: impl FnMut(&PropertyKey, PropertyMetadata)) {
        self.ensure_property_table();
        if let Some(table) = self.property_table.borrow().as_ref() {
            for (key, metadata) in table {
                f(key, *metadata);
            }
        }
    }

    /// Property keys in storage order.
    pub fn property_keys(&self) -> Vec<PropertyKey> {
        let mut keys = Vec::with_capacity(self.property_count() as usize);
        self.for_each_property(|key, _| keys.push(key.clone()));
        keys
    }

    /// Whether the table has been built.
    pub fn has_materialized_table(&self) -> bool {
        self.property_table.borrow().is_some()
    }

    fn ensure_property_table(&self) {
        if self.has_materialized_table() {
            return;
        }
        let mut chain = Vec::new();
        let mut cursor = self.previous;
        let mut table = loop {
            let Some(shape) = cursor else {
                break PropertyTable::default();
            };
            let materialized = shape.property_table.borrow().clone();
            if let Some(table) = materialized {
                break table;
            }
            chain.push(shape);
            cursor = shape.previous;
        };
        for shape in chain.iter().rev() {
            shape.apply_transition(&mut table);
        }
        self.apply_transition(&mut table);
        *self.property_table.borrow_mut() = Some(table);
    }

    fn apply_transition(&self, table: &mut PropertyTable) {
        let Some(key) = &self.property_key else {
            return;
        };
        match self.transition_type {
            TransitionType::Put => {
                let offset = table.len() as u32;
                table.insert(
                    key.clone(),
                    PropertyMetadata {
                        offset,
                        attributes: self.attributes,
                    },
                );
            }
            TransitionType::Configure => {
                if let Some(metadata) = table.get_mut(key) {
                    metadata.attributes = self.attributes;
                }
            }
            TransitionType::Delete => {
                remove_and_renumber(table, key);
            }
            _ => {}
        }
    }

    fn table_mut(&self) -> RefMut<'_, PropertyTable> {
        self.ensure_property_table();
        RefMut::map(self.property_table.borrow_mut(), |table| {
            table.get_or_insert_with(PropertyTable::default)
        })
    }

    fn assert_dictionary(&self, operation: &str) {
        assert!(self.is_dictionary(), "{operation} on a shape that is not a dictionary");
    }

    fn bump_generation(&self) {
        self.dictionary_generation.set(self.dictionary_generation.get() + 1);
    }

    /// Adds a property to a dictionary in place.
    ///
    /// # Panics
    ///
    /// Panics if the shape is not a dictionary.
    pub fn add_property_without_transition(&self, key: PropertyKey, attributes: PropertyAttributes) -> PropertyMetadata {
        self.assert_dictionary("in-place add");
        let mut table = self.table_mut();
        let metadata = PropertyMetadata {
            offset: table.len() as u32,
            attributes,
        };
        table.insert(key, metadata);
        self.property_count.set(table.len() as u32);
        drop(table);
        self.bump_generation();
        metadata
    }

    /// Changes the attributes of a dictionary property in place.
    ///
    /// # Panics
    ///
    /// Panics if the shape is not a dictionary.
    pub fn set_property_attributes_without_transition(&self, key: &PropertyKey, attributes: PropertyAttributes) {
        self.assert_dictionary("in-place reconfigure");
        if let Some(metadata) = self.table_mut().get_mut(key) {
            metadata.attributes = attributes;
        }
        self.bump_generation();
    }

    /// Removes a dictionary property in place; later offsets shift down.
    ///
    /// # Panics
    ///
    /// Panics if the shape is not a dictionary.
    pub fn remove_property_without_transition(&self, key: &PropertyKey) -> Option<PropertyMetadata> {
        self.assert_dictionary("in-place delete");
        let mut table = self.table_mut();
        let removed = remove_and_renumber(&mut table, key);
        self.property_count.set(table.len() as u32);
        drop(table);
        self.bump_generation();
        removed
    }

    /// Replaces the prototype of a dictionary in place.
    ///
    /// # Panics
    ///
    /// Panics if the shape is not a dictionary.
    pub fn set_prototype_without_transition(&self, heap: &Heap, prototype: Option<GcRef<Object>>) -> RuntimeResult<()> {
        self.assert_dictionary("in-place prototype change");
        convert_to_prototype(heap, prototype)?;
        self.prototype.set(prototype);
        if let Some(validity) = self.prototype_chain_validity.take() {
            validity.set_invalid();
        }
        self.bump_generation();
        Ok(())
    }

    /// Whether adding `key` should first move the object to a dictionary.
    ///
    /// False when a matching transition is already cached: reusing it costs
    /// nothing.
    pub fn wants_dictionary_before_put(&self, key: &PropertyKey, attributes: PropertyAttributes) -> bool {
        if self.is_dictionary() || self.is_prototype_shape() {
            return false;
        }
        let transition = TransitionKey {
            key: key.clone(),
            attributes,
        };
        if cached_transition(&self.forward_transitions, &transition).is_some() {
            return false;
        }
        self.depth >= self.config.dictionary_depth_threshold
            || self.forward_transition_count() >= self.config.dictionary_fanout_threshold
    }
}

fn convert_to_prototype(heap: &Heap, prototype: Option<GcRef<Object>>) -> RuntimeResult<()> {
    match prototype {
        Some(prototype) => prototype.convert_to_prototype_if_needed(heap),
        None => Ok(()),
    }
}

fn remove_and_renumber(table: &mut PropertyTable, key: &PropertyKey) -> Option<PropertyMetadata> {
    let removed = table.shift_remove(key)?;
    for metadata in table.values_mut() {
        if metadata.offset > removed.offset {
            metadata.offset -= 1;
        }
    }
    Some(removed)
}

fn cached_transition<K: Hash + Eq>(cache: &TransitionCache<K>, key: &K) -> Option<GcRef<Shape>> {
    let mut cache = cache.borrow_mut();
    let transitions = cache.as_mut()?;
    let upgraded = transitions.get(key)?.upgrade();
    if upgraded.is_none() {
        transitions.remove(key);
    }
    upgraded
}

fn remember_transition<K: Hash + Eq>(cache: &TransitionCache<K>, key: K, shape: GcRef<Shape>) {
    let mut cache = cache.borrow_mut();
    let transitions = cache.get_or_insert_with(FxHashMap::default);
    transitions.retain(|_, weak| weak.is_alive());
    transitions.insert(key, shape.downgrade());
}

impl GcRef<Shape> {
    fn derive_child(
        self,
        transition_type: TransitionType,
        property_key: Option<PropertyKey>,
        attributes: PropertyAttributes,
        prototype: Option<GcRef<Object>>,
    ) -> Shape {
        let property_count = match transition_type {
            TransitionType::Put => self.property_count() + 1,
            TransitionType::Delete => self.property_count() - 1,
            _ => self.property_count(),
        };
        Shape {
            previous: Some(self),
            property_key,
            attributes,
            depth: self.depth + 1,
            property_count: Mutable::new(property_count),
            ..Shape::blank(self.config, transition_type, prototype)
        }
    }

    /// A shape owning a copy of this table with one transition applied.
    fn derive_unique(
        self,
        transition_type: TransitionType,
        property_key: Option<PropertyKey>,
        attributes: PropertyAttributes,
        prototype: Option<GcRef<Object>>,
        is_prototype_shape: bool,
    ) -> Shape {
        self.ensure_property_table();
        let mut table = self.property_table.borrow().clone().unwrap_or_default();
        let shape = Shape {
            property_key,
            attributes,
            ..Shape::blank(self.config, transition_type, prototype)
        };
        shape.apply_transition(&mut table);
        shape.property_count.set(table.len() as u32);
        *shape.property_table.borrow_mut() = Some(table);
        shape.is_prototype_shape.set(is_prototype_shape);
        shape
    }

    fn forward_transition(
        self,
        heap: &Heap,
        transition_type: TransitionType,
        key: PropertyKey,
        attributes: PropertyAttributes,
    ) -> RuntimeResult<GcRef<Shape>> {
        if self.is_prototype_shape() {
            return heap.allocate(self.derive_unique(transition_type, Some(key), attributes, self.prototype(), true));
        }
        let transition = TransitionKey { key, attributes };
        if let Some(existing) = cached_transition(&self.forward_transitions, &transition) {
            return Ok(existing);
        }
        let child = heap.allocate(self.derive_child(
            transition_type,
            Some(transition.key.clone()),
            attributes,
            self.prototype(),
        ))?;
        remember_transition(&self.forward_transitions, transition, child);
        Ok(child)
    }

    /// The shape of an object after adding `key` with `attributes`.
    ///
    /// Returns the cached child if an identical transition is still alive.
    ///
    /// # Panics
    ///
    /// Panics on a dictionary, or if `key` is already present.
    pub fn create_put_transition(
        self,
        heap: &Heap,
        key: PropertyKey,
        attributes: PropertyAttributes,
    ) -> RuntimeResult<GcRef<Shape>> {
        assert!(!self.is_dictionary(), "put transition from a dictionary shape");
        assert!(self.lookup(&key).is_none(), "put transition for existing property {key}");
        self.forward_transition(heap, TransitionType::Put, key, attributes)
    }

    /// The shape of an object after changing the attributes of `key`.
    ///
    /// # Panics
    ///
    /// Panics on a dictionary, or if `key` is absent.
    pub fn create_configure_transition(
        self,
        heap: &Heap,
        key: PropertyKey,
        attributes: PropertyAttributes,
    ) -> RuntimeResult<GcRef<Shape>> {
        assert!(!self.is_dictionary(), "configure transition from a dictionary shape");
        assert!(self.lookup(&key).is_some(), "configure transition for missing property {key}");
        self.forward_transition(heap, TransitionType::Configure, key, attributes)
    }

    /// The shape of an object after removing `key`.
    ///
    /// # Panics
    ///
    /// Panics on a dictionary, or if `key` is absent.
    pub fn create_delete_transition(self, heap: &Heap, key: PropertyKey) -> RuntimeResult<GcRef<Shape>> {
        assert!(!self.is_dictionary(), "delete transition from a dictionary shape");
        assert!(self.lookup(&key).is_some(), "delete transition for missing property {key}");
        if self.is_prototype_shape() {
            return heap.allocate(self.derive_unique(
                TransitionType::Delete,
                Some(key),
                PropertyAttributes::empty(),
                self.prototype(),
                true,
            ));
        }
        if let Some(existing) = cached_transition(&self.delete_transitions, &key) {
            return Ok(existing);
        }
        let child = heap.allocate(self.derive_child(
            TransitionType::Delete,
            Some(key.clone()),
            PropertyAttributes::empty(),
            self.prototype(),
        ))?;
        remember_transition(&self.delete_transitions, key, child);
        Ok(child)
    }

    /// The shape of an object after its prototype becomes `prototype`.
    ///
    /// # Panics
    ///
    /// Panics on a dictionary.
    pub fn create_prototype_transition(self, heap: &Heap, prototype: Option<GcRef<Object>>) -> RuntimeResult<GcRef<Shape>> {
        assert!(!self.is_dictionary(), "prototype transition from a dictionary shape");
        convert_to_prototype(heap, prototype)?;
        if self.is_prototype_shape() {
            return heap.allocate(self.derive_unique(
                TransitionType::Prototype,
                None,
                PropertyAttributes::empty(),
                prototype,
                true,
            ));
        }
        // The child traces its prototype, so the address cannot be reused
        // while the cached child is alive.
        let key = prototype.map_or(0, |prototype| prototype.address());
        if let Some(existing) = cached_transition(&self.prototype_transitions, &key) {
            return Ok(existing);
        }
        let child = heap.allocate(self.derive_child(
            TransitionType::Prototype,
            None,
            PropertyAttributes::empty(),
            prototype,
        ))?;
        remember_transition(&self.prototype_transitions, key, child);
        Ok(child)
    }

    /// A private copy of this shape that is cached by generation.
    pub fn create_cacheable_dictionary_transition(self, heap: &Heap) -> RuntimeResult<GcRef<Shape>> {
        self.create_dictionary(heap, TransitionType::CacheableDictionary)
    }

    /// A private copy of this shape that is never cached.
    pub fn create_uncacheable_dictionary_transition(self, heap: &Heap) -> RuntimeResult<GcRef<Shape>> {
        self.create_dictionary(heap, TransitionType::UncacheableDictionary)
    }

    fn create_dictionary(self, heap: &Heap, transition_type: TransitionType) -> RuntimeResult<GcRef<Shape>> {
        let dictionary = heap.allocate(self.derive_unique(
            transition_type,
            None,
            PropertyAttributes::empty(),
            self.prototype(),
            self.is_prototype_shape(),
        ))?;
        log::debug!(
            "shape {:#x} -> {:?} {:#x} ({} properties, depth {})",
            self.address(),
            transition_type,
            dictionary.address(),
            dictionary.property_count(),
            self.depth
        );
        Ok(dictionary)
    }

    /// A private copy of this shape flagged as a prototype shape.
    pub fn clone_for_prototype(self, heap: &Heap) -> RuntimeResult<GcRef<Shape>> {
        let transition_type = if self.is_dictionary() {
            self.transition_type
        } else {
            TransitionType::Prototype
        };
        heap.allocate(self.derive_unique(
            transition_type,
            None,
            PropertyAttributes::empty(),
            self.prototype(),
            true,
        ))
    }

    /// The validity flag for this shape's prototype chain, created on first
    /// request.
    pub fn ensure_prototype_chain_validity(self, heap: &Heap) -> RuntimeResult<GcRef<PrototypeChainValidity>> {
        if let Some(validity) = self.prototype_chain_validity.get() {
            return Ok(validity);
        }
        let validity = heap.allocate(PrototypeChainValidity::new())?;
        self.prototype_chain_validity.set(Some(validity));
        Ok(validity)
    }

    /// Invalidates every prototype chain that runs through an object with
    /// this shape, transitively.
    ///
    /// Must be called before the object leaves this shape, or after its
    /// table changed in place. Returns the number of flags flipped.
    pub fn invalidate_all_prototype_chains_leading_to_this(self, heap: &Heap) -> RuntimeResult<usize> {
        let _defer = heap.defer_gc();
        let mut invalidated = 0;
        let mut visited = FxHashSet::default();
        let mut work = vec![self];
        visited.insert(self.address());

        while let Some(changed) = work.pop() {
            let mut dependents = Vec::new();
            heap.for_each_live_cell_of_type::<Shape>(|shape| {
                let through_changed = shape
                    .prototype()
                    .is_some_and(|prototype| GcRef::ptr_eq(prototype.shape(), changed));
                if through_changed {
                    dependents.push(shape);
                }
            });
            for shape in dependents {
                if let Some(validity) = shape.prototype_chain_validity.get() {
                    validity.set_invalid();
                    shape
                        .prototype_chain_validity
                        .set(Some(heap.allocate(PrototypeChainValidity::new())?));
                    invalidated += 1;
                }
                if shape.is_prototype_shape() && visited.insert(shape.address()) {
                    work.push(shape);
                }
            }
        }
        if invalidated > 0 {
            log::debug!(
                "shape {:#x} changed: invalidated {invalidated} prototype chains",
                self.address()
            );
        }
        Ok(invalidated)
    }
}

impl Cell for Shape {
    fn class_name(&self) -> &'static str {
        "Shape"
    }

    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit_option(self.previous);
        visitor.visit_option(self.prototype.get());
        visitor.visit_option(self.prototype_chain_validity.get());
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("transition_type", &self.transition_type)
            .field("property_key", &self.property_key)
            .field("property_count", &self.property_count())
            .field("depth", &self.depth)
            .field("dictionary_generation", &self.dictionary_generation())
            .field("is_prototype_shape", &self.is_prototype_shape())
            .finish()
    }
}
