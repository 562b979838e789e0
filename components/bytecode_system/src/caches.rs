//! Per-callsite caches stored in an executable.
//!
//! Each property access site owns a [`PropertyLookupCache`] that moves
//! through uninitialized, monomorphic, polymorphic and megamorphic states as
//! it sees more shapes. Once megamorphic, the site stops caching and the
//! interpreter goes straight to the shared megamorphic table.
//!
//! Shapes are held weakly: a cache entry never keeps a shape alive, and an
//! entry whose shape died simply stops matching.

use arrayvec::ArrayVec;
use memory_manager::{GcRef, Object, PropertyMetadata, PrototypeChainValidity, Shape, Visitor, Weak};

/// Entries a polymorphic site holds before going megamorphic.
pub const POLYMORPHIC_ENTRY_COUNT: usize = 4;

/// One cached (shape → property location) pair.
#[derive(Debug, Clone, Copy)]
pub struct PropertyLookupCacheEntry {
    /// Shape of the receiver
    pub shape: Weak<Shape>,
    /// Dictionary generation of `shape` when the entry was made
    pub shape_dictionary_generation: u64,
    /// Object on the prototype chain holding the property; `None` for own
    /// properties
    pub prototype: Option<Weak<Object>>,
    /// Validity of the receiver's prototype chain; set for prototype hits
    pub prototype_chain_validity: Option<Weak<PrototypeChainValidity>>,
    /// Location of the property in its holder
    pub metadata: PropertyMetadata,
}

impl PropertyLookupCacheEntry {
    /// An entry for an own property of an object with `shape`.
    pub fn own(shape: GcRef<Shape>, metadata: PropertyMetadata) -> Self {
        PropertyLookupCacheEntry {
            shape: shape.downgrade(),
            shape_dictionary_generation: shape.dictionary_generation(),
            prototype: None,
            prototype_chain_validity: None,
            metadata,
        }
    }

    /// An entry for a property found on `holder`, further up the prototype
    /// chain of an object with `shape`.
    pub fn inherited(
        shape: GcRef<Shape>,
        holder: GcRef<Object>,
        validity: GcRef<PrototypeChainValidity>,
        metadata: PropertyMetadata,
    ) -> Self {
        PropertyLookupCacheEntry {
            prototype: Some(holder.downgrade()),
            prototype_chain_validity: Some(validity.downgrade()),
            ..Self::own(shape, metadata)
        }
    }

    /// Whether the entry still describes objects with `shape`.
    fn validate(&self, shape: GcRef<Shape>) -> Option<CachedProperty> {
        if !self.shape.points_to(shape) {
            return None;
        }
        if shape.is_dictionary() && shape.dictionary_generation() != self.shape_dictionary_generation {
            return None;
        }
        let holder = match self.prototype {
            None => None,
            Some(prototype) => {
                let validity = self.prototype_chain_validity?.upgrade()?;
                if !validity.is_valid() {
                    return None;
                }
                Some(prototype.upgrade()?)
            }
        };
        Some(CachedProperty {
            holder,
            metadata: self.metadata,
        })
    }

    fn is_alive(&self) -> bool {
        self.shape.is_alive()
    }
}

/// A validated cache hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedProperty {
    /// Prototype holding the property; `None` when it is the receiver's own
    pub holder: Option<GcRef<Object>>,
    /// Location of the property in its holder
    pub metadata: PropertyMetadata,
}

/// Inline cache of one property access site.
#[derive(Debug, Clone, Default)]
pub enum PropertyLookupCache {
    /// No shape seen yet
    #[default]
    Uninitialized,
    /// One shape seen (the common case)
    Monomorphic(PropertyLookupCacheEntry),
    /// Several shapes seen, up to [`POLYMORPHIC_ENTRY_COUNT`]
    Polymorphic(ArrayVec<PropertyLookupCacheEntry, POLYMORPHIC_ENTRY_COUNT>),
    /// Too many shapes; the site no longer caches
    Megamorphic,
}

impl PropertyLookupCache {
    /// Create a new uninitialized cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the site gave up on per-site caching.
    pub fn is_megamorphic(&self) -> bool {
        matches!(self, PropertyLookupCache::Megamorphic)
    }

    /// Number of entries held.
    pub fn entry_count(&self) -> usize {
        match self {
            PropertyLookupCache::Monomorphic(_) => 1,
            PropertyLookupCache::Polymorphic(entries) => entries.len(),
            _ => 0,
        }
    }

    /// The first entry that validates for `shape`.
    pub fn lookup(&self, shape: GcRef<Shape>) -> Option<CachedProperty> {
        match self {
            PropertyLookupCache::Monomorphic(entry) => entry.validate(shape),
            PropertyLookupCache::Polymorphic(entries) => entries.iter().find_map(|entry| entry.validate(shape)),
            _ => None,
        }
    }

    /// Records `entry`, replacing any entry for the same shape.
    ///
    /// State transitions:
    /// - Uninitialized → Monomorphic
    /// - Monomorphic → Polymorphic (if different shape)
    /// - Polymorphic → Megamorphic (if more than four live shapes)
    pub fn update(&mut self, entry: PropertyLookupCacheEntry) {
        match self {
            PropertyLookupCache::Uninitialized => {
                *self = PropertyLookupCache::Monomorphic(entry);
            }
            PropertyLookupCache::Monomorphic(cached) => {
                if !cached.is_alive() || cached.shape.address() == entry.shape.address() {
                    *cached = entry;
                } else {
                    let mut entries = ArrayVec::new();
                    entries.push(*cached);
                    entries.push(entry);
                    *self = PropertyLookupCache::Polymorphic(entries);
                }
            }
            PropertyLookupCache::Polymorphic(entries) => {
                entries.retain(|cached| cached.is_alive() && cached.shape.address() != entry.shape.address());
                if entries.try_push(entry).is_err() {
                    *self = PropertyLookupCache::Megamorphic;
                }
            }
            PropertyLookupCache::Megamorphic => {}
        }
    }
}

/// Cache of one global-variable access site: where the variable lives in
/// the global object, keyed by the global object's shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalVariableCache {
    shape: Option<Weak<Shape>>,
    dictionary_generation: u64,
    offset: u32,
}

impl GlobalVariableCache {
    /// Storage offset of the variable if the global object still has `shape`
    /// (and, for dictionaries, the same generation).
    pub fn lookup(&self, shape: GcRef<Shape>) -> Option<u32> {
        let cached = self.shape?;
        if !cached.points_to(shape) {
            return None;
        }
        if shape.is_dictionary() && shape.dictionary_generation() != self.dictionary_generation {
            return None;
        }
        Some(self.offset)
    }

    /// Remembers `offset` for `shape`.
    pub fn update(&mut self, shape: GcRef<Shape>, offset: u32) {
        *self = GlobalVariableCache {
            shape: Some(shape.downgrade()),
            dictionary_generation: shape.dictionary_generation(),
            offset,
        };
    }
}

/// Cache of the shape an object literal site ends up with.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectShapeCache {
    shape: Option<Weak<Shape>>,
}

impl ObjectShapeCache {
    /// The cached shape, if it is still alive.
    pub fn get(&self) -> Option<GcRef<Shape>> {
        self.shape?.upgrade()
    }

    /// Remembers `shape`.
    pub fn set(&mut self, shape: GcRef<Shape>) {
        self.shape = Some(shape.downgrade());
    }
}

/// Cache of the object a template literal site evaluates to. The object is
/// created once per site and kept alive by the executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateObjectCache {
    object: Option<GcRef<Object>>,
}

impl TemplateObjectCache {
    /// The cached object.
    pub fn get(&self) -> Option<GcRef<Object>> {
        self.object
    }

    /// Stores `object`.
    pub fn set(&mut self, object: GcRef<Object>) {
        self.object = Some(object);
    }

    pub(crate) fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit_option(self.object);
    }
}
