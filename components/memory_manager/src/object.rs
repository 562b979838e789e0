//! Heap objects: a shape plus a vector of property values.

use crate::cell::{Cell, GcRef, Visitor};
use crate::heap::Heap;
use crate::property::{PropertyAttributes, PropertyKey, PropertyMetadata};
use crate::shape::Shape;
use core_types::{CellTag, RuntimeResult, Value};
use std::cell::{Cell as Mutable, RefCell};
use std::fmt;

/// An object whose layout is described by its [`Shape`].
///
/// `storage[i]` holds the value of the property at offset `i`.
///
/// # Example
///
/// ```
/// use core_types::Value;
/// use memory_manager::{Heap, Object, PropertyKey, Shape, ShapeConfig};
///
/// let heap = Heap::new();
/// let root = Shape::create_root(&heap, ShapeConfig::default(), None).unwrap();
/// let object = heap.root(Object::create(&heap, root).unwrap());
///
/// object.put(&heap, PropertyKey::from("x"), Value::from_i32(1)).unwrap();
/// assert_eq!(object.get(&PropertyKey::from("x")), Some(Value::from_i32(1)));
/// ```
pub struct Object {
    shape: Mutable<GcRef<Shape>>,
    storage: RefCell<Vec<Value>>,
}

impl Object {
    /// Allocates an object of `shape`, every slot undefined.
    pub fn create(heap: &Heap, shape: GcRef<Shape>) -> RuntimeResult<GcRef<Object>> {
        heap.allocate(Object {
            shape: Mutable::new(shape),
            storage: RefCell::new(vec![Value::undefined(); shape.property_count() as usize]),
        })
    }

    /// Current shape.
    pub fn shape(&self) -> GcRef<Shape> {
        self.shape.get()
    }

    /// Current prototype.
    pub fn prototype(&self) -> Option<GcRef<Object>> {
        self.shape().prototype()
    }

    /// Number of stored property values.
    pub fn storage_len(&self) -> usize {
        self.storage.borrow().len()
    }

    /// Value at `offset`, as recorded by a shape lookup or a cache.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is outside the storage.
    pub fn get_direct(&self, offset: u32) -> Value {
        self.storage.borrow()[offset as usize]
    }

    /// Overwrites the value at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is outside the storage.
    pub fn put_direct(&self, offset: u32, value: Value) {
        self.storage.borrow_mut()[offset as usize] = value;
    }

    /// Metadata of an own property.
    pub fn own_property_metadata(&self, key: &PropertyKey) -> Option<PropertyMetadata> {
        self.shape().lookup(key)
    }

    /// Value of an own property.
    pub fn get_own(&self, key: &PropertyKey) -> Option<Value> {
        self.own_property_metadata(key)
            .map(|metadata| self.get_direct(metadata.offset))
    }

    /// Value of `key` on this object or the first prototype that has it.
    pub fn get(&self, key: &PropertyKey) -> Option<Value> {
        if let Some(value) = self.get_own(key) {
            return Some(value);
        }
        let mut cursor = self.prototype();
        while let Some(object) = cursor {
            if let Some(value) = object.get_own(key) {
                return Some(value);
            }
            cursor = object.prototype();
        }
        None
    }

    /// Own keys in storage order.
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        self.shape().property_keys()
    }

    /// Assigns `value` to `key`, adding the property if it is missing.
    ///
    /// Returns false, without storing, if the existing property is read-only
    /// or an accessor.
    pub fn put(&self, heap: &Heap, key: PropertyKey, value: Value) -> RuntimeResult<bool> {
        if let Some(metadata) = self.own_property_metadata(&key) {
            if !metadata.attributes.is_writable() || metadata.attributes.is_accessor() {
                return Ok(false);
            }
            self.put_direct(metadata.offset, value);
            return Ok(true);
        }
        self.add_property(heap, key, PropertyAttributes::DEFAULT, value)?;
        Ok(true)
    }

    /// Creates `key` with `attributes`, or reconfigures it if present, and
    /// stores `value`.
    pub fn define_property(
        &self,
        heap: &Heap,
        key: PropertyKey,
        value: Value,
        attributes: PropertyAttributes,
    ) -> RuntimeResult<PropertyMetadata> {
        let Some(existing) = self.own_property_metadata(&key) else {
            return self.add_property(heap, key, attributes, value);
        };
        if existing.attributes != attributes {
            let _defer = heap.defer_gc();
            let shape = self.shape();
            if shape.is_dictionary() {
                shape.set_property_attributes_without_transition(&key, attributes);
                self.did_change_shape_in_place(heap)?;
            } else {
                let next = shape.create_configure_transition(heap, key, attributes)?;
                self.set_shape(heap, next)?;
            }
        }
        self.put_direct(existing.offset, value);
        Ok(PropertyMetadata {
            offset: existing.offset,
            attributes,
        })
    }

    fn add_property(
        &self,
        heap: &Heap,
        key: PropertyKey,
        attributes: PropertyAttributes,
        value: Value,
    ) -> RuntimeResult<PropertyMetadata> {
        let _defer = heap.defer_gc();
        let shape = self.shape();
        if shape.wants_dictionary_before_put(&key, attributes) {
            let dictionary = shape.create_cacheable_dictionary_transition(heap)?;
            self.set_shape(heap, dictionary)?;
        }

        let shape = self.shape();
        let metadata = if shape.is_dictionary() {
            let metadata = shape.add_property_without_transition(key, attributes);
            self.did_change_shape_in_place(heap)?;
            metadata
        } else {
            let next = shape.create_put_transition(heap, key.clone(), attributes)?;
            self.set_shape(heap, next)?;
            next.lookup(&key).unwrap_or_else(|| unreachable!("put transition lost {key}"))
        };

        let mut storage = self.storage.borrow_mut();
        debug_assert_eq!(metadata.offset as usize, storage.len());
        storage.push(value);
        Ok(metadata)
    }

    /// Removes an own property.
    ///
    /// Returns false if the property exists but is not configurable. A
    /// cacheable dictionary becomes uncacheable on its first delete.
    pub fn delete(&self, heap: &Heap, key: &PropertyKey) -> RuntimeResult<bool> {
        let Some(metadata) = self.own_property_metadata(key) else {
            return Ok(true);
        };
        if !metadata.attributes.is_configurable() {
            return Ok(false);
        }

        let _defer = heap.defer_gc();
        let shape = self.shape();
        if shape.is_dictionary() {
            if shape.is_cacheable_dictionary() {
                let uncacheable = shape.create_uncacheable_dictionary_transition(heap)?;
                self.set_shape(heap, uncacheable)?;
            }
            self.shape().remove_property_without_transition(key);
            self.did_change_shape_in_place(heap)?;
        } else {
            let next = shape.create_delete_transition(heap, key.clone())?;
            self.set_shape(heap, next)?;
        }
        self.storage.borrow_mut().remove(metadata.offset as usize);
        Ok(true)
    }

    /// Replaces the prototype, turning `prototype` into a prototype object
    /// if it is not one yet.
    pub fn set_prototype(&self, heap: &Heap, prototype: Option<GcRef<Object>>) -> RuntimeResult<()> {
        let current = self.prototype();
        if current.map(GcRef::address) == prototype.map(GcRef::address) {
            return Ok(());
        }
        let _defer = heap.defer_gc();
        if let Some(prototype) = prototype {
            prototype.convert_to_prototype_if_needed(heap)?;
        }
        let shape = self.shape();
        if shape.is_dictionary() {
            shape.set_prototype_without_transition(heap, prototype)?;
            self.did_change_shape_in_place(heap)?;
        } else {
            let next = shape.create_prototype_transition(heap, prototype)?;
            self.set_shape(heap, next)?;
        }
        Ok(())
    }

    /// Gives the object a private prototype shape, so that changes to it can
    /// be tracked by the objects that inherit from it.
    pub fn convert_to_prototype_if_needed(&self, heap: &Heap) -> RuntimeResult<()> {
        let shape = self.shape();
        if shape.is_prototype_shape() {
            return Ok(());
        }
        let prototype_shape = shape.clone_for_prototype(heap)?;
        self.shape.set(prototype_shape);
        Ok(())
    }

    /// Moves the object to `shape`, invalidating prototype chains that
    /// depended on the old one.
    pub fn set_shape(&self, heap: &Heap, shape: GcRef<Shape>) -> RuntimeResult<()> {
        let old = self.shape();
        if old.is_prototype_shape() {
            old.invalidate_all_prototype_chains_leading_to_this(heap)?;
        }
        self.shape.set(shape);
        Ok(())
    }

    fn did_change_shape_in_place(&self, heap: &Heap) -> RuntimeResult<()> {
        let shape = self.shape();
        if shape.is_prototype_shape() {
            shape.invalidate_all_prototype_chains_leading_to_this(heap)?;
        }
        Ok(())
    }
}

impl Cell for Object {
    const TAG: CellTag = CellTag::Object;

    fn class_name(&self) -> &'static str {
        "Object"
    }

    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit(self.shape.get());
        for &value in self.storage.borrow().iter() {
            visitor.visit_value(value);
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("shape", &self.shape())
            .field("storage", &self.storage.borrow())
            .finish()
    }
}
