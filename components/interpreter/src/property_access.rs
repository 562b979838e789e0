//! Property access fast paths
//!
//! Every access first asks the access site's own cache, then the shared
//! megamorphic cache once the site has given up on per-site caching, and
//! finally the authoritative shape lookup. Whatever the slow path finds is
//! written back so the next access with the same shape is a hit.
//!
//! Hits further up the prototype chain are only cached per site, where the
//! entry carries the receiver shape's prototype-chain validity flag.

use crate::vm::VM;
use bytecode_system::{Executable, PropertyLookupCacheEntry};
use core_types::{RuntimeResult, Value};
use memory_manager::{GcRef, Object, PropertyKey, PropertyMetadata, Root, Shape};

fn is_writable_data(metadata: PropertyMetadata) -> bool {
    metadata.attributes.is_writable() && !metadata.attributes.is_accessor()
}

fn is_cacheable(shape: GcRef<Shape>) -> bool {
    !shape.is_uncacheable_dictionary()
}

impl VM {
    /// Reads `key` from `object` at property access site `cache_index`.
    ///
    /// Returns undefined when neither the object nor its prototype chain
    /// has the property.
    ///
    /// # Panics
    ///
    /// Panics if `cache_index` was not reserved in `executable`.
    pub fn get_by_id(
        &mut self,
        executable: &Executable,
        cache_index: usize,
        object: GcRef<Object>,
        key: &PropertyKey,
    ) -> RuntimeResult<Value> {
        let shape = object.shape();
        let site = executable.property_lookup_cache(cache_index);

        if let Some(hit) = site.borrow().lookup(shape) {
            self.statistics.site_cache_hits += 1;
            return Ok(hit.holder.unwrap_or(object).get_direct(hit.metadata.offset));
        }
        let megamorphic = site.borrow().is_megamorphic();
        if megamorphic {
            if let Some(metadata) = self.megamorphic_cache.lookup_get(key, shape) {
                self.statistics.megamorphic_hits += 1;
                return Ok(object.get_direct(metadata.offset));
            }
        }

        self.statistics.slow_lookups += 1;
        if let Some(metadata) = shape.lookup(key) {
            if is_cacheable(shape) {
                if megamorphic {
                    self.megamorphic_cache.insert_get(key.clone(), shape, metadata);
                } else {
                    site.borrow_mut().update(PropertyLookupCacheEntry::own(shape, metadata));
                }
            }
            return Ok(object.get_direct(metadata.offset));
        }

        let mut current = object.prototype();
        while let Some(holder) = current {
            if let Some(metadata) = holder.own_property_metadata(key) {
                let value = holder.get_direct(metadata.offset);
                if is_cacheable(shape) && !megamorphic {
                    let validity = shape.ensure_prototype_chain_validity(self.heap())?;
                    site.borrow_mut()
                        .update(PropertyLookupCacheEntry::inherited(shape, holder, validity, metadata));
                }
                return Ok(value);
            }
            current = holder.prototype();
        }
        log::trace!("get_by_id: {key} not found on shape {:#x}", shape.address());
        Ok(Value::undefined())
    }

    /// Writes `value` to `key` on `object` at property access site
    /// `cache_index`, adding the property if it is missing.
    ///
    /// Returns false if the existing own property is read-only or an
    /// accessor. Only writes to existing own properties are cached.
    pub fn put_by_id(
        &mut self,
        executable: &Executable,
        cache_index: usize,
        object: GcRef<Object>,
        key: &PropertyKey,
        value: Value,
    ) -> RuntimeResult<bool> {
        let shape = object.shape();
        let site = executable.property_lookup_cache(cache_index);

        if let Some(hit) = site.borrow().lookup(shape) {
            if hit.holder.is_none() && is_writable_data(hit.metadata) {
                self.statistics.site_cache_hits += 1;
                object.put_direct(hit.metadata.offset, value);
                return Ok(true);
            }
        }
        let megamorphic = site.borrow().is_megamorphic();
        if megamorphic {
            if let Some(metadata) = self.megamorphic_cache.lookup_put(key, shape) {
                self.statistics.megamorphic_hits += 1;
                object.put_direct(metadata.offset, value);
                return Ok(true);
            }
        }

        self.statistics.slow_lookups += 1;
        match shape.lookup(key) {
            Some(metadata) if is_writable_data(metadata) => {
                if is_cacheable(shape) {
                    if megamorphic {
                        self.megamorphic_cache.insert_put(key.clone(), shape, metadata);
                    } else {
                        site.borrow_mut().update(PropertyLookupCacheEntry::own(shape, metadata));
                    }
                }
                object.put_direct(metadata.offset, value);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => object.put(self.heap(), key.clone(), value),
        }
    }

    /// Reads the global variable `key` from `global_object` at global
    /// access site `cache_index`.
    ///
    /// Returns `None` if the global object has no such own property.
    pub fn get_global(
        &mut self,
        executable: &Executable,
        cache_index: usize,
        global_object: GcRef<Object>,
        key: &PropertyKey,
    ) -> Option<Value> {
        let shape = global_object.shape();
        let site = executable.global_variable_cache(cache_index);
        let mut cache = site.get();

        if let Some(offset) = cache.lookup(shape) {
            self.statistics.site_cache_hits += 1;
            return Some(global_object.get_direct(offset));
        }

        self.statistics.slow_lookups += 1;
        let metadata = shape.lookup(key)?;
        if is_cacheable(shape) {
            cache.update(shape, metadata.offset);
            site.set(cache);
        }
        Some(global_object.get_direct(metadata.offset))
    }

    /// Builds an object literal with `properties`, in order, at object
    /// literal site `cache_index`.
    ///
    /// Once a site has produced a shape, later objects with the same keys
    /// are created directly in that shape without walking transitions.
    ///
    /// The object is rooted before the deferral scope ends, since a
    /// collection postponed while it was being filled runs at that point.
    pub fn create_object_literal(
        &mut self,
        executable: &Executable,
        cache_index: usize,
        properties: &[(PropertyKey, Value)],
    ) -> RuntimeResult<Root<Object>> {
        let _defer = self.heap.defer_gc();
        let site = executable.object_shape_cache(cache_index);
        let mut cache = site.get();

        if let Some(shape) = cache.get().filter(|shape| shape_has_keys(*shape, properties)) {
            self.statistics.site_cache_hits += 1;
            let object = self.heap.root(Object::create(&self.heap, shape)?);
            for (offset, (_, value)) in properties.iter().enumerate() {
                object.put_direct(offset as u32, *value);
            }
            return Ok(object);
        }

        self.statistics.slow_lookups += 1;
        let object = self.heap.root(self.create_object()?);
        for (key, value) in properties {
            object.put(self.heap(), key.clone(), *value)?;
        }
        let shape = object.shape();
        if !shape.is_dictionary() {
            cache.set(shape);
            site.set(cache);
        }
        Ok(object)
    }

    /// The template object of template literal site `cache_index`, created
    /// by `create` on first use and reused afterwards.
    pub fn template_object(
        &mut self,
        executable: &Executable,
        cache_index: usize,
        create: impl FnOnce(&VM) -> RuntimeResult<GcRef<Object>>,
    ) -> RuntimeResult<GcRef<Object>> {
        let site = executable.template_object_cache(cache_index);
        let mut cache = site.get();
        if let Some(object) = cache.get() {
            return Ok(object);
        }
        let object = create(self)?;
        cache.set(object);
        site.set(cache);
        Ok(object)
    }
}

fn shape_has_keys(shape: GcRef<Shape>, properties: &[(PropertyKey, Value)]) -> bool {
    if shape.property_count() as usize != properties.len() {
        return false;
    }
    properties.iter().enumerate().all(|(offset, (key, _))| {
        shape
            .lookup(key)
            .is_some_and(|metadata| metadata.offset as usize == offset && is_writable_data(metadata))
    })
}
