//! Builder used by the compiler to assemble an [`Executable`].

use crate::caches::{GlobalVariableCache, ObjectShapeCache, PropertyLookupCache, TemplateObjectCache};
use crate::exception_handler::ExceptionHandlers;
use crate::executable::{Executable, RegexLiteral};
use crate::offset_table::{validate, OffsetRange};
use crate::operand::{Operand, OperandKind, OperandLayout};
use crate::source_map::{SourceMapEntry, SourceRange};
use core_types::{RuntimeError, RuntimeResult, Value};
use indexmap::IndexSet;
use memory_manager::{GcRef, Heap, PropertyKey};
use rustc_hash::FxHasher;
use std::cell::{Cell as Mutable, RefCell};
use std::hash::BuildHasherDefault;
use std::rc::Rc;

type Interned<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

fn overflow(what: &str) -> RuntimeError {
    RuntimeError::MalformedExecutable(format!("too many {what}"))
}

fn table_index(len: usize, what: &str) -> RuntimeResult<u32> {
    u32::try_from(len).map_err(|_| overflow(what))
}

/// Collects bytecode, tables and cache reservations, then allocates the
/// finished [`Executable`] on the heap.
///
/// Identifiers, strings and property keys are interned: adding the same one
/// twice returns the same index.
///
/// # Example
///
/// ```
/// use bytecode_system::{ExecutableBuilder, OperandKind};
/// use core_types::Value;
/// use memory_manager::Heap;
///
/// let heap = Heap::new();
/// let mut builder = ExecutableBuilder::new("main");
/// builder.set_register_count(1);
/// let answer = builder.add_constant(Value::from_i32(42)).unwrap();
/// let site = builder.reserve_property_lookup_caches(1).unwrap();
/// let executable = builder.build(&heap).unwrap();
///
/// assert_eq!(executable.classify_operand(answer), OperandKind::Constant(0));
/// assert_eq!(executable.property_lookup_cache_count(), 1);
/// assert_eq!(site, 0);
/// ```
#[derive(Debug, Default)]
pub struct ExecutableBuilder {
    name: String,
    bytecode: Vec<u8>,
    register_count: u32,
    argument_count: u32,
    identifiers: Interned<Rc<str>>,
    property_keys: Interned<PropertyKey>,
    strings: Interned<Rc<str>>,
    regexes: Vec<RegexLiteral>,
    constants: Vec<Value>,
    local_variable_names: Vec<Rc<str>>,
    property_lookup_cache_count: u32,
    global_variable_cache_count: u32,
    object_shape_cache_count: u32,
    template_object_cache_count: u32,
    exception_handlers: Vec<ExceptionHandlers>,
    source_map: Vec<SourceMapEntry>,
}

impl ExecutableBuilder {
    /// Create a new empty builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Replaces the instruction bytes.
    pub fn set_bytecode(&mut self, bytecode: Vec<u8>) {
        self.bytecode = bytecode;
    }

    /// Appends instruction bytes, returning the offset they start at.
    pub fn emit(&mut self, bytes: &[u8]) -> RuntimeResult<u32> {
        let offset = table_index(self.bytecode.len(), "bytecode bytes")?;
        self.bytecode.extend_from_slice(bytes);
        Ok(offset)
    }

    /// Sets how many scratch registers the code uses.
    pub fn set_register_count(&mut self, count: u32) {
        self.register_count = count;
    }

    /// Sets how many incoming arguments the code addresses.
    pub fn set_argument_count(&mut self, count: u32) {
        self.argument_count = count;
    }

    /// Adds a local variable slot and returns its index among locals.
    pub fn add_local_variable(&mut self, name: &str) -> RuntimeResult<u32> {
        let index = table_index(self.local_variable_names.len(), "local variables")?;
        self.local_variable_names.push(Rc::from(name));
        Ok(index)
    }

    /// Adds a constant and returns the operand naming it.
    ///
    /// The operand is final only once every register and local has been
    /// declared; declare those first.
    pub fn add_constant(&mut self, value: Value) -> RuntimeResult<Operand> {
        let locals = table_index(self.local_variable_names.len(), "local variables")?;
        let constant = table_index(self.constants.len(), "constants")?;
        let index = self
            .register_count
            .checked_add(locals)
            .and_then(|base| base.checked_add(constant))
            .ok_or_else(|| overflow("constant operands"))?;
        self.constants.push(value);
        Ok(Operand::new(index))
    }

    /// Interns an identifier.
    pub fn add_identifier(&mut self, name: &str) -> RuntimeResult<u32> {
        table_index(self.identifiers.insert_full(Rc::from(name)).0, "identifiers")
    }

    /// Interns a property key.
    pub fn add_property_key(&mut self, key: PropertyKey) -> RuntimeResult<u32> {
        table_index(self.property_keys.insert_full(key).0, "property keys")
    }

    /// Interns a string literal.
    pub fn add_string(&mut self, string: &str) -> RuntimeResult<u32> {
        table_index(self.strings.insert_full(Rc::from(string)).0, "strings")
    }

    /// Adds a regex literal.
    pub fn add_regex(&mut self, regex: RegexLiteral) -> RuntimeResult<u32> {
        let index = table_index(self.regexes.len(), "regex literals")?;
        self.regexes.push(regex);
        Ok(index)
    }

    /// Reserves `count` property access sites, returning the first index.
    pub fn reserve_property_lookup_caches(&mut self, count: u32) -> RuntimeResult<u32> {
        reserve(&mut self.property_lookup_cache_count, count, "property access sites")
    }

    /// Reserves `count` global variable access sites, returning the first index.
    pub fn reserve_global_variable_caches(&mut self, count: u32) -> RuntimeResult<u32> {
        reserve(&mut self.global_variable_cache_count, count, "global variable sites")
    }

    /// Reserves `count` object literal sites, returning the first index.
    pub fn reserve_object_shape_caches(&mut self, count: u32) -> RuntimeResult<u32> {
        reserve(&mut self.object_shape_cache_count, count, "object literal sites")
    }

    /// Reserves `count` template literal sites, returning the first index.
    pub fn reserve_template_object_caches(&mut self, count: u32) -> RuntimeResult<u32> {
        reserve(&mut self.template_object_cache_count, count, "template literal sites")
    }

    /// Registers handlers for `[start_offset, end_offset)`.
    ///
    /// A range that starts where an earlier one with the same handlers ends
    /// extends that range instead of adding a new one.
    pub fn add_exception_handler(
        &mut self,
        start_offset: u32,
        end_offset: u32,
        handler_offset: Option<u32>,
        finalizer_offset: Option<u32>,
    ) {
        let mergeable = self.exception_handlers.iter_mut().find(|existing| {
            existing.end_offset == start_offset
                && existing.handler_offset == handler_offset
                && existing.finalizer_offset == finalizer_offset
        });
        match mergeable {
            Some(existing) => existing.end_offset = end_offset,
            None => self.exception_handlers.push(ExceptionHandlers {
                start_offset,
                end_offset,
                handler_offset,
                finalizer_offset,
            }),
        }
    }

    /// Appends a source-map row. Rows must arrive in bytecode order.
    pub fn add_source_map_entry(&mut self, start_offset: u32, end_offset: u32, source_range: SourceRange) {
        self.source_map.push(SourceMapEntry {
            start_offset,
            end_offset,
            source_range,
        });
    }

    /// Boundaries the finished executable will use.
    pub fn operand_layout(&self) -> RuntimeResult<OperandLayout> {
        OperandLayout::new(
            self.register_count,
            table_index(self.local_variable_names.len(), "local variables")?,
            table_index(self.constants.len(), "constants")?,
            self.argument_count,
        )
    }

    /// The operand naming `kind` in the finished executable.
    pub fn operand_for(&self, kind: OperandKind) -> RuntimeResult<Option<Operand>> {
        Ok(self.operand_layout()?.operand_for(kind))
    }

    /// Validates the tables and allocates the executable.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::MalformedExecutable`] if the operand space overflows
    ///   or a range table is empty, overlapping, unsorted or reaches past the
    ///   bytecode
    /// - allocation errors from the heap
    pub fn build(mut self, heap: &Heap) -> RuntimeResult<GcRef<Executable>> {
        let layout = self.operand_layout()?;
        self.exception_handlers.sort_by_key(|handler| handler.start_offset);
        validate(&self.exception_handlers, "exception handler")?;
        validate(&self.source_map, "source map")?;
        let bytecode_len = table_index(self.bytecode.len(), "bytecode bytes")?;
        check_within(&self.exception_handlers, bytecode_len, "exception handler")?;
        check_within(&self.source_map, bytecode_len, "source map")?;

        log::trace!(
            "building executable {}: {} bytes, {} operands, {} property sites",
            self.name,
            bytecode_len,
            layout.operand_count(),
            self.property_lookup_cache_count
        );

        heap.allocate(Executable {
            name: Rc::from(self.name),
            bytecode: self.bytecode,
            identifier_table: self.identifiers.into_iter().collect(),
            property_key_table: self.property_keys.into_iter().collect(),
            string_table: self.strings.into_iter().collect(),
            regex_table: self.regexes,
            constants: self.constants,
            local_variable_names: self.local_variable_names,
            layout,
            property_lookup_caches: (0..self.property_lookup_cache_count)
                .map(|_| RefCell::new(PropertyLookupCache::new()))
                .collect(),
            global_variable_caches: (0..self.global_variable_cache_count)
                .map(|_| Mutable::new(GlobalVariableCache::default()))
                .collect(),
            object_shape_caches: (0..self.object_shape_cache_count)
                .map(|_| Mutable::new(ObjectShapeCache::default()))
                .collect(),
            template_object_caches: (0..self.template_object_cache_count)
                .map(|_| Mutable::new(TemplateObjectCache::default()))
                .collect(),
            exception_handlers: self.exception_handlers,
            source_map: self.source_map,
        })
    }
}

fn reserve(counter: &mut u32, count: u32, what: &str) -> RuntimeResult<u32> {
    let first = *counter;
    *counter = first.checked_add(count).ok_or_else(|| overflow(what))?;
    Ok(first)
}

fn check_within<T: OffsetRange>(table: &[T], bytecode_len: u32, what: &str) -> RuntimeResult<()> {
    match table.last() {
        Some(last) if last.end_offset() > bytecode_len => Err(RuntimeError::MalformedExecutable(format!(
            "{what} range ends at {} past bytecode length {bytecode_len}",
            last.end_offset()
        ))),
        _ => Ok(()),
    }
}
