//! Executable - compiled bytecode container
//!
//! Holds the instruction bytes, the side tables instructions index into, the
//! per-callsite caches and the range tables used when unwinding or mapping
//! back to source. Executables live on the GC heap: the constants and
//! template objects they reference stay alive as long as the executable does.

use crate::caches::{GlobalVariableCache, ObjectShapeCache, PropertyLookupCache, TemplateObjectCache};
use crate::exception_handler::ExceptionHandlers;
use crate::offset_table::find_covering;
use crate::operand::{Operand, OperandKind, OperandLayout};
use crate::source_map::{SourceMapEntry, SourceRange};
use core_types::{RuntimeResult, Value};
use memory_manager::{Cell, PropertyKey, Visitor};
use std::cell::{Cell as Mutable, RefCell};
use std::fmt;
use std::rc::Rc;

/// A regular expression literal as written in source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegexLiteral {
    /// Pattern between the slashes
    pub pattern: Rc<str>,
    /// Flags after the closing slash
    pub flags: Rc<str>,
}

impl RegexLiteral {
    /// Create a new regex literal
    pub fn new(pattern: impl Into<Rc<str>>, flags: impl Into<Rc<str>>) -> Self {
        Self {
            pattern: pattern.into(),
            flags: flags.into(),
        }
    }
}

/// Compiled bytecode and everything it indexes into.
///
/// Built with [`ExecutableBuilder`](crate::ExecutableBuilder).
pub struct Executable {
    pub(crate) name: Rc<str>,
    pub(crate) bytecode: Vec<u8>,
    pub(crate) identifier_table: Vec<Rc<str>>,
    pub(crate) property_key_table: Vec<PropertyKey>,
    pub(crate) string_table: Vec<Rc<str>>,
    pub(crate) regex_table: Vec<RegexLiteral>,
    pub(crate) constants: Vec<Value>,
    pub(crate) local_variable_names: Vec<Rc<str>>,
    pub(crate) layout: OperandLayout,
    pub(crate) property_lookup_caches: Box<[RefCell<PropertyLookupCache>]>,
    pub(crate) global_variable_caches: Box<[Mutable<GlobalVariableCache>]>,
    pub(crate) object_shape_caches: Box<[Mutable<ObjectShapeCache>]>,
    pub(crate) template_object_caches: Box<[Mutable<TemplateObjectCache>]>,
    pub(crate) exception_handlers: Vec<ExceptionHandlers>,
    pub(crate) source_map: Vec<SourceMapEntry>,
}

impl Executable {
    /// Name of the function or script this was compiled from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw instruction bytes.
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Operand space boundaries.
    pub fn layout(&self) -> OperandLayout {
        self.layout
    }

    /// Identifier at `index`.
    pub fn identifier(&self, index: usize) -> &str {
        &self.identifier_table[index]
    }

    /// Property key at `index`.
    pub fn property_key(&self, index: usize) -> &PropertyKey {
        &self.property_key_table[index]
    }

    /// String literal at `index`.
    pub fn string(&self, index: usize) -> &str {
        &self.string_table[index]
    }

    /// Regex literal at `index`.
    pub fn regex(&self, index: usize) -> &RegexLiteral {
        &self.regex_table[index]
    }

    /// Constant pool.
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// Names of the local variable slots, in slot order.
    pub fn local_variable_names(&self) -> &[Rc<str>] {
        &self.local_variable_names
    }

    /// Number of property access sites.
    pub fn property_lookup_cache_count(&self) -> usize {
        self.property_lookup_caches.len()
    }

    /// Number of global variable access sites.
    pub fn global_variable_cache_count(&self) -> usize {
        self.global_variable_caches.len()
    }

    /// Number of object literal sites.
    pub fn object_shape_cache_count(&self) -> usize {
        self.object_shape_caches.len()
    }

    /// Number of template literal sites.
    pub fn template_object_cache_count(&self) -> usize {
        self.template_object_caches.len()
    }

    /// Cache of the property access site `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` was not reserved when the executable was built.
    pub fn property_lookup_cache(&self, index: usize) -> &RefCell<PropertyLookupCache> {
        &self.property_lookup_caches[index]
    }

    /// Cache of the global variable access site `index`.
    pub fn global_variable_cache(&self, index: usize) -> &Mutable<GlobalVariableCache> {
        &self.global_variable_caches[index]
    }

    /// Cache of the object literal site `index`.
    pub fn object_shape_cache(&self, index: usize) -> &Mutable<ObjectShapeCache> {
        &self.object_shape_caches[index]
    }

    /// Cache of the template literal site `index`.
    pub fn template_object_cache(&self, index: usize) -> &Mutable<TemplateObjectCache> {
        &self.template_object_caches[index]
    }

    /// Exception handler table, sorted by start offset.
    pub fn exception_handlers(&self) -> &[ExceptionHandlers] {
        &self.exception_handlers
    }

    /// Source map, sorted by start offset.
    pub fn source_map(&self) -> &[SourceMapEntry] {
        &self.source_map
    }

    /// Handlers covering the instruction at `offset`, if any.
    pub fn exception_handlers_for_offset(&self, offset: u32) -> Option<&ExceptionHandlers> {
        find_covering(&self.exception_handlers, offset)
    }

    /// Source text the instruction at `offset` was generated from, if known.
    pub fn source_range_at(&self, offset: u32) -> Option<SourceRange> {
        find_covering(&self.source_map, offset).map(|entry| entry.source_range)
    }

    /// Classifies an operand embedded in an instruction.
    ///
    /// # Panics
    ///
    /// Panics if the operand lies past the argument space.
    pub fn classify_operand(&self, operand: Operand) -> OperandKind {
        self.layout.classify(operand)
    }

    /// Checked form of [`Executable::classify_operand`].
    pub fn try_classify_operand(&self, operand: Operand) -> RuntimeResult<OperandKind> {
        self.layout.try_classify(operand)
    }

    /// The constant an operand names, if it names one.
    pub fn constant_for(&self, operand: Operand) -> Option<Value> {
        match self.layout.try_classify(operand).ok()? {
            OperandKind::Constant(index) => self.constants.get(index as usize).copied(),
            _ => None,
        }
    }

    /// Human-readable form of an operand, for disassembly.
    pub fn dump_operand(&self, operand: Operand) -> String {
        match self.layout.try_classify(operand) {
            Ok(kind @ OperandKind::Local(index)) => match self.local_variable_names.get(index as usize) {
                Some(name) => format!("{kind}:{name}"),
                None => kind.to_string(),
            },
            Ok(kind @ OperandKind::Constant(index)) => match self.constants.get(index as usize) {
                Some(value) => format!("{kind}:{value:?}"),
                None => kind.to_string(),
            },
            Ok(kind) => kind.to_string(),
            Err(_) => format!("invalid#{}", operand.index()),
        }
    }
}

impl Cell for Executable {
    fn class_name(&self) -> &'static str {
        "Executable"
    }

    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        for constant in &self.constants {
            visitor.visit_value(*constant);
        }
        for cache in self.template_object_caches.iter() {
            cache.get().visit_edges(visitor);
        }
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executable")
            .field("name", &self.name)
            .field("bytecode_len", &self.bytecode.len())
            .field("layout", &self.layout)
            .field("constants", &self.constants.len())
            .field("property_lookup_caches", &self.property_lookup_caches.len())
            .field("exception_handlers", &self.exception_handlers.len())
            .finish()
    }
}
