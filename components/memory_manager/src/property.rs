//! Property keys and the per-property metadata shapes record.

use bitflags::bitflags;
use std::fmt;
use std::rc::Rc;

/// Name under which a property is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyKey {
    /// String-named property
    String(Rc<str>),
    /// Symbol-keyed property, identified by the symbol's id
    Symbol(u32),
    /// Integer-indexed property
    Index(u32),
}

impl PropertyKey {
    /// Creates a string key.
    pub fn string(name: &str) -> Self {
        PropertyKey::String(Rc::from(name))
    }

    /// The name of a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(name) => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        PropertyKey::string(name)
    }
}

impl From<String> for PropertyKey {
    fn from(name: String) -> Self {
        PropertyKey::String(Rc::from(name))
    }
}

impl From<u32> for PropertyKey {
    fn from(index: u32) -> Self {
        PropertyKey::Index(index)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(name) => write!(f, "{name}"),
            PropertyKey::Symbol(id) => write!(f, "Symbol({id})"),
            PropertyKey::Index(index) => write!(f, "{index}"),
        }
    }
}

bitflags! {
    /// Attributes of a stored property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyAttributes: u8 {
        /// Value may be replaced
        const WRITABLE = 1 << 0;
        /// Visible to enumeration
        const ENUMERABLE = 1 << 1;
        /// May be deleted or reconfigured
        const CONFIGURABLE = 1 << 2;
        /// Slot holds a getter
        const GETTER = 1 << 3;
        /// Slot holds a setter
        const SETTER = 1 << 4;
        /// Attributes of a property created by plain assignment
        const DEFAULT = Self::WRITABLE.bits() | Self::ENUMERABLE.bits() | Self::CONFIGURABLE.bits();
    }
}

impl PropertyAttributes {
    /// Whether the value may be replaced.
    pub fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// Whether the property shows up in enumeration.
    pub fn is_enumerable(self) -> bool {
        self.contains(Self::ENUMERABLE)
    }

    /// Whether the property may be deleted or reconfigured.
    pub fn is_configurable(self) -> bool {
        self.contains(Self::CONFIGURABLE)
    }

    /// Whether the slot holds an accessor.
    pub fn is_accessor(self) -> bool {
        self.intersects(Self::GETTER | Self::SETTER)
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Where a property lives in its object's storage, and how it behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyMetadata {
    /// Index into the object's value storage
    pub offset: u32,
    /// Attributes of the property
    pub attributes: PropertyAttributes,
}
