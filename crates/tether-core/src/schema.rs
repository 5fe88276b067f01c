// SPDX-License-Identifier: Apache-2.0
//! Property-schema boundary: per-(class, property) write capability.

use rustc_hash::FxHashMap;

/// Runtime read/write capability of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scriptability {
    /// Neither readable nor writable at runtime.
    None,
    /// Readable only.
    Read,
    /// Writable only.
    Write,
    /// Readable and writable.
    ReadWrite,
}

impl Scriptability {
    /// Returns `true` when the property accepts runtime writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Schema descriptor for one (class, property) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Runtime capability of the property.
    pub scriptability: Scriptability,
}

/// Lookup service for property descriptors.
///
/// A missing descriptor means the property is unknown to the live model; the
/// writer treats that as a silent no-op, never an error.
pub trait PropertySchema {
    /// Returns the descriptor for `(class_name, property)`, if the schema
    /// knows the pair.
    fn find_descriptor(&self, class_name: &str, property: &str) -> Option<PropertyDescriptor>;
}

/// Table-driven [`PropertySchema`].
///
/// In permissive mode every pair without an explicit entry defaults to
/// `ReadWrite`; in strict mode only registered pairs have descriptors.
#[derive(Debug, Default)]
pub struct StaticSchema {
    entries: FxHashMap<(String, String), Scriptability>,
    permissive: bool,
}

impl StaticSchema {
    /// Creates a schema where unregistered pairs default to `ReadWrite`.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            entries: FxHashMap::default(),
            permissive: true,
        }
    }

    /// Creates a schema that only knows explicitly registered pairs.
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    /// Registers or overrides the capability of `(class_name, property)`.
    pub fn insert(
        &mut self,
        class_name: impl Into<String>,
        property: impl Into<String>,
        scriptability: Scriptability,
    ) {
        self.entries
            .insert((class_name.into(), property.into()), scriptability);
    }
}

impl PropertySchema for StaticSchema {
    fn find_descriptor(&self, class_name: &str, property: &str) -> Option<PropertyDescriptor> {
        let key = (class_name.to_owned(), property.to_owned());
        match self.entries.get(&key) {
            Some(scriptability) => Some(PropertyDescriptor {
                scriptability: *scriptability,
            }),
            None if self.permissive => Some(PropertyDescriptor {
                scriptability: Scriptability::ReadWrite,
            }),
            None => None,
        }
    }
}
