// SPDX-License-Identifier: Apache-2.0
//! Virtual and native property values.

use std::collections::BTreeMap;

use crate::ident::{ObjectRef, RefId};

/// Native property value as understood by the host tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// UTF-8 string.
    Str(String),
    /// 64-bit float.
    Float(f64),
    /// 64-bit signed integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// A native enum item, e.g. `Enum.FillDirection.Horizontal`.
    EnumItem {
        /// Enum family name (`FillDirection`).
        enum_name: String,
        /// Item name within the family (`Horizontal`).
        item: String,
    },
    /// Reference to another live object; `None` clears the reference.
    Object(Option<ObjectRef>),
    /// Structured bag of named values, written as one bulk unit.
    Table(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Parses a string of the exact shape `Enum.<EnumName>.<Item>` into an
    /// [`PropertyValue::EnumItem`]. Any other shape returns `None`.
    #[must_use]
    pub fn parse_enum_path(raw: &str) -> Option<Self> {
        let mut parts = raw.split('.');
        if parts.next() != Some("Enum") {
            return None;
        }
        let enum_name = parts.next().filter(|s| !s.is_empty())?;
        let item = parts.next().filter(|s| !s.is_empty())?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::EnumItem {
            enum_name: enum_name.to_owned(),
            item: item.to_owned(),
        })
    }
}

/// Desired-state value for one property of a virtual instance.
///
/// The tag is exhaustive on purpose: reference-typed values are a distinct
/// case that callers must handle before decoding, because their target may
/// not be materialized yet (forward and cyclic references within one patch
/// are legal).
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualValue {
    /// A plain native value.
    Primitive(PropertyValue),
    /// A reference to another synced node by stable id.
    Ref(RefId),
    /// A structured group of named virtual values.
    Composite(BTreeMap<String, VirtualValue>),
}

impl VirtualValue {
    /// Shorthand for a primitive string value.
    pub fn str(value: impl Into<String>) -> Self {
        Self::Primitive(PropertyValue::Str(value.into()))
    }
}
