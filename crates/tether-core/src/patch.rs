// SPDX-License-Identifier: Apache-2.0
//! Patch shapes: the desired-state delta and its unapplied remainder.

use std::collections::BTreeMap;

use crate::ident::{ObjectRef, RefId};
use crate::value::VirtualValue;

/// Desired state of one synced node.
///
/// A virtual instance is consumed once during apply and then discarded; it is
/// a description, not a handle.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualInstance {
    /// Stable identifier of the node.
    pub id: RefId,
    /// Class the live object must have.
    pub class_name: String,
    /// Name the live object must have.
    pub name: String,
    /// Declared properties by name.
    pub properties: BTreeMap<String, VirtualValue>,
    /// Ids of declared children, in order.
    pub children: Vec<RefId>,
    /// Declared parent id.
    ///
    /// For patch additions this must resolve through the patch's `added` set
    /// or the identity map (a parentless addition is a malformed patch).
    /// `None` is reserved for single-node instances synthesized internally
    /// during class rebuild.
    pub parent: Option<RefId>,
}

impl VirtualInstance {
    /// Creates an empty instance description.
    pub fn new(id: impl Into<RefId>, class_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class_name: class_name.into(),
            name: name.into(),
            properties: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

/// One entry of a patch's removal list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalTarget {
    /// Remove the object bound to this stable id.
    Id(RefId),
    /// Remove this live object directly (it may be unmanaged).
    Object(ObjectRef),
}

/// Requested changes to one existing node.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceUpdate {
    /// Stable identifier of the target node.
    pub id: RefId,
    /// New name, when the name changed.
    pub changed_name: Option<String>,
    /// New class, when the class changed. Forces a destroy-and-rebuild that
    /// preserves children and detaches (never destroys) the original object.
    pub changed_class_name: Option<String>,
    /// Changed properties by name.
    pub changed_properties: BTreeMap<String, VirtualValue>,
    /// Opaque sync metadata. Unsupported in this version: always returned
    /// unapplied.
    pub changed_metadata: Option<VirtualValue>,
}

impl InstanceUpdate {
    /// Creates an update with no requested changes.
    pub fn new(id: impl Into<RefId>) -> Self {
        Self {
            id: id.into(),
            changed_name: None,
            changed_class_name: None,
            changed_properties: BTreeMap::new(),
            changed_metadata: None,
        }
    }

    /// Returns `true` when the update requests nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changed_name.is_none()
            && self.changed_class_name.is_none()
            && self.changed_properties.is_empty()
            && self.changed_metadata.is_none()
    }
}

/// A desired-state delta over the live tree.
///
/// The same shape doubles as the unapplied remainder returned by
/// [`crate::PatchEngine::apply`]: an empty patch means full success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    /// Objects to remove, by id or by direct handle.
    pub removed: Vec<RemovalTarget>,
    /// Subtrees to materialize, keyed by stable id.
    pub added: BTreeMap<RefId, VirtualInstance>,
    /// Changes to existing nodes.
    pub updated: Vec<InstanceUpdate>,
}

impl Patch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the patch contains nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.updated.is_empty()
    }

    /// Total number of entries across all three sections.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.removed.len() + self.added.len() + self.updated.len()
    }

    /// Adds an added-node description.
    pub fn insert_added(&mut self, instance: VirtualInstance) {
        self.added.insert(instance.id.clone(), instance);
    }

    /// Merges a failure update into `updated`.
    ///
    /// Records targeting the same id are unioned: scalar fields take the
    /// newer value when set, and `changed_properties` merge keyed by property
    /// name with the most recent write winning on conflict.
    pub fn push_update(&mut self, update: InstanceUpdate) {
        if update.is_noop() {
            return;
        }
        if let Some(existing) = self.updated.iter_mut().find(|u| u.id == update.id) {
            if update.changed_name.is_some() {
                existing.changed_name = update.changed_name;
            }
            if update.changed_class_name.is_some() {
                existing.changed_class_name = update.changed_class_name;
            }
            if update.changed_metadata.is_some() {
                existing.changed_metadata = update.changed_metadata;
            }
            existing.changed_properties.extend(update.changed_properties);
        } else {
            self.updated.push(update);
        }
    }

    /// Merges every entry of `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        self.removed.extend(other.removed);
        self.added.extend(other.added);
        for update in other.updated {
            self.push_update(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyValue;

    #[test]
    fn push_update_unions_by_id_last_wins() {
        let mut patch = Patch::new();

        let mut first = InstanceUpdate::new("node");
        first
            .changed_properties
            .insert("Size".to_owned(), VirtualValue::str("old"));
        patch.push_update(first);

        let mut second = InstanceUpdate::new("node");
        second
            .changed_properties
            .insert("Size".to_owned(), VirtualValue::str("new"));
        second
            .changed_properties
            .insert("Color".to_owned(), VirtualValue::str("red"));
        patch.push_update(second);

        assert_eq!(patch.updated.len(), 1);
        let merged = &patch.updated[0];
        assert_eq!(merged.changed_properties.len(), 2);
        assert_eq!(
            merged.changed_properties.get("Size"),
            Some(&VirtualValue::Primitive(PropertyValue::Str("new".to_owned())))
        );
    }

    #[test]
    fn noop_updates_are_dropped() {
        let mut patch = Patch::new();
        patch.push_update(InstanceUpdate::new("idle"));
        assert!(patch.is_empty());
    }
}
