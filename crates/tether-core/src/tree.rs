// SPDX-License-Identifier: Apache-2.0
//! Live-tree boundary and the in-memory reference implementation.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::ident::ObjectRef;
use crate::value::PropertyValue;

/// Classification of a rejected property write, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailureKind {
    /// The caller lacks permission to write this property.
    PermissionDenied,
    /// Any other rejection.
    Other,
}

/// A rejected property write.
///
/// Hosts should report `kind` structurally. When a host can only surface an
/// opaque message, the writer falls back to matching a `"lacking permission"`
/// substring in `detail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// Structured classification.
    pub kind: WriteFailureKind,
    /// Host-provided detail message.
    pub detail: String,
}

/// Errors produced by structural live-tree operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The referenced object does not exist in the tree.
    #[error("unknown object: {0:?}")]
    UnknownObject(ObjectRef),
    /// The class cannot be instantiated by this host.
    #[error("class {0:?} cannot be instantiated")]
    ForbiddenClass(String),
    /// The host rejected moving this object to a new parent.
    #[error("reparent rejected for {0:?}")]
    ReparentRejected(ObjectRef),
    /// The host rejected renaming this object.
    #[error("rename rejected for {0:?}")]
    RenameRejected(ObjectRef),
}

/// Host object-tree primitives.
///
/// The engine receives an implementation at construction instead of reaching
/// for ambient globals, so tests substitute [`MemTree`] freely. All methods
/// are object-safe; the engine never retries a failed primitive.
pub trait LiveTree {
    /// Creates an object of `class_name` named `name` under `parent`.
    ///
    /// # Errors
    /// [`TreeError::UnknownObject`] when the parent does not exist (the
    /// engine treats this as fatal), [`TreeError::ForbiddenClass`] when the
    /// class cannot be instantiated (per-item failure).
    fn create(&mut self, class_name: &str, name: &str, parent: ObjectRef)
        -> Result<ObjectRef, TreeError>;

    /// Destroys `object` and its entire subtree.
    ///
    /// # Errors
    /// [`TreeError::UnknownObject`] when the object does not exist.
    fn destroy(&mut self, object: ObjectRef) -> Result<(), TreeError>;

    /// Moves `object` under `parent`, or detaches it from the tree without
    /// destroying it when `parent` is `None`.
    ///
    /// # Errors
    /// [`TreeError::UnknownObject`] or [`TreeError::ReparentRejected`].
    fn set_parent(&mut self, object: ObjectRef, parent: Option<ObjectRef>)
        -> Result<(), TreeError>;

    /// Renames `object`.
    ///
    /// # Errors
    /// [`TreeError::UnknownObject`] or [`TreeError::RenameRejected`].
    fn rename(&mut self, object: ObjectRef, name: &str) -> Result<(), TreeError>;

    /// Writes one property value on `object`.
    ///
    /// # Errors
    /// A [`WriteFailure`] carrying the host's classification of the
    /// rejection.
    fn set_property(
        &mut self,
        object: ObjectRef,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), WriteFailure>;

    /// Class of `object`, when it exists.
    fn class_name(&self, object: ObjectRef) -> Option<String>;

    /// Name of `object`, when it exists.
    fn name(&self, object: ObjectRef) -> Option<String>;

    /// Parent of `object`; `None` for detached objects or the root.
    fn parent(&self, object: ObjectRef) -> Option<ObjectRef>;

    /// Ordered children of `object`.
    fn children(&self, object: ObjectRef) -> Vec<ObjectRef>;

    /// Returns `true` when `object` exists (attached or detached).
    fn contains(&self, object: ObjectRef) -> bool;
}

#[derive(Debug, Clone)]
struct ObjectRecord {
    class_name: String,
    name: String,
    parent: Option<ObjectRef>,
    children: Vec<ObjectRef>,
    properties: BTreeMap<String, PropertyValue>,
}

/// In-memory [`LiveTree`].
///
/// Backs the engine's test suites and doubles as a local mirror for hosts
/// without a native tree. Fault-injection knobs simulate host rejections:
/// forbidden classes, pinned objects (reparent rejected), rejected renames,
/// per-(class, property) write denials.
#[derive(Debug)]
pub struct MemTree {
    objects: FxHashMap<ObjectRef, ObjectRecord>,
    root: ObjectRef,
    next_raw: u64,
    forbidden_classes: FxHashSet<String>,
    pinned: FxHashSet<ObjectRef>,
    unrenamable: FxHashSet<ObjectRef>,
    denied_writes: FxHashSet<(String, String)>,
    opaque_denied_writes: FxHashSet<(String, String)>,
    failing_writes: FxHashSet<(String, String)>,
}

impl Default for MemTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTree {
    /// Creates a tree holding only a root object of class `"Root"`.
    #[must_use]
    pub fn new() -> Self {
        let root = ObjectRef::from_raw(1);
        let mut objects = FxHashMap::default();
        objects.insert(
            root,
            ObjectRecord {
                class_name: "Root".to_owned(),
                name: "root".to_owned(),
                parent: None,
                children: Vec::new(),
                properties: BTreeMap::new(),
            },
        );
        Self {
            objects,
            root,
            next_raw: 1,
            forbidden_classes: FxHashSet::default(),
            pinned: FxHashSet::default(),
            unrenamable: FxHashSet::default(),
            denied_writes: FxHashSet::default(),
            opaque_denied_writes: FxHashSet::default(),
            failing_writes: FxHashSet::default(),
        }
    }

    /// The root object handle.
    #[must_use]
    pub fn root(&self) -> ObjectRef {
        self.root
    }

    /// Reads back one property value, for assertions.
    #[must_use]
    pub fn property(&self, object: ObjectRef, name: &str) -> Option<&PropertyValue> {
        self.objects.get(&object)?.properties.get(name)
    }

    /// Makes `create` reject this class with [`TreeError::ForbiddenClass`].
    pub fn forbid_class(&mut self, class_name: impl Into<String>) {
        self.forbidden_classes.insert(class_name.into());
    }

    /// Makes `set_parent` reject moves of `object`.
    pub fn pin(&mut self, object: ObjectRef) {
        self.pinned.insert(object);
    }

    /// Makes `rename` reject renames of `object`.
    pub fn reject_rename(&mut self, object: ObjectRef) {
        self.unrenamable.insert(object);
    }

    /// Makes writes to `(class, property)` fail with a permission denial.
    pub fn deny_write(&mut self, class_name: impl Into<String>, property: impl Into<String>) {
        self.denied_writes.insert((class_name.into(), property.into()));
    }

    /// Makes writes to `(class, property)` fail without a structured
    /// classification, carrying only the permission wording in the detail.
    pub fn deny_write_opaque(
        &mut self,
        class_name: impl Into<String>,
        property: impl Into<String>,
    ) {
        self.opaque_denied_writes
            .insert((class_name.into(), property.into()));
    }

    /// Makes writes to `(class, property)` fail with an unclassified error.
    pub fn fail_write(&mut self, class_name: impl Into<String>, property: impl Into<String>) {
        self.failing_writes.insert((class_name.into(), property.into()));
    }

    fn mint(&mut self) -> ObjectRef {
        self.next_raw += 1;
        ObjectRef::from_raw(self.next_raw)
    }

    fn collect_subtree(&self, object: ObjectRef, out: &mut Vec<ObjectRef>) {
        out.push(object);
        if let Some(record) = self.objects.get(&object) {
            for child in &record.children {
                self.collect_subtree(*child, out);
            }
        }
    }

    fn unlink_from_parent(&mut self, object: ObjectRef) {
        let parent = self.objects.get(&object).and_then(|r| r.parent);
        if let Some(parent) = parent {
            if let Some(record) = self.objects.get_mut(&parent) {
                record.children.retain(|c| *c != object);
            }
        }
    }
}

impl LiveTree for MemTree {
    fn create(
        &mut self,
        class_name: &str,
        name: &str,
        parent: ObjectRef,
    ) -> Result<ObjectRef, TreeError> {
        if !self.objects.contains_key(&parent) {
            return Err(TreeError::UnknownObject(parent));
        }
        if self.forbidden_classes.contains(class_name) {
            return Err(TreeError::ForbiddenClass(class_name.to_owned()));
        }
        let object = self.mint();
        self.objects.insert(
            object,
            ObjectRecord {
                class_name: class_name.to_owned(),
                name: name.to_owned(),
                parent: Some(parent),
                children: Vec::new(),
                properties: BTreeMap::new(),
            },
        );
        if let Some(record) = self.objects.get_mut(&parent) {
            record.children.push(object);
        }
        Ok(object)
    }

    fn destroy(&mut self, object: ObjectRef) -> Result<(), TreeError> {
        if !self.objects.contains_key(&object) {
            return Err(TreeError::UnknownObject(object));
        }
        self.unlink_from_parent(object);
        let mut doomed = Vec::new();
        self.collect_subtree(object, &mut doomed);
        for victim in doomed {
            self.objects.remove(&victim);
            self.pinned.remove(&victim);
            self.unrenamable.remove(&victim);
        }
        Ok(())
    }

    fn set_parent(&mut self, object: ObjectRef, parent: Option<ObjectRef>) -> Result<(), TreeError> {
        if !self.objects.contains_key(&object) {
            return Err(TreeError::UnknownObject(object));
        }
        if self.pinned.contains(&object) {
            return Err(TreeError::ReparentRejected(object));
        }
        if let Some(parent) = parent {
            if !self.objects.contains_key(&parent) {
                return Err(TreeError::UnknownObject(parent));
            }
        }
        self.unlink_from_parent(object);
        if let Some(record) = self.objects.get_mut(&object) {
            record.parent = parent;
        }
        if let Some(parent) = parent {
            if let Some(record) = self.objects.get_mut(&parent) {
                record.children.push(object);
            }
        }
        Ok(())
    }

    fn rename(&mut self, object: ObjectRef, name: &str) -> Result<(), TreeError> {
        let Some(record) = self.objects.get_mut(&object) else {
            return Err(TreeError::UnknownObject(object));
        };
        if self.unrenamable.contains(&object) {
            return Err(TreeError::RenameRejected(object));
        }
        record.name = name.to_owned();
        Ok(())
    }

    fn set_property(
        &mut self,
        object: ObjectRef,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), WriteFailure> {
        let Some(record) = self.objects.get_mut(&object) else {
            return Err(WriteFailure {
                kind: WriteFailureKind::Other,
                detail: format!("unknown object: {object:?}"),
            });
        };
        let key = (record.class_name.clone(), property.to_owned());
        if self.denied_writes.contains(&key) {
            return Err(WriteFailure {
                kind: WriteFailureKind::PermissionDenied,
                detail: format!("lacking permission to set {property}"),
            });
        }
        if self.opaque_denied_writes.contains(&key) {
            return Err(WriteFailure {
                kind: WriteFailureKind::Other,
                detail: format!("lacking permission to set {property}"),
            });
        }
        if self.failing_writes.contains(&key) {
            return Err(WriteFailure {
                kind: WriteFailureKind::Other,
                detail: format!("host rejected write to {property}"),
            });
        }
        record.properties.insert(property.to_owned(), value);
        Ok(())
    }

    fn class_name(&self, object: ObjectRef) -> Option<String> {
        self.objects.get(&object).map(|r| r.class_name.clone())
    }

    fn name(&self, object: ObjectRef) -> Option<String> {
        self.objects.get(&object).map(|r| r.name.clone())
    }

    fn parent(&self, object: ObjectRef) -> Option<ObjectRef> {
        self.objects.get(&object).and_then(|r| r.parent)
    }

    fn children(&self, object: ObjectRef) -> Vec<ObjectRef> {
        self.objects
            .get(&object)
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    fn contains(&self, object: ObjectRef) -> bool {
        self.objects.contains_key(&object)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn destroy_removes_the_whole_subtree() {
        let mut tree = MemTree::new();
        let root = tree.root();
        let folder = tree.create("Folder", "f", root).unwrap();
        let child = tree.create("Part", "p", folder).unwrap();

        tree.destroy(folder).unwrap();
        assert!(!tree.contains(folder));
        assert!(!tree.contains(child));
        assert!(tree.children(root).is_empty());
    }

    #[test]
    fn detach_keeps_the_object_alive() {
        let mut tree = MemTree::new();
        let root = tree.root();
        let folder = tree.create("Folder", "f", root).unwrap();

        tree.set_parent(folder, None).unwrap();
        assert!(tree.contains(folder));
        assert_eq!(tree.parent(folder), None);
        assert!(tree.children(root).is_empty());
    }

    #[test]
    fn pinned_objects_reject_reparents() {
        let mut tree = MemTree::new();
        let root = tree.root();
        let a = tree.create("Folder", "a", root).unwrap();
        let b = tree.create("Folder", "b", root).unwrap();
        tree.pin(b);
        assert_eq!(
            tree.set_parent(b, Some(a)),
            Err(TreeError::ReparentRejected(b))
        );
    }
}
