// SPDX-License-Identifier: Apache-2.0
//! Bidirectional registry between stable ids and live object identities.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::ident::{ObjectRef, RefId};

/// Errors produced by identity-map operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// An id was inserted while already bound to a different object. This
    /// indicates a malformed patch and is fatal to the current apply call.
    #[error("id {id} is already bound to a different object")]
    Rebound {
        /// The conflicting id.
        id: RefId,
    },
    /// Removal referenced an id with no binding. Non-fatal; reported to the
    /// caller.
    #[error("unknown id: {id}")]
    UnknownId {
        /// The unknown id.
        id: RefId,
    },
    /// Removal referenced an object with no binding. Non-fatal; reported to
    /// the caller.
    #[error("unknown object: {object:?}")]
    UnknownObject {
        /// The unknown object handle.
        object: ObjectRef,
    },
}

/// Strictly one-to-one map between [`RefId`]s and [`ObjectRef`]s.
///
/// Also owns the per-cycle notification pause set: objects the engine has
/// written to during the current apply call, whose change notifications the
/// external watcher must not re-observe. The set is not a lock; it provides
/// no isolation against genuine concurrent edits.
#[derive(Debug, Default)]
pub struct IdentityMap {
    by_id: FxHashMap<RefId, ObjectRef>,
    by_object: FxHashMap<ObjectRef, RefId>,
    paused: FxHashSet<ObjectRef>,
}

impl IdentityMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `id` to `object`.
    ///
    /// Idempotent when the exact pair is already present.
    ///
    /// # Errors
    /// Returns [`IdentityError::Rebound`] if `id` is bound to a different
    /// object. Repointing an id (class rebuild) must go through
    /// [`IdentityMap::remove_id`] first.
    pub fn insert(&mut self, id: RefId, object: ObjectRef) -> Result<(), IdentityError> {
        match self.by_id.get(&id) {
            Some(existing) if *existing == object => Ok(()),
            Some(_) => Err(IdentityError::Rebound { id }),
            None => {
                self.by_object.insert(object, id.clone());
                self.by_id.insert(id, object);
                Ok(())
            }
        }
    }

    /// Resolves an id to its live object, if bound.
    #[must_use]
    pub fn by_id(&self, id: &RefId) -> Option<ObjectRef> {
        self.by_id.get(id).copied()
    }

    /// Resolves a live object back to its id, if bound.
    #[must_use]
    pub fn by_object(&self, object: ObjectRef) -> Option<&RefId> {
        self.by_object.get(&object)
    }

    /// Removes the binding for `id`.
    ///
    /// # Errors
    /// Returns [`IdentityError::UnknownId`] when no binding exists.
    pub fn remove_id(&mut self, id: &RefId) -> Result<ObjectRef, IdentityError> {
        let Some(object) = self.by_id.remove(id) else {
            return Err(IdentityError::UnknownId { id: id.clone() });
        };
        self.by_object.remove(&object);
        Ok(object)
    }

    /// Removes the binding for `object`.
    ///
    /// # Errors
    /// Returns [`IdentityError::UnknownObject`] when no binding exists.
    pub fn remove_object(&mut self, object: ObjectRef) -> Result<RefId, IdentityError> {
        let Some(id) = self.by_object.remove(&object) else {
            return Err(IdentityError::UnknownObject { object });
        };
        self.by_id.remove(&id);
        Ok(id)
    }

    /// Marks `object` so its change notifications are ignored for the rest
    /// of the current apply cycle.
    pub fn pause(&mut self, object: ObjectRef) {
        self.paused.insert(object);
    }

    /// Returns `true` when notifications from `object` are currently paused.
    #[must_use]
    pub fn is_paused(&self, object: ObjectRef) -> bool {
        self.paused.contains(&object)
    }

    /// Clears the pause set. Called once at the end of every apply cycle.
    pub fn resume_all(&mut self) {
        self.paused.clear();
    }

    /// Number of bindings currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` when no bindings are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_for_the_same_pair() {
        let mut map = IdentityMap::new();
        let obj = ObjectRef::from_raw(7);
        map.insert(RefId::from("a"), obj).unwrap();
        map.insert(RefId::from("a"), obj).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn rebinding_to_a_different_object_is_rejected() {
        let mut map = IdentityMap::new();
        map.insert(RefId::from("a"), ObjectRef::from_raw(1)).unwrap();
        let err = map
            .insert(RefId::from("a"), ObjectRef::from_raw(2))
            .unwrap_err();
        assert_eq!(err, IdentityError::Rebound { id: RefId::from("a") });
    }

    #[test]
    fn removal_keeps_both_directions_in_sync() {
        let mut map = IdentityMap::new();
        let obj = ObjectRef::from_raw(3);
        map.insert(RefId::from("a"), obj).unwrap();
        assert_eq!(map.remove_object(obj), Ok(RefId::from("a")));
        assert!(map.by_id(&RefId::from("a")).is_none());
        assert!(map.remove_id(&RefId::from("a")).is_err());
    }

    #[test]
    fn pause_set_clears_on_resume() {
        let mut map = IdentityMap::new();
        let obj = ObjectRef::from_raw(9);
        map.pause(obj);
        assert!(map.is_paused(obj));
        map.resume_all();
        assert!(!map.is_paused(obj));
    }
}
