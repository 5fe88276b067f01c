// SPDX-License-Identifier: Apache-2.0
//! Patch orchestration: the four-phase apply cycle.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::decode;
use crate::deferred::{resolve_deferred, DeferredRef};
use crate::history::ChangeHistory;
use crate::ident::{ObjectRef, RefId};
use crate::identity_map::{IdentityError, IdentityMap};
use crate::patch::{InstanceUpdate, Patch, RemovalTarget, VirtualInstance};
use crate::reify::reify_instance;
use crate::schema::PropertySchema;
use crate::tree::LiveTree;
use crate::value::VirtualValue;
use crate::writer::{write_property, write_styled_group};

/// Fatal conditions that abort a whole apply call.
///
/// Everything else the engine encounters is a recoverable, per-item failure
/// and lands in the returned unapplied patch instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// An addition's attachment ancestor has no resolvable parent anywhere
    /// in the live tree or the pending added set. The patch is malformed
    /// upstream; no partial result is produced for the addition phase.
    #[error("added instance {id} has no resolvable parent")]
    UnresolvedParent {
        /// Id of the unattachable subtree root.
        id: RefId,
    },
    /// The patch tried to bind an id that is already bound to a different
    /// object.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Tunables for the apply cycle.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Label passed to the history recorder for undo/redo grouping.
    pub history_label: String,
    /// Name of the composite property group whose string entries of the
    /// shape `Enum.<EnumName>.<Item>` are rewritten to native enum items and
    /// written as one bulk unit.
    pub styled_group: String,
    /// Name of the property sub-map applied only after the rest of an
    /// update's property set.
    pub late_group: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            history_label: "Tether: apply patch".to_owned(),
            styled_group: "StyledProperties".to_owned(),
            late_group: "Attributes".to_owned(),
        }
    }
}

/// The patch application engine.
///
/// Owns its collaborators explicitly — live tree, property schema, history
/// recorder — so tests substitute fakes without touching globals. One
/// [`PatchEngine::apply`] call runs the four phases (removal, addition,
/// update, deferred resolution) to a terminal state and returns the portion
/// of the patch that could not be applied; an empty result means full
/// success.
pub struct PatchEngine<T, S, H> {
    tree: T,
    schema: S,
    history: H,
    identity: IdentityMap,
    options: EngineOptions,
}

impl<T, S, H> PatchEngine<T, S, H>
where
    T: LiveTree,
    S: PropertySchema,
    H: ChangeHistory,
{
    /// Creates an engine with default [`EngineOptions`].
    pub fn new(tree: T, schema: S, history: H) -> Self {
        Self::with_options(tree, schema, history, EngineOptions::default())
    }

    /// Creates an engine with explicit options.
    pub fn with_options(tree: T, schema: S, history: H, options: EngineOptions) -> Self {
        Self {
            tree,
            schema,
            history,
            identity: IdentityMap::new(),
            options,
        }
    }

    /// Shared access to the live tree.
    pub fn tree(&self) -> &T {
        &self.tree
    }

    /// Mutable access to the live tree.
    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    /// Shared access to the identity map.
    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    /// Mutable access to the identity map, for seeding root bindings.
    pub fn identity_mut(&mut self) -> &mut IdentityMap {
        &mut self.identity
    }

    /// Shared access to the history recorder.
    pub fn history(&self) -> &H {
        &self.history
    }

    /// Applies `patch` and returns its unapplied remainder.
    ///
    /// The call is bracketed by a best-effort history recording which is
    /// committed on every exit path, including the fatal one. The
    /// notification pause set is cleared before returning.
    ///
    /// # Errors
    /// [`ApplyError`] on the fatal conditions; per-item failures never
    /// surface here.
    pub fn apply(&mut self, patch: Patch) -> Result<Patch, ApplyError> {
        let handle = self.history.try_begin(&self.options.history_label);
        if handle.is_none() {
            warn!("history recording unavailable; undo grouping degraded");
        }
        let total = patch.total_len();
        let result = self.apply_phases(patch);
        if let Some(handle) = handle {
            self.history.finish(handle, true);
        }
        self.identity.resume_all();
        match &result {
            Ok(unapplied) => {
                info!(
                    requested = total,
                    unapplied = unapplied.total_len(),
                    "patch apply finished"
                );
            }
            Err(err) => warn!(%err, "patch apply aborted"),
        }
        result
    }

    fn apply_phases(&mut self, patch: Patch) -> Result<Patch, ApplyError> {
        let Patch {
            removed,
            added,
            updated,
        } = patch;
        let mut unapplied = Patch::new();
        let mut deferred: Vec<DeferredRef> = Vec::new();

        self.apply_removals(removed, &mut unapplied);
        self.apply_additions(&added, &mut unapplied, &mut deferred)?;
        self.apply_updates(updated, &mut unapplied, &mut deferred)?;
        resolve_deferred(
            &mut self.tree,
            &self.schema,
            &self.identity,
            deferred,
            &mut unapplied,
        );
        Ok(unapplied)
    }

    /// Phase 1. Fully resilient: a failed removal is recorded verbatim and
    /// never aborts later phases.
    fn apply_removals(&mut self, removed: Vec<RemovalTarget>, unapplied: &mut Patch) {
        for target in removed {
            let object = match &target {
                RemovalTarget::Id(id) => self.identity.by_id(id),
                RemovalTarget::Object(object) => Some(*object),
            };
            let Some(object) = object else {
                debug!(?target, "removal target is not registered");
                unapplied.removed.push(target);
                continue;
            };
            // Gather the subtree first so stale id bindings can be dropped
            // after the cascade.
            let subtree = subtree_objects(&self.tree, object);
            match self.tree.destroy(object) {
                Ok(()) => {
                    for victim in subtree {
                        let _ = self.identity.remove_object(victim);
                    }
                }
                Err(err) => {
                    debug!(?target, %err, "removal rejected by host");
                    unapplied.removed.push(target);
                }
            }
        }
    }

    /// Phase 2. Each connected pending subtree is reified exactly once, from
    /// the unique ancestor that attaches it to the existing tree, regardless
    /// of map iteration order.
    fn apply_additions(
        &mut self,
        added: &BTreeMap<RefId, VirtualInstance>,
        unapplied: &mut Patch,
        deferred: &mut Vec<DeferredRef>,
    ) -> Result<(), ApplyError> {
        let mut attempted: FxHashSet<&RefId> = FxHashSet::default();
        for id in added.keys() {
            if self.identity.by_id(id).is_some() {
                continue;
            }
            let root = attachment_root(added, id)?;
            if self.identity.by_id(root).is_some() || !attempted.insert(root) {
                // The subtree was reified by an earlier iteration, or its
                // root's creation was already rejected. Primitives are never
                // retried within one apply call.
                continue;
            }
            let parent_id = added.get(root).and_then(|instance| instance.parent.clone());
            let parent = parent_id
                .and_then(|parent_id| self.identity.by_id(&parent_id))
                .ok_or_else(|| ApplyError::UnresolvedParent { id: root.clone() })?;
            let failures = reify_instance(
                &mut self.tree,
                &self.schema,
                &mut self.identity,
                deferred,
                added,
                root,
                parent,
                &self.options.styled_group,
            )?;
            unapplied.merge(failures);
        }
        Ok(())
    }

    /// Phase 3.
    fn apply_updates(
        &mut self,
        updates: Vec<InstanceUpdate>,
        unapplied: &mut Patch,
        deferred: &mut Vec<DeferredRef>,
    ) -> Result<(), ApplyError> {
        for update in updates {
            let Some(object) = self.identity.by_id(&update.id) else {
                debug!(id = %update.id, "update target is not registered");
                unapplied.push_update(update);
                continue;
            };
            if !self.tree.contains(object) {
                unapplied.push_update(update);
                continue;
            }
            self.identity.pause(object);

            if update.changed_class_name.is_some() {
                self.rebuild_class(update, object, unapplied, deferred)?;
                continue;
            }

            let class = self.tree.class_name(object).unwrap_or_default();
            let mut failed = InstanceUpdate::new(update.id.clone());

            if let Some(name) = &update.changed_name {
                if let Err(err) = self.tree.rename(object, name) {
                    debug!(id = %update.id, %err, "rename rejected");
                    failed.changed_name = Some(name.clone());
                }
            }
            // Sync metadata is unsupported in this version: always returned
            // unapplied, regardless of the other fields' success.
            if update.changed_metadata.is_some() {
                failed.changed_metadata = update.changed_metadata;
            }

            let mut late = None;
            for (name, value) in update.changed_properties {
                if name == self.options.late_group {
                    late = Some((name, value));
                    continue;
                }
                self.apply_one_property(&update.id, object, &class, name, value, &mut failed, deferred);
            }
            if let Some((name, value)) = late {
                self.apply_one_property(&update.id, object, &class, name, value, &mut failed, deferred);
            }
            unapplied.push_update(failed);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_one_property(
        &mut self,
        id: &RefId,
        object: ObjectRef,
        class: &str,
        name: String,
        value: VirtualValue,
        failed: &mut InstanceUpdate,
        deferred: &mut Vec<DeferredRef>,
    ) {
        match value {
            VirtualValue::Ref(_) => deferred.push(DeferredRef {
                id: id.clone(),
                object,
                property: name,
                value,
            }),
            VirtualValue::Composite(ref entries) if name == self.options.styled_group => {
                write_styled_group(&mut self.tree, &self.identity, object, &name, entries);
            }
            ref other => {
                let outcome = decode(other, &self.identity)
                    .map_err(|err| err.to_string())
                    .and_then(|native| {
                        write_property(&mut self.tree, &self.schema, object, class, &name, native)
                            .map_err(|err| err.to_string())
                    });
                if let Err(err) = outcome {
                    debug!(%id, property = %name, %err, "property did not apply");
                    failed.changed_properties.insert(name, value);
                }
            }
        }
    }

    /// In-place class change: destroy-and-rebuild that preserves children
    /// and detaches (never destroys) the original object, so an external
    /// undo mechanism can still restore it.
    ///
    /// Child migration is all-or-nothing: on the first reparent failure the
    /// already-moved children return to the original object, the rebuilt
    /// object is destroyed, the id binding is restored, and the entire
    /// update is recorded verbatim. There is no partial credit in this
    /// branch.
    fn rebuild_class(
        &mut self,
        update: InstanceUpdate,
        original: ObjectRef,
        unapplied: &mut Patch,
        deferred: &mut Vec<DeferredRef>,
    ) -> Result<(), ApplyError> {
        let Some(parent) = self.tree.parent(original) else {
            debug!(id = %update.id, "cannot rebuild a detached or root object");
            unapplied.push_update(update);
            return Ok(());
        };
        let current_name = self.tree.name(original).unwrap_or_default();
        let requested_name = update.changed_name.clone().unwrap_or(current_name);
        let Some(new_class) = update.changed_class_name.clone() else {
            debug_assert!(false, "rebuild_class requires changed_class_name");
            return Ok(());
        };

        let mut synth = VirtualInstance::new(update.id.clone(), new_class, requested_name.clone());
        synth.properties = update.changed_properties.clone();
        let mut single = BTreeMap::new();
        single.insert(update.id.clone(), synth);

        let _ = self.identity.remove_id(&update.id);
        let deferred_mark = deferred.len();
        let failures = reify_instance(
            &mut self.tree,
            &self.schema,
            &mut self.identity,
            deferred,
            &single,
            &update.id,
            parent,
            &self.options.styled_group,
        )?;

        let rebuilt = self.identity.by_id(&update.id);
        let rebuilt_ok = rebuilt.is_some_and(|object| {
            object != original && self.tree.name(object).as_deref() == Some(requested_name.as_str())
        });
        if !rebuilt_ok {
            deferred.truncate(deferred_mark);
            self.abort_rebuild(update, original, rebuilt, &[], unapplied);
            return Ok(());
        }
        let Some(rebuilt) = rebuilt else {
            return Ok(());
        };

        let mut moved = Vec::new();
        for child in self.tree.children(original) {
            match self.tree.set_parent(child, Some(rebuilt)) {
                Ok(()) => moved.push(child),
                Err(err) => {
                    warn!(id = %update.id, %err, "child migration failed; rolling back rebuild");
                    deferred.truncate(deferred_mark);
                    self.abort_rebuild(update, original, Some(rebuilt), &moved, unapplied);
                    return Ok(());
                }
            }
        }
        if let Err(err) = self.tree.set_parent(original, None) {
            warn!(id = %update.id, %err, "detach of original failed; rolling back rebuild");
            deferred.truncate(deferred_mark);
            self.abort_rebuild(update, original, Some(rebuilt), &moved, unapplied);
            return Ok(());
        }

        // Metadata has no live representation; even a successful rebuild
        // reports it back unapplied.
        if update.changed_metadata.is_some() {
            let mut failed = InstanceUpdate::new(update.id.clone());
            failed.changed_metadata = update.changed_metadata;
            unapplied.push_update(failed);
        }
        unapplied.merge(failures);
        Ok(())
    }

    fn abort_rebuild(
        &mut self,
        update: InstanceUpdate,
        original: ObjectRef,
        rebuilt: Option<ObjectRef>,
        moved: &[ObjectRef],
        unapplied: &mut Patch,
    ) {
        for child in moved.iter().rev() {
            let _ = self.tree.set_parent(*child, Some(original));
        }
        let _ = self.identity.remove_id(&update.id);
        if let Some(rebuilt) = rebuilt {
            if rebuilt != original {
                let _ = self.tree.destroy(rebuilt);
            }
        }
        let _ = self.identity.insert(update.id.clone(), original);
        unapplied.push_update(update);
    }
}

/// Walks upward through the added set to the unique node that attaches the
/// pending subtree to the existing tree.
fn attachment_root<'a>(
    added: &'a BTreeMap<RefId, VirtualInstance>,
    id: &'a RefId,
) -> Result<&'a RefId, ApplyError> {
    let mut root = id;
    let mut hops = 0usize;
    loop {
        let Some(instance) = added.get(root) else {
            return Ok(root);
        };
        match &instance.parent {
            Some(parent_id) if added.contains_key(parent_id) => {
                hops += 1;
                if hops > added.len() {
                    // Parent cycle inside the added set: malformed patch.
                    return Err(ApplyError::UnresolvedParent { id: root.clone() });
                }
                root = parent_id;
            }
            _ => return Ok(root),
        }
    }
}

fn subtree_objects<T: LiveTree>(tree: &T, root: ObjectRef) -> Vec<ObjectRef> {
    let mut out = vec![root];
    let mut cursor = 0;
    while cursor < out.len() {
        let object = out[cursor];
        out.extend(tree.children(object));
        cursor += 1;
    }
    out
}
