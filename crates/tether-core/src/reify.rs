// SPDX-License-Identifier: Apache-2.0
//! Materialization of virtual subtrees into live objects.

use std::collections::BTreeMap;

use tracing::debug;

use crate::apply::ApplyError;
use crate::codec::decode;
use crate::deferred::DeferredRef;
use crate::ident::{ObjectRef, RefId};
use crate::identity_map::IdentityMap;
use crate::patch::{InstanceUpdate, Patch, VirtualInstance};
use crate::schema::PropertySchema;
use crate::tree::{LiveTree, TreeError};
use crate::value::VirtualValue;
use crate::writer::{write_property, write_styled_group};

/// Builds the live subtree rooted at `root_id` under `parent`.
///
/// Depth-first: the node itself is created, registered, and paused before any
/// of its declared children are visited, so children always find their parent
/// already materialized. Reference-typed properties go to `deferred` (their
/// targets may not exist yet; forward and cyclic references within one patch
/// are legal), everything else is decoded and written immediately.
///
/// Per-item failures (a rejected class, an unwritable property) accumulate
/// into the returned failure patch instead of aborting the node.
///
/// # Errors
/// [`ApplyError::UnresolvedParent`] when the parent object vanished from the
/// live tree, and identity-map rebind conflicts: both mean the patch itself
/// is malformed and the whole apply call must stop.
pub(crate) fn reify_instance<T, S>(
    tree: &mut T,
    schema: &S,
    identity: &mut IdentityMap,
    deferred: &mut Vec<DeferredRef>,
    added: &BTreeMap<RefId, VirtualInstance>,
    root_id: &RefId,
    parent: ObjectRef,
    styled_group: &str,
) -> Result<Patch, ApplyError>
where
    T: LiveTree,
    S: PropertySchema,
{
    let mut failures = Patch::new();
    reify_node(
        tree,
        schema,
        identity,
        deferred,
        added,
        root_id,
        parent,
        styled_group,
        &mut failures,
    )?;
    Ok(failures)
}

#[allow(clippy::too_many_arguments)]
fn reify_node<T, S>(
    tree: &mut T,
    schema: &S,
    identity: &mut IdentityMap,
    deferred: &mut Vec<DeferredRef>,
    added: &BTreeMap<RefId, VirtualInstance>,
    root_id: &RefId,
    parent: ObjectRef,
    styled_group: &str,
    failures: &mut Patch,
) -> Result<(), ApplyError>
where
    T: LiveTree,
    S: PropertySchema,
{
    let Some(instance) = added.get(root_id) else {
        // A declared child that is not itself part of the added set is not
        // being added by this patch; nothing to build.
        debug!(id = %root_id, "declared child is not in the added set");
        return Ok(());
    };

    let object = match tree.create(&instance.class_name, &instance.name, parent) {
        Ok(object) => object,
        Err(TreeError::UnknownObject(_)) => {
            // A patch never requests a parentless addition; losing the parent
            // mid-call means the patch is malformed.
            return Err(ApplyError::UnresolvedParent {
                id: root_id.clone(),
            });
        }
        Err(err) => {
            debug!(id = %root_id, %err, "node creation rejected");
            record_failed_subtree(added, root_id, failures);
            return Ok(());
        }
    };
    identity.insert(root_id.clone(), object)?;
    identity.pause(object);

    let class = instance.class_name.as_str();
    let mut failed = InstanceUpdate::new(root_id.clone());
    for (name, value) in &instance.properties {
        match value {
            VirtualValue::Ref(_) => deferred.push(DeferredRef {
                id: root_id.clone(),
                object,
                property: name.clone(),
                value: value.clone(),
            }),
            VirtualValue::Composite(entries) if name == styled_group => {
                write_styled_group(tree, identity, object, name, entries);
            }
            other => {
                let outcome = decode(other, identity)
                    .map_err(|err| err.to_string())
                    .and_then(|native| {
                        write_property(tree, schema, object, class, name, native)
                            .map_err(|err| err.to_string())
                    });
                if let Err(err) = outcome {
                    debug!(id = %root_id, property = %name, %err, "property did not apply");
                    failed.changed_properties.insert(name.clone(), value.clone());
                }
            }
        }
    }
    failures.push_update(failed);

    for child in &instance.children {
        if identity.by_id(child).is_some() {
            continue;
        }
        reify_node(
            tree,
            schema,
            identity,
            deferred,
            added,
            child,
            object,
            styled_group,
            failures,
        )?;
    }
    Ok(())
}

/// Records a node whose creation was rejected, along with every declared
/// descendant, into the failure patch. None of them are recursed into.
fn record_failed_subtree(
    added: &BTreeMap<RefId, VirtualInstance>,
    root_id: &RefId,
    failures: &mut Patch,
) {
    let Some(instance) = added.get(root_id) else {
        return;
    };
    failures.added.insert(root_id.clone(), instance.clone());
    for child in &instance.children {
        record_failed_subtree(added, child, failures);
    }
}
