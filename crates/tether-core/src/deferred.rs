// SPDX-License-Identifier: Apache-2.0
//! Resolution of reference-typed properties deferred during apply.

use tracing::debug;

use crate::ident::{ObjectRef, RefId};
use crate::identity_map::IdentityMap;
use crate::patch::{InstanceUpdate, Patch};
use crate::schema::PropertySchema;
use crate::tree::LiveTree;
use crate::value::{PropertyValue, VirtualValue};
use crate::writer::write_property;

/// A reference-typed property write waiting for its target to materialize.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DeferredRef {
    /// Stable id of the owning node.
    pub(crate) id: RefId,
    /// Live object the property belongs to.
    pub(crate) object: ObjectRef,
    /// Property name.
    pub(crate) property: String,
    /// The original virtual value (always a `Ref`), kept verbatim so a
    /// failure can be recorded without reconstruction.
    pub(crate) value: VirtualValue,
}

/// Resolves every pending deferred reference.
///
/// Runs exactly once per apply call, after every addition has had its chance
/// to materialize; that ordering is what makes forward and cyclic references
/// work. Unresolvable targets and rejected writes are merged into
/// `unapplied.updated` for the owning id (union of changed properties,
/// most recent write wins on key conflict).
pub(crate) fn resolve_deferred<T, S>(
    tree: &mut T,
    schema: &S,
    identity: &IdentityMap,
    deferred: Vec<DeferredRef>,
    unapplied: &mut Patch,
) where
    T: LiveTree,
    S: PropertySchema,
{
    for entry in deferred {
        let VirtualValue::Ref(target) = &entry.value else {
            debug_assert!(false, "deferred entry must hold a Ref value");
            continue;
        };
        let outcome = if !tree.contains(entry.object) {
            Err(format!("owning object {:?} no longer exists", entry.object))
        } else {
            match identity.by_id(target) {
                None => Err(format!("reference target {target} is not materialized")),
                Some(target_obj) => {
                    let class = tree.class_name(entry.object).unwrap_or_default();
                    write_property(
                        tree,
                        schema,
                        entry.object,
                        &class,
                        &entry.property,
                        PropertyValue::Object(Some(target_obj)),
                    )
                    .map_err(|err| err.to_string())
                }
            }
        };
        if let Err(err) = outcome {
            debug!(id = %entry.id, property = %entry.property, %err, "deferred reference unresolved");
            let mut failed = InstanceUpdate::new(entry.id.clone());
            failed.changed_properties.insert(entry.property, entry.value);
            unapplied.push_update(failed);
        }
    }
}
