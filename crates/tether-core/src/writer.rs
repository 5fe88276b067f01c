// SPDX-License-Identifier: Apache-2.0
//! Capability-checked property writes.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::codec::decode;
use crate::ident::ObjectRef;
use crate::identity_map::IdentityMap;
use crate::schema::PropertySchema;
use crate::tree::{LiveTree, WriteFailureKind};
use crate::value::{PropertyValue, VirtualValue};

/// Substring fallback for hosts that cannot report a structured permission
/// code.
const PERMISSION_DETAIL: &str = "lacking permission";

/// A property write the engine could not perform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The schema knows the property but marks it read-only/non-scriptable.
    #[error("property {class}.{property} is not writable")]
    UnwritableProperty {
        /// Class of the target object.
        class: String,
        /// Property name.
        property: String,
    },
    /// The host rejected the write for insufficient permission.
    #[error("lacking permission to write {class}.{property}")]
    LackingPropertyPermissions {
        /// Class of the target object.
        class: String,
        /// Property name.
        property: String,
    },
    /// The host rejected the write for any other reason.
    #[error("write to {class}.{property} failed: {detail}")]
    OtherPropertyError {
        /// Class of the target object.
        class: String,
        /// Property name.
        property: String,
        /// Host-provided detail.
        detail: String,
    },
}

/// Writes one native value, applying the fixed capability policy.
///
/// A missing descriptor is a success no-op: the property is simply not
/// reflected to the live model.
///
/// # Errors
/// [`WriteError`] per the classification in the module docs.
pub(crate) fn write_property<T, S>(
    tree: &mut T,
    schema: &S,
    object: ObjectRef,
    class: &str,
    property: &str,
    value: PropertyValue,
) -> Result<(), WriteError>
where
    T: LiveTree + ?Sized,
    S: PropertySchema + ?Sized,
{
    let Some(descriptor) = schema.find_descriptor(class, property) else {
        debug!(class, property, "skipping write: no schema descriptor");
        return Ok(());
    };
    if !descriptor.scriptability.is_writable() {
        return Err(WriteError::UnwritableProperty {
            class: class.to_owned(),
            property: property.to_owned(),
        });
    }
    match tree.set_property(object, property, value) {
        Ok(()) => Ok(()),
        Err(failure) => {
            let lacking = failure.kind == WriteFailureKind::PermissionDenied
                || failure.detail.contains(PERMISSION_DETAIL);
            if lacking {
                Err(WriteError::LackingPropertyPermissions {
                    class: class.to_owned(),
                    property: property.to_owned(),
                })
            } else {
                Err(WriteError::OtherPropertyError {
                    class: class.to_owned(),
                    property: property.to_owned(),
                    detail: failure.detail,
                })
            }
        }
    }
}

/// Issues the bulk write for a styled-properties group.
///
/// Each entry whose value is a string of the exact shape
/// `Enum.<EnumName>.<Item>` is rewritten to the native enum item first;
/// everything else passes through unchanged (unresolved references inside
/// the group are dropped from the bulk value). The write always reports
/// success locally; validating the group's contents is the schema's job
/// downstream.
pub(crate) fn write_styled_group<T>(
    tree: &mut T,
    identity: &IdentityMap,
    object: ObjectRef,
    group_name: &str,
    entries: &BTreeMap<String, VirtualValue>,
) where
    T: LiveTree + ?Sized,
{
    let mut bulk = BTreeMap::new();
    for (name, entry) in entries {
        let native = match entry {
            VirtualValue::Primitive(PropertyValue::Str(raw)) => {
                PropertyValue::parse_enum_path(raw)
                    .unwrap_or_else(|| PropertyValue::Str(raw.clone()))
            }
            other => match decode(other, identity) {
                Ok(native) => native,
                Err(err) => {
                    debug!(group = group_name, entry = %name, %err, "dropping styled entry");
                    continue;
                }
            },
        };
        bulk.insert(name.clone(), native);
    }
    if let Err(failure) = tree.set_property(object, group_name, PropertyValue::Table(bulk)) {
        debug!(group = group_name, detail = %failure.detail, "styled bulk write rejected by host");
    }
}
