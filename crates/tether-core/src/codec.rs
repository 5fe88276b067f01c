// SPDX-License-Identifier: Apache-2.0
//! Decoding virtual property values into native ones.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::ident::RefId;
use crate::identity_map::IdentityMap;
use crate::value::{PropertyValue, VirtualValue};

/// Errors produced while decoding a virtual value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A reference target is not materialized in the identity map.
    #[error("reference target {0} is not materialized")]
    UnresolvedRef(RefId),
}

/// Decodes `value` into its native form.
///
/// `Ref` values resolve immediately against the identity map. Callers that
/// need deferred resolution (reification, updates) must special-case
/// top-level [`VirtualValue::Ref`] before calling decode; references nested
/// inside composites decode eagerly and fail when unresolved.
///
/// # Errors
/// [`DecodeError::UnresolvedRef`] when a reference target has no binding.
pub fn decode(value: &VirtualValue, identity: &IdentityMap) -> Result<PropertyValue, DecodeError> {
    match value {
        VirtualValue::Primitive(native) => Ok(native.clone()),
        VirtualValue::Ref(id) => match identity.by_id(id) {
            Some(object) => Ok(PropertyValue::Object(Some(object))),
            None => Err(DecodeError::UnresolvedRef(id.clone())),
        },
        VirtualValue::Composite(entries) => {
            let mut out = BTreeMap::new();
            for (name, entry) in entries {
                out.insert(name.clone(), decode(entry, identity)?);
            }
            Ok(PropertyValue::Table(out))
        }
    }
}
