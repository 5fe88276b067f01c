// SPDX-License-Identifier: Apache-2.0
//! Identifier types for a sync session.

use std::fmt;

/// Opaque stable identifier for one synced node.
///
/// `RefId` tokens are minted by the upstream diff producer, are unique within
/// a sync session, and stay stable across patches. They are deliberately
/// distinct from native object identity ([`ObjectRef`]): the same id may be
/// repointed to a newly rebuilt object during a class change while the old
/// object lives on, detached, for undo history.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RefId(String);

impl RefId {
    /// Wraps an externally generated token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RefId {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

impl From<String> for RefId {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Native identity handle for one live object in the host tree.
///
/// Host implementations mint these; the engine treats them as opaque. A
/// handle stays valid until the object is destroyed (a detached object keeps
/// its handle).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ObjectRef(u64);

impl ObjectRef {
    /// Constructs a handle from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_ids_compare_by_token() {
        let a = RefId::from("alpha");
        let b = RefId::new(String::from("alpha"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "alpha");
    }
}
