// SPDX-License-Identifier: Apache-2.0
//! tether-core: patch application engine for two-way sync between a
//! declarative source tree and a live typed object tree.
//!
//! The engine consumes a [`Patch`] (removals, additions, updates), drives it
//! through four ordered phases against a [`LiveTree`], and returns the
//! portion that could not be applied. Failures are per-item and recoverable;
//! the only fatal conditions are an unattachable addition and an identity
//! rebind conflict.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod apply;
mod codec;
mod deferred;
mod history;
mod ident;
mod identity_map;
mod patch;
mod reify;
mod schema;
mod tree;
mod value;
mod writer;

pub use apply::{ApplyError, EngineOptions, PatchEngine};
pub use codec::{decode, DecodeError};
pub use history::{
    ChangeHistory, HistoryEvent, NullHistory, RecordingHandle, RecordingHistory,
};
pub use ident::{ObjectRef, RefId};
pub use identity_map::{IdentityError, IdentityMap};
pub use patch::{InstanceUpdate, Patch, RemovalTarget, VirtualInstance};
pub use schema::{PropertyDescriptor, PropertySchema, Scriptability, StaticSchema};
pub use tree::{LiveTree, MemTree, TreeError, WriteFailure, WriteFailureKind};
pub use value::{PropertyValue, VirtualValue};
pub use writer::WriteError;
