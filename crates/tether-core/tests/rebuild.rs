// SPDX-License-Identifier: Apache-2.0
//! Class-rebuild behavior: destroy-and-rebuild that preserves children.

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use tether_core::{
    InstanceUpdate, LiveTree, MemTree, ObjectRef, Patch, PatchEngine, PropertyValue,
    RecordingHistory, RefId, StaticSchema, VirtualInstance, VirtualValue,
};

const ROOT: &str = "root";

fn engine() -> PatchEngine<MemTree, StaticSchema, RecordingHistory> {
    let mut engine = PatchEngine::new(
        MemTree::new(),
        StaticSchema::permissive(),
        RecordingHistory::new(),
    );
    let root = engine.tree().root();
    engine
        .identity_mut()
        .insert(RefId::from(ROOT), root)
        .expect("fresh engine has no bindings");
    engine
}

/// Materializes a Folder with one Part child and returns their handles.
fn seed_folder_with_child(
    engine: &mut PatchEngine<MemTree, StaticSchema, RecordingHistory>,
) -> (ObjectRef, ObjectRef) {
    let mut folder = VirtualInstance::new("folder", "Folder", "Assets");
    folder.parent = Some(RefId::from(ROOT));
    folder.children.push(RefId::from("part"));
    let mut part = VirtualInstance::new("part", "Part", "Brick");
    part.parent = Some(RefId::from("folder"));

    let mut patch = Patch::new();
    patch.insert_added(folder);
    patch.insert_added(part);
    assert!(engine.apply(patch).expect("setup").is_empty());

    let folder_obj = engine
        .identity()
        .by_id(&RefId::from("folder"))
        .expect("folder bound");
    let part_obj = engine
        .identity()
        .by_id(&RefId::from("part"))
        .expect("part bound");
    (folder_obj, part_obj)
}

#[test]
fn class_change_rebuilds_in_place_and_detaches_the_original() {
    let mut engine = engine();
    let (original, child) = seed_folder_with_child(&mut engine);

    let mut update = InstanceUpdate::new("folder");
    update.changed_class_name = Some("Model".to_owned());
    update.changed_properties.insert(
        "Archivable".to_owned(),
        VirtualValue::Primitive(PropertyValue::Bool(false)),
    );
    let mut patch = Patch::new();
    patch.updated.push(update);

    let unapplied = engine.apply(patch).expect("no fatal conditions");
    assert!(unapplied.is_empty());

    let rebuilt = engine
        .identity()
        .by_id(&RefId::from("folder"))
        .expect("id repointed to the rebuilt object");
    assert_ne!(rebuilt, original);
    assert_eq!(engine.tree().class_name(rebuilt).as_deref(), Some("Model"));
    assert_eq!(engine.tree().name(rebuilt).as_deref(), Some("Assets"));
    assert_eq!(
        engine.tree().property(rebuilt, "Archivable"),
        Some(&PropertyValue::Bool(false))
    );

    // Children migrated; the original survives, detached.
    assert_eq!(engine.tree().parent(child), Some(rebuilt));
    assert!(engine.tree().contains(original));
    assert_eq!(engine.tree().parent(original), None);
}

#[test]
fn class_change_honors_a_simultaneous_rename() {
    let mut engine = engine();
    seed_folder_with_child(&mut engine);

    let mut update = InstanceUpdate::new("folder");
    update.changed_class_name = Some("Model".to_owned());
    update.changed_name = Some("Props".to_owned());
    let mut patch = Patch::new();
    patch.updated.push(update);

    let unapplied = engine.apply(patch).expect("no fatal conditions");
    assert!(unapplied.is_empty());

    let rebuilt = engine
        .identity()
        .by_id(&RefId::from("folder"))
        .expect("rebuilt binding");
    assert_eq!(engine.tree().name(rebuilt).as_deref(), Some("Props"));
}

#[test]
fn successful_rebuild_still_returns_metadata_unapplied() {
    let mut engine = engine();
    let (original, _) = seed_folder_with_child(&mut engine);

    let mut update = InstanceUpdate::new("folder");
    update.changed_class_name = Some("Model".to_owned());
    update.changed_metadata = Some(VirtualValue::str("ignoreUnknownInstances"));
    let mut patch = Patch::new();
    patch.updated.push(update);

    let unapplied = engine.apply(patch).expect("no fatal conditions");
    assert_eq!(unapplied.updated.len(), 1);
    let failed = &unapplied.updated[0];
    assert!(failed.changed_metadata.is_some());
    assert!(failed.changed_class_name.is_none());

    // The rebuild itself succeeded.
    let rebuilt = engine
        .identity()
        .by_id(&RefId::from("folder"))
        .expect("rebuilt binding");
    assert_ne!(rebuilt, original);
    assert_eq!(engine.tree().class_name(rebuilt).as_deref(), Some("Model"));
}

#[test]
fn failed_child_migration_rolls_the_rebuild_back() {
    let mut engine = engine();
    let (original, child) = seed_folder_with_child(&mut engine);
    engine.tree_mut().pin(child);

    let mut update = InstanceUpdate::new("folder");
    update.changed_class_name = Some("Model".to_owned());
    let mut patch = Patch::new();
    patch.updated.push(update.clone());

    let unapplied = engine.apply(patch).expect("no fatal conditions");

    // All or nothing: the update comes back verbatim and the live tree is
    // exactly as it was before the call.
    assert_eq!(unapplied.updated, vec![update]);
    assert_eq!(
        engine.identity().by_id(&RefId::from("folder")),
        Some(original)
    );
    assert_eq!(engine.tree().class_name(original).as_deref(), Some("Folder"));
    assert_eq!(engine.tree().parent(child), Some(original));
    // No stray rebuilt object remains under the root.
    let root = engine.tree().root();
    assert_eq!(engine.tree().children(root), vec![original]);
}

#[test]
fn rebuild_of_a_forbidden_class_rolls_back() {
    let mut engine = engine();
    let (original, child) = seed_folder_with_child(&mut engine);
    engine.tree_mut().forbid_class("Forbidden");

    let mut update = InstanceUpdate::new("folder");
    update.changed_class_name = Some("Forbidden".to_owned());
    let mut patch = Patch::new();
    patch.updated.push(update.clone());

    let unapplied = engine.apply(patch).expect("no fatal conditions");
    assert_eq!(unapplied.updated, vec![update]);
    assert_eq!(
        engine.identity().by_id(&RefId::from("folder")),
        Some(original)
    );
    assert_eq!(engine.tree().parent(child), Some(original));
}

#[test]
fn rebuild_of_a_detached_object_is_returned_verbatim() {
    let mut engine = engine();
    let (original, _) = seed_folder_with_child(&mut engine);
    engine
        .tree_mut()
        .set_parent(original, None)
        .expect("detach");

    let mut update = InstanceUpdate::new("folder");
    update.changed_class_name = Some("Model".to_owned());
    let mut patch = Patch::new();
    patch.updated.push(update.clone());

    let unapplied = engine.apply(patch).expect("no fatal conditions");
    assert_eq!(unapplied.updated, vec![update]);
    assert_eq!(
        engine.identity().by_id(&RefId::from("folder")),
        Some(original)
    );
}

#[test]
fn aborted_rebuild_leaves_no_deferred_reference_residue() {
    let mut engine = engine();
    let (_, child) = seed_folder_with_child(&mut engine);
    engine.tree_mut().pin(child);

    // The rebuilt instance carries a reference-typed property; after the
    // rollback it must not surface as a phase-four failure record.
    let mut update = InstanceUpdate::new("folder");
    update.changed_class_name = Some("Model".to_owned());
    update
        .changed_properties
        .insert("Primary".to_owned(), VirtualValue::Ref(RefId::from("part")));
    let mut patch = Patch::new();
    patch.updated.push(update.clone());

    let unapplied = engine.apply(patch).expect("no fatal conditions");
    assert_eq!(unapplied.updated, vec![update]);
}
