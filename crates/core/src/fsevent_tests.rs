// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn action_values_round_trip() {
    for v in 0u8..=15 {
        let action = EventAction::try_from(v).unwrap();
        assert_eq!(action as u8, v);
    }
}

#[test]
fn unknown_action_is_rejected() {
    assert_eq!(EventAction::try_from(16), Err(UnknownAction(16)));
    assert_eq!(EventAction::try_from(255), Err(UnknownAction(255)));
}

#[parameterized(
    from_file = { EventAction::RenameFromFile, true, false },
    from_folder = { EventAction::RenameFromFolder, true, false },
    to_file = { EventAction::RenameToFile, false, true },
    to_folder = { EventAction::RenameToFolder, false, true },
    new_file = { EventAction::NewFile, false, false },
)]
fn rename_classification(action: EventAction, from: bool, to: bool) {
    assert_eq!(action.is_rename_from(), from);
    assert_eq!(action.is_rename_to(), to);
}

#[test]
fn mount_changes() {
    assert!(EventAction::Mount.is_mount_change());
    assert!(EventAction::Unmount.is_mount_change());
    assert!(!EventAction::DelFile.is_mount_change());
}

#[test]
fn change_path_uses_rename_destination() {
    let change = FileChange::Renamed { from: "/a".into(), to: "/b".into() };
    assert_eq!(change.path(), "/b");
    let change = FileChange::Deleted { path: "/c".into() };
    assert_eq!(change.path(), "/c");
}

#[test]
fn builder_defaults_produce_new_file_event() {
    let event = FsEvent::builder().path("/home/u/doc.txt").build();
    assert_eq!(event.action, EventAction::NewFile);
    assert_eq!(event.path, "/home/u/doc.txt");
    assert_eq!(event.cookie, 0);
}
