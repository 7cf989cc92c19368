// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dfm_core::{EventAction, FakeClock};
use std::path::Path;

fn config() -> WatcherConfig {
    WatcherConfig {
        watch_root: PathBuf::from("/home/u"),
        rename_timeout: Duration::from_secs(2),
        sweep_interval: Duration::from_millis(20),
    }
}

fn overlay() -> OverlayMounts {
    OverlayMounts::fixed(Path::new("/home/u"), Some("/upper"), None)
}

fn event(action: EventAction, cookie: u32, path: &str, at_ms: u64) -> FsEvent {
    FsEvent::builder().action(action).cookie(cookie).path(path).at_ms(at_ms).build()
}

async fn recv(changes: &mut mpsc::UnboundedReceiver<FileChange>) -> FileChange {
    tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .expect("timed out waiting for change")
        .expect("pipeline ended")
}

#[tokio::test]
async fn rename_pair_through_overlay_normalization() {
    let clock = FakeClock::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let (mut watcher, mut changes) =
        FileWatcher::from_events(rx, overlay(), config(), clock.clone());

    tx.send(event(EventAction::RenameFromFile, 42, "/upper/foo", clock.epoch_ms()))
        .unwrap();
    tx.send(event(EventAction::RenameToFile, 42, "/upper/bar", clock.epoch_ms() + 10))
        .unwrap();

    assert_eq!(
        recv(&mut changes).await,
        FileChange::Renamed { from: "/home/u/foo".into(), to: "/home/u/bar".into() }
    );
    assert_eq!(recv(&mut changes).await, FileChange::Modified { path: "/home/u/bar".into() });

    // No stray deletion afterwards.
    tx.send(event(EventAction::NewFile, 0, "/home/u/marker", clock.epoch_ms())).unwrap();
    assert_eq!(recv(&mut changes).await, FileChange::Created { path: "/home/u/marker".into() });
    watcher.stop();
}

#[tokio::test]
async fn orphaned_rename_from_surfaces_as_deletion() {
    let clock = FakeClock::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let (mut watcher, mut changes) =
        FileWatcher::from_events(rx, overlay(), config(), clock.clone());

    tx.send(event(EventAction::RenameFromFolder, 7, "/upper/sub", clock.epoch_ms()))
        .unwrap();
    // Let the pump ingest the event before expiring it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    clock.advance(Duration::from_secs(3));

    assert_eq!(recv(&mut changes).await, FileChange::Deleted { path: "/home/u/sub".into() });
    watcher.stop();
}

#[tokio::test]
async fn events_outside_watch_root_are_dropped() {
    let clock = FakeClock::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let (mut watcher, mut changes) =
        FileWatcher::from_events(rx, overlay(), config(), clock.clone());

    tx.send(event(EventAction::NewFile, 0, "/etc/passwd", 0)).unwrap();
    tx.send(event(EventAction::NewFile, 0, "/home/u2/secret", 0)).unwrap();
    tx.send(event(EventAction::NewFile, 0, "/home/u/.cache/tmp", 0)).unwrap();
    tx.send(event(EventAction::NewFile, 0, "/home/u/visible.txt", 0)).unwrap();

    // Only the visible event survives the filters.
    assert_eq!(
        recv(&mut changes).await,
        FileChange::Created { path: "/home/u/visible.txt".into() }
    );
    watcher.stop();
}
