// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

#[test]
fn lock_is_exclusive_until_unlocked() {
    let mutex = AcceptMutex::new().unwrap();
    assert!(mutex.try_lock());
    assert!(mutex.is_held());
    assert!(!mutex.try_lock());
    mutex.unlock();
    assert!(mutex.try_lock());
}

#[test]
fn contention_has_a_single_winner_per_round() {
    let mutex = Arc::new(AcceptMutex::new().unwrap());
    let winners: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                scope.spawn(move || mutex.try_lock())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(winners.iter().filter(|won| **won).count(), 1);
    mutex.unlock();
    assert!(mutex.try_lock());
}
