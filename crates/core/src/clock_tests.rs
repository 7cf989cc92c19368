// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advance_moves_both_time_sources() {
    let clock = FakeClock::new();
    let before = clock.now();
    let epoch_before = clock.epoch_ms();

    clock.advance(Duration::from_millis(2500));

    assert_eq!(clock.now() - before, Duration::from_millis(2500));
    assert_eq!(clock.epoch_ms() - epoch_before, 2500);
}

#[test]
fn fake_clock_set_epoch_ms() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn fake_clock_clones_share_state() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(1));
    assert_eq!(other.epoch_ms(), clock.epoch_ms());
}

#[test]
fn system_clock_epoch_is_sane() {
    let clock = SystemClock;
    // Any wall clock after 2020-01-01 passes; guards against unit confusion.
    assert!(clock.epoch_ms() > 1_577_836_800_000);
}
