// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    none = { NONE, true, false, false },
    connected = { CONNECTED, true, false, false },
    quit = { QUIT, true, false, false },
    disk_usage = { GET_DISK_USAGE, false, true, false },
    search = { SEARCH, false, true, false },
    result = { RESULT, false, false, true },
    progress = { PROGRESS, false, false, true },
)]
fn band_classification(cmd: i32, system: bool, task: bool, response: bool) {
    assert_eq!(is_system(cmd), system);
    assert_eq!(is_task(cmd), task);
    assert_eq!(is_response(cmd), response);
}

#[test]
fn bands_do_not_overlap() {
    for cmd in 0..300 {
        let hits =
            [is_system(cmd), is_task(cmd), is_response(cmd)].iter().filter(|b| **b).count();
        assert_eq!(hits, 1, "cmd {} matched {} bands", cmd, hits);
    }
}

#[test]
fn out_of_band_codes_match_nothing() {
    for cmd in [-1, 300, i32::MAX, i32::MIN] {
        assert!(!is_system(cmd) && !is_task(cmd) && !is_response(cmd));
    }
}
