// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn progress_round_trip() {
    for percent in [0, 1, 50, 99, 100] {
        assert_eq!(decode_progress(&encode_progress(percent)).unwrap(), percent);
    }
}

#[test]
fn progress_rejects_wrong_width() {
    assert!(decode_progress(&[0, 0, 0]).is_err());
    assert!(decode_progress(&[0, 0, 0, 0, 0]).is_err());
}

#[test]
fn string_round_trip() {
    for s in ["", "ok", "路径/含中文", "reason with spaces"] {
        assert_eq!(decode_string(&encode_string(s)).unwrap(), s);
    }
}

#[test]
fn string_layout_has_length_prefix() {
    let buf = encode_string("ab");
    assert_eq!(&buf[..4], &[0, 0, 0, 2]);
    assert_eq!(&buf[4..], b"ab");
}

#[test]
fn string_rejects_length_mismatch() {
    let mut buf = encode_string("hello");
    buf.pop();
    assert!(decode_string(&buf).is_err());
}

#[test]
fn string_rejects_truncated_prefix() {
    assert!(decode_string(&[0, 0]).is_err());
}

#[test]
fn string_rejects_invalid_utf8() {
    let mut buf = (2i32).to_be_bytes().to_vec();
    buf.extend([0xFF, 0xFE]);
    assert!(decode_string(&buf).is_err());
}

#[test]
fn error_frame_carries_reason() {
    let frame = error_frame("disk on fire");
    assert_eq!(frame.cmd, dfm_core::command::ERROR);
    assert_eq!(decode_string(&frame.payload).unwrap(), "disk on fire");
}
