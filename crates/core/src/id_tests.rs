// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

// --- define_id! macro tests ---

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn define_id_generates_prefixed_ids() {
    let id = TestId::new();
    assert!(id.as_str().starts_with("tst-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn define_id_ids_are_unique() {
    let a = TestId::new();
    let b = TestId::new();
    assert_ne!(a, b);
}

#[test]
fn define_id_hash_map_lookup_by_str() {
    let mut map = HashMap::new();
    map.insert(TestId::from_string("tst-k"), 42);
    assert_eq!(map.get("tst-k"), Some(&42));
}

#[test]
fn define_id_from_string_round_trips() {
    let id = TestId::from_string("tst-abc123");
    assert_eq!(id, "tst-abc123");
    assert_eq!(id.to_string(), "tst-abc123");
}

// --- IdBuf tests ---

#[test]
fn idbuf_preserves_content() {
    let buf = IdBuf::new("hello");
    assert_eq!(buf.as_str(), "hello");
    assert!(!buf.is_empty());
}

#[test]
fn idbuf_empty_string() {
    let buf = IdBuf::new("");
    assert_eq!(buf.as_str(), "");
    assert!(buf.is_empty());
}

#[test]
fn idbuf_hash_matches_str_hash() {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let buf = IdBuf::new("job-xyz");
    let mut h1 = DefaultHasher::new();
    buf.hash(&mut h1);
    let mut h2 = DefaultHasher::new();
    "job-xyz".hash(&mut h2);
    assert_eq!(h1.finish(), h2.finish());
}
