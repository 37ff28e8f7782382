// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use super::SharedMap;

#[test]
fn insert_get_remove() {
    let map: SharedMap<String, u32> = SharedMap::new();
    assert!(map.is_empty());
    assert_eq!(map.insert("a".to_owned(), 1), None);
    assert_eq!(map.insert("a".to_owned(), 2), Some(1));
    assert_eq!(map.get("a"), Some(2));
    assert!(map.contains("a"));
    assert_eq!(map.remove("a"), Some(2));
    assert_eq!(map.remove("a"), None);
    assert!(!map.contains("a"));
}

#[test]
fn insert_new_keeps_first_value() {
    let map: SharedMap<&'static str, u32> = SharedMap::new();
    assert!(map.insert_new("k", 1));
    assert!(!map.insert_new("k", 2));
    assert_eq!(map.get("k"), Some(1));
}

#[test]
fn get_or_insert_reports_creator() {
    let map: SharedMap<String, u32> = SharedMap::new();
    let (v, created) = map.get_or_insert_with("x".to_owned(), || 7);
    assert_eq!((v, created), (7, true));
    let (v, created) = map.get_or_insert_with("x".to_owned(), || 9);
    assert_eq!((v, created), (7, false));
}

#[test]
fn racing_creators_store_one_value() {
    const THREADS: usize = 16;
    let map: Arc<SharedMap<String, Arc<usize>>> = Arc::new(SharedMap::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let map = Arc::clone(&map);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                map.get_or_insert_with("x".to_owned(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Arc::new(i)
                })
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().filter_map(|h| h.join().ok()).collect();
    assert_eq!(results.len(), THREADS);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
    let first = &results[0].0;
    assert!(results.iter().all(|(v, _)| Arc::ptr_eq(v, first)));
}

#[test]
fn values_is_a_snapshot() {
    let map: SharedMap<u32, u32> = SharedMap::new();
    for i in 0..4 {
        map.insert(i, i * 10);
    }
    let snapshot = map.values();
    map.remove(&0);
    map.insert(9, 90);
    assert_eq!(snapshot.len(), 4);
    assert_eq!(map.len(), 4);
    let mut keys = map.keys();
    keys.sort_unstable();
    assert_eq!(keys, vec![1, 2, 3, 9]);
}
