use domain::KvStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

#[test]
fn random_insert_remove_matches_reference() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut store: KvStore<String, u32> = KvStore::new();
    let mut reference: HashMap<String, u32> = HashMap::new();

    for step in 0..10_000u32 {
        let key = format!("P{}", rng.gen_range(0..500));
        if rng.gen_bool(0.3) {
            let removed = store.remove(key.as_str());
            assert_eq!(removed, reference.remove(&key));
            assert!(store.get(key.as_str()).is_none());
        } else {
            let old = store.insert(key.clone(), step);
            assert_eq!(old, reference.insert(key, step));
        }
        assert_eq!(store.len(), reference.len());
    }

    for (key, value) in &reference {
        assert_eq!(store.get(key.as_str()), Some(value));
    }
    assert_eq!(store.iter().count(), reference.len());
}

#[test]
fn iteration_follows_insertion_order() {
    let mut store = KvStore::new();
    let names = ["#1P", "#2P", "M161", "&2Q87", "I130"];
    for name in names {
        store.insert(name.to_string(), String::new());
    }
    let keys: Vec<&str> = store.keys().map(String::as_str).collect();
    assert_eq!(keys, names);

    let mut walked = Vec::new();
    let mut cursor = store.first_key();
    while let Some(key) = cursor {
        walked.push(key.clone());
        cursor = store.next_key(key.as_str());
    }
    assert_eq!(walked, names);
}

#[test]
fn lookup_after_remove_reports_missing() {
    let mut store = KvStore::new();
    store.insert("a".to_string(), 1);
    store.insert("b".to_string(), 2);
    assert_eq!(store.remove("a"), Some(1));
    assert_eq!(store.remove("a"), None);
    assert!(!store.contains_key("a"));
    assert_eq!(store.get("b"), Some(&2));
    assert_eq!(store.len(), 1);
}
