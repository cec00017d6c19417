use anyhow::Result;

use karstdb::common::types::{Rid, INVALID_PAGE_ID};

mod common;
use common::create_test_tree;

fn rid_for(key: i64) -> Rid {
    Rid::new((key / 100) as u32, (key % 100) as u32)
}

#[test]
fn test_insert_then_lookup() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(64, 4, 4)?;

    let keys = [5i64, 3, 8, 2, 7, 11, 1, 9];
    for &key in &keys {
        assert!(tree.insert(&key, rid_for(key))?);
    }

    for &key in &keys {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }
    assert_eq!(tree.get_value(&100)?, None);
    assert_eq!(tree.get_value(&4)?, None);
    Ok(())
}

#[test]
fn test_duplicate_insert_returns_false() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(64, 4, 4)?;

    assert!(tree.insert(&42, rid_for(42))?);
    assert!(!tree.insert(&42, Rid::new(9, 9))?);
    // The original value survives.
    assert_eq!(tree.get_value(&42)?, Some(rid_for(42)));
    Ok(())
}

#[test]
fn test_empty_tree() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(16, 4, 4)?;

    assert!(tree.is_empty());
    assert_eq!(tree.get_value(&1)?, None);
    assert_eq!(tree.iter()?.count(), 0);
    tree.remove(&1)?;
    Ok(())
}

#[test]
fn test_sorted_iteration() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(128, 4, 4)?;

    // Insert in a scrambled but deterministic order.
    let mut keys: Vec<i64> = (0..300).map(|i| (i * 53) % 307).collect();
    for &key in &keys {
        tree.insert(&key, rid_for(key))?;
    }

    let scanned: Vec<(i64, Rid)> = tree.iter()?.collect::<Result<_, _>>()?;
    keys.sort_unstable();
    assert_eq!(scanned.len(), keys.len());
    for (i, &key) in keys.iter().enumerate() {
        assert_eq!(scanned[i], (key, rid_for(key)));
    }
    // Strictly ascending.
    for pair in scanned.windows(2) {
        assert!(pair[0].0 < pair[1].0);
    }
    Ok(())
}

#[test]
fn test_iter_from_starts_at_covering_key() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(64, 4, 4)?;

    for key in (0..50).map(|i| i * 2) {
        tree.insert(&key, rid_for(key))?;
    }

    // 31 is absent; the scan starts at the next key up.
    let tail: Vec<i64> = tree
        .iter_from(&31)?
        .map(|item| item.map(|(key, _)| key))
        .collect::<Result<_, _>>()?;
    assert_eq!(tail.first(), Some(&32));
    assert_eq!(tail.len(), 34);

    let exact: Vec<i64> = tree
        .iter_from(&40)?
        .map(|item| item.map(|(key, _)| key))
        .collect::<Result<_, _>>()?;
    assert_eq!(exact.first(), Some(&40));

    let past_end: Vec<i64> = tree
        .iter_from(&99)?
        .map(|item| item.map(|(key, _)| key))
        .collect::<Result<_, _>>()?;
    assert!(past_end.is_empty());
    Ok(())
}

#[test]
fn test_insert_then_delete_all_leaves_empty_tree() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(128, 4, 4)?;

    let keys: Vec<i64> = (0..200).map(|i| (i * 29) % 211).collect();
    for &key in &keys {
        tree.insert(&key, rid_for(key))?;
    }
    for &key in &keys {
        tree.remove(&key)?;
        assert_eq!(tree.get_value(&key)?, None);
    }

    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
    assert_eq!(tree.iter()?.count(), 0);
    Ok(())
}

#[test]
fn test_delete_missing_key_is_noop() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(64, 4, 4)?;

    for key in 0..20 {
        tree.insert(&key, rid_for(key))?;
    }
    tree.remove(&555)?;
    for key in 0..20 {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }
    Ok(())
}

#[test]
fn test_interleaved_insert_delete() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(128, 4, 4)?;

    for key in 0..100 {
        tree.insert(&key, rid_for(key))?;
    }
    for key in (0..100).filter(|k| k % 2 == 0) {
        tree.remove(&key)?;
    }
    for key in 100..150 {
        tree.insert(&key, rid_for(key))?;
    }

    for key in 0..150 {
        let expected = if key < 100 && key % 2 == 0 {
            None
        } else {
            Some(rid_for(key))
        };
        assert_eq!(tree.get_value(&key)?, expected, "key {}", key);
    }
    Ok(())
}

#[test]
fn test_small_pool_forces_eviction_during_tree_ops() -> Result<()> {
    // A pool much smaller than the tree: node pages constantly travel
    // between disk and frames mid-operation. Deep cascading splits pin a
    // whole root-to-leaf path at once, so the pool cannot be arbitrarily
    // small.
    let (tree, _pool, _file) = create_test_tree(16, 4, 4)?;

    for key in 0..200 {
        tree.insert(&key, rid_for(key))?;
    }
    for key in 0..200 {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }
    Ok(())
}
