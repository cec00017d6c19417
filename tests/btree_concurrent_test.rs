use std::sync::Arc;
use std::thread;

use anyhow::Result;
use rand::prelude::*;

use karstdb::common::types::Rid;

mod common;
use common::create_test_tree;

fn rid_for(key: i64) -> Rid {
    Rid::new(key as u32, (key * 7) as u32)
}

#[test]
fn test_concurrent_disjoint_inserts() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(256, 4, 4)?;
    let tree = Arc::new(tree);

    let threads = 8;
    let per_thread = 100i64;
    let mut handles = Vec::new();
    for t in 0..threads {
        let tree = tree.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                let key = t as i64 * per_thread + i;
                assert!(tree.insert(&key, rid_for(key)).unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for key in 0..threads as i64 * per_thread {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }

    let scanned: Vec<i64> = tree
        .iter()?
        .map(|item| item.map(|(key, _)| key))
        .collect::<Result<_, _>>()?;
    assert_eq!(scanned.len(), (threads as i64 * per_thread) as usize);
    for pair in scanned.windows(2) {
        assert!(pair[0] < pair[1]);
    }
    Ok(())
}

#[test]
fn test_concurrent_inserts_with_readers() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(256, 4, 4)?;
    let tree = Arc::new(tree);

    let writers = 4;
    let per_thread = 80i64;
    let mut handles = Vec::new();

    for t in 0..writers {
        let tree = tree.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                let key = t as i64 * per_thread + i;
                tree.insert(&key, rid_for(key)).unwrap();
            }
        }));
    }
    // Readers hammer random keys while writers run. A hit must carry the
    // value the key was inserted with; a miss is fine.
    for seed in 0..4u64 {
        let tree = tree.clone();
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..400 {
                let key = rng.gen_range(0..writers as i64 * per_thread);
                if let Some(rid) = tree.get_value(&key).unwrap() {
                    assert_eq!(rid, rid_for(key));
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for key in 0..writers as i64 * per_thread {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }
    Ok(())
}

#[test]
fn test_concurrent_mixed_insert_delete() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(256, 4, 4)?;
    let tree = Arc::new(tree);

    // Pre-populate, then each thread deletes its own stripe while
    // re-inserting a fresh stripe above it.
    let threads = 6i64;
    let stripe = 60i64;
    for key in 0..threads * stripe {
        tree.insert(&key, rid_for(key))?;
    }

    let mut handles = Vec::new();
    for t in 0..threads {
        let tree = tree.clone();
        handles.push(thread::spawn(move || {
            for i in 0..stripe {
                let dead = t * stripe + i;
                tree.remove(&dead).unwrap();
                let fresh = threads * stripe + t * stripe + i;
                tree.insert(&fresh, rid_for(fresh)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for key in 0..threads * stripe {
        assert_eq!(tree.get_value(&key)?, None, "key {} should be gone", key);
    }
    for key in threads * stripe..2 * threads * stripe {
        assert_eq!(tree.get_value(&key)?, Some(rid_for(key)));
    }
    Ok(())
}

// No lookup may ever observe a value that was never associated with its
// key, no matter how operations interleave.
#[test]
fn test_lookups_never_see_foreign_values() -> Result<()> {
    let (tree, _pool, _file) = create_test_tree(256, 4, 4)?;
    let tree = Arc::new(tree);

    let mut handles = Vec::new();
    for seed in 0..8u64 {
        let tree = tree.clone();
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(seed * 31 + 1);
            for _ in 0..300 {
                let key = rng.gen_range(0i64..500);
                match rng.gen_range(0..3) {
                    0 => {
                        tree.insert(&key, rid_for(key)).unwrap();
                    }
                    1 => {
                        tree.remove(&key).unwrap();
                    }
                    _ => {
                        if let Some(rid) = tree.get_value(&key).unwrap() {
                            assert_eq!(rid, rid_for(key));
                        }
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    Ok(())
}
