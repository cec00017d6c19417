use std::sync::Arc;

use anyhow::Result;
use tempfile::NamedTempFile;

use karstdb::index::btree::page::HEADER_PAGE_ID;
use karstdb::index::btree::BPlusTree;
use karstdb::storage::buffer::{BufferPoolManager, ReplacerPolicy};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    create_test_buffer_pool_with_policy(pool_size, ReplacerPolicy::Lru)
}

#[allow(dead_code)]
pub fn create_test_buffer_pool_with_policy(
    pool_size: usize,
    policy: ReplacerPolicy,
) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::with_policy(pool_size, path, policy)?);
    Ok((buffer_pool, file))
}

// Create a B+Tree over a fresh pool, reserving page 0 for the index
// header records first.
#[allow(dead_code)]
pub fn create_test_tree(
    pool_size: usize,
    leaf_max_size: usize,
    internal_max_size: usize,
) -> Result<(BPlusTree<i64>, Arc<BufferPoolManager>, NamedTempFile)> {
    let (buffer_pool, file) = create_test_buffer_pool(pool_size)?;
    let (_, header_id) = buffer_pool.new_page()?;
    assert_eq!(header_id, HEADER_PAGE_ID);
    buffer_pool.unpin_page(header_id, true);

    let tree = BPlusTree::with_max_sizes(
        "test_index",
        buffer_pool.clone(),
        leaf_max_size,
        internal_max_size,
    )?;
    Ok((tree, buffer_pool, file))
}
