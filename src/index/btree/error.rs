use thiserror::Error;

use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("out of memory: all frames pinned while {0}")]
    OutOfMemory(&'static str),

    #[error("index header page cannot hold another root record")]
    HeaderFull,

    #[error("buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),
}
