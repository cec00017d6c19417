pub mod error;
pub mod index;
pub mod key;
pub mod page;

pub use error::BTreeError;
pub use index::{BPlusTree, BTreeIterator};
pub use key::IndexKey;
