pub mod error;
pub mod manager;
pub mod replacer;

pub use error::BufferPoolError;
pub use manager::BufferPoolManager;
pub use replacer::{ClockReplacer, LruReplacer, Replacer, ReplacerPolicy};
