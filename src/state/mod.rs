//! Bookmark persistence between sync runs
//!
//! Provides a versioned JSON state file with atomic writes and file locking.

pub mod checkpoint;
pub mod file;
pub mod lock;

pub use checkpoint::Checkpoint;
pub use file::{Bookmark, StateError, StateFile};
pub use lock::StateLock;
