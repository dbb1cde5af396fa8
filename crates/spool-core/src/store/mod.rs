//! Durable storage: per-path locks and the file store built on them.

pub mod file_store;
pub mod path_lock;

pub use self::file_store::{FileStore, StoreEntry};
pub use self::path_lock::{PathLocks, PathReadGuard, PathWriteGuard};
