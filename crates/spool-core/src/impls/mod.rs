//! Impls - implementations of the ports that ship with the crate.
//!
//! - **LogDeadLetter**: default dead-letter sink, log only
//! - **DirectoryDeadLetter**: quarantine directory

pub mod dead_letter;

pub use self::dead_letter::{DirectoryDeadLetter, LogDeadLetter};
