//! Checkpointing for resumable feed consumption.
//!
//! The cursor file is written atomically (temp file + rename) with a backup
//! of the previous value.

mod cursor;

pub use cursor::*;
