//! Cantus - Core
//!
//! Shared foundation for the Cantus playback engine:
//! - Error taxonomy (`CoreError`) separating "not found" from "found but
//!   unreadable" - callers treat the two very differently
//! - Virtual filesystem abstraction (`FileSystem`) with disk and in-memory
//!   implementations
//!
//! `cantus-core` has no audio dependencies and works anywhere std does.

mod error;
pub mod vfs;

// Public exports
pub use error::{CoreError, Result};
pub use vfs::{DiskFileSystem, FileHandle, FileSystem, MemoryFileSystem, ReadSeek};
