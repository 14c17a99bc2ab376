//! Virtual filesystem abstraction
//!
//! Playback code never touches `std::fs` directly; it asks a `FileSystem`
//! for a readable handle by logical name. Lookups distinguish a missing
//! resource (`CoreError::NotFound`) from one that exists but cannot be
//! opened (`CoreError::Unreadable`).
//!
//! Names may omit their extension: `"bgm/theme"` matches `bgm/theme.ogg`
//! on disk. The matched extension is reported back on the handle as a
//! decoding hint.

use crate::error::{CoreError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Component, Path, PathBuf};

/// Combined read + seek object bound, as required by decoders
pub trait ReadSeek: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> ReadSeek for T {}

/// An opened, readable resource
pub struct FileHandle {
    /// Readable, seekable stream positioned at the start of the resource
    pub reader: Box<dyn ReadSeek>,

    /// Lowercase extension of the matched resource, if it had one
    pub extension: Option<String>,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

/// Resource lookup and open
///
/// Implementations must be callable from any thread.
pub trait FileSystem: Send + Sync {
    /// Locate `name` and open it for reading
    ///
    /// # Returns
    /// * `Ok(handle)` - Resource found and opened
    /// * `Err(CoreError::NotFound)` - No resource matches `name`
    /// * `Err(CoreError::Unreadable)` - Matched, but could not be opened
    fn open_read(&self, name: &str) -> Result<FileHandle>;
}

/// Filesystem rooted at a directory on disk
pub struct DiskFileSystem {
    root: PathBuf,
}

impl DiskFileSystem {
    /// Create a filesystem serving files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find a file whose stem matches `want` regardless of extension
    fn match_any_extension(want: &Path) -> Option<PathBuf> {
        let dir = want.parent()?;
        let stem = want.file_name()?;

        let entries = std::fs::read_dir(dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.file_stem() == Some(stem) {
                return Some(path);
            }
        }
        None
    }
}

impl FileSystem for DiskFileSystem {
    fn open_read(&self, name: &str) -> Result<FileHandle> {
        let rel = Path::new(name);

        // Only plain relative components; anything that could escape the
        // root is treated as a miss
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(CoreError::not_found(name));
        }

        let full = self.root.join(rel);
        let path = if full.is_file() {
            full
        } else if rel.extension().is_none() {
            Self::match_any_extension(&full).ok_or_else(|| CoreError::not_found(name))?
        } else {
            return Err(CoreError::not_found(name));
        };

        let file = File::open(&path).map_err(|e| CoreError::unreadable(name, e.to_string()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        Ok(FileHandle {
            reader: Box::new(file),
            extension,
        })
    }
}

/// In-memory filesystem
///
/// Maps logical names to byte vectors. Used by embedders that ship
/// assets inside their binary, and by tests.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFileSystem {
    /// Create an empty in-memory filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `name`
    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(name.into(), bytes);
    }

    fn lookup<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.files.contains_key(name) {
            return Some(name);
        }

        // Extension-less lookup, same contract as the disk filesystem
        if Path::new(name).extension().is_some() {
            return None;
        }
        self.files
            .keys()
            .find(|key| Path::new(key).with_extension("").as_os_str() == name)
            .map(String::as_str)
    }
}

impl FileSystem for MemoryFileSystem {
    fn open_read(&self, name: &str) -> Result<FileHandle> {
        let key = self.lookup(name).ok_or_else(|| CoreError::not_found(name))?;
        let bytes = self.files[key].clone();
        let extension = Path::new(key)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        Ok(FileHandle {
            reader: Box::new(Cursor::new(bytes)),
            extension,
        })
    }
}
