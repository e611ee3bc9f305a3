//! Virtual filesystem abstraction.
//!
//! The record source and the snapshot store go through this trait, so
//! inputs and snapshots can live on any backend that implements it.

use std::io::{Read, Write};

use immostat_types::error::Result;

/// A writable file.
pub trait WritableFile: Write + Send {
    /// Flush all buffered data to the underlying storage.
    fn flush_all(&mut self) -> Result<()>;
}

/// Virtual filesystem backend.
pub trait VirtualFileSystem: Send + Sync {
    /// Open a file for reading.
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Open a file for writing (creates or truncates).
    fn open_write(&self, path: &str) -> Result<Box<dyn WritableFile>>;

    /// Check if a path exists.
    fn exists(&self, path: &str) -> Result<bool>;

    /// Create directories recursively.
    fn mkdir_p(&self, path: &str) -> Result<()>;

    /// Remove a directory and everything below it.
    fn remove_dir_all(&self, path: &str) -> Result<()>;

    /// Rename a file or directory. Replaces an existing file at `to`.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// List entry names in a directory.
    fn list_dir(&self, path: &str) -> Result<Vec<String>>;

    /// Read the entire contents of a file as a string.
    fn read_to_string(&self, path: &str) -> Result<String> {
        let mut file = self.open_read(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(contents)
    }

    /// Replace `path` with `contents` so that readers see either the old or
    /// the new file, never a partial one.
    fn write_atomic(&self, path: &str, contents: &[u8]) -> Result<()> {
        let tmp = format!("{}.tmp", path);
        {
            let mut file = self.open_write(&tmp)?;
            file.write_all(contents)?;
            file.flush_all()?;
        }
        self.rename(&tmp, path)
    }
}

/// Join two path components with `/`.
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}
