//! Local filesystem backend implementing VirtualFileSystem.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};

use immostat_types::error::Result;

use crate::vfs::{VirtualFileSystem, WritableFile};

/// Local filesystem implementation of VirtualFileSystem.
pub struct LocalFileSystem;

struct LocalWritableFile {
    file: BufWriter<File>,
}

impl Write for LocalWritableFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl WritableFile for LocalWritableFile {
    fn flush_all(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }
}

impl VirtualFileSystem for LocalFileSystem {
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn WritableFile>> {
        let file = File::create(path)?;
        Ok(Box::new(LocalWritableFile {
            file: BufWriter::new(file),
        }))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(std::path::Path::new(path).exists())
    }

    fn mkdir_p(&self, path: &str) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &str) -> Result<()> {
        fs::remove_dir_all(path)?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::join;

    #[test]
    fn test_write_read_list() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();
        let fs = LocalFileSystem;

        let sub = join(base, "a/b");
        fs.mkdir_p(&sub).unwrap();
        assert!(fs.exists(&sub).unwrap());

        let path = join(&sub, "hello.txt");
        {
            let mut f = fs.open_write(&path).unwrap();
            f.write_all(b"bonjour").unwrap();
            f.flush_all().unwrap();
        }
        assert_eq!(fs.read_to_string(&path).unwrap(), "bonjour");
        assert_eq!(fs.list_dir(&sub).unwrap(), vec!["hello.txt".to_string()]);

        fs.remove_dir_all(&join(base, "a")).unwrap();
        assert!(!fs.exists(&sub).unwrap());
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = join(dir.path().to_str().unwrap(), "CURRENT");
        let fs = LocalFileSystem;

        fs.write_atomic(&path, b"one").unwrap();
        fs.write_atomic(&path, b"two").unwrap();
        assert_eq!(fs.read_to_string(&path).unwrap(), "two");
        assert!(!fs.exists(&format!("{}.tmp", path)).unwrap());
    }

    #[test]
    fn test_open_missing_is_io_error() {
        let fs = LocalFileSystem;
        assert!(matches!(
            fs.open_read("/definitely/not/here.csv"),
            Err(immostat_types::error::ImmoError::Io(_))
        ));
    }
}
