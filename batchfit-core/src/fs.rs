//! Filesystem capability
//!
//! Every component that reads, writes, stats, lists or removes files goes
//! through [`FileSystem`] so the capability set is explicit at each seam.
//! [`OsFileSystem`] is the production implementation over `std::fs`.

use std::fs::{self, Metadata, Permissions};
use std::io;
use std::path::Path;

/// File and directory operations used by the runner
pub trait FileSystem: Send + Sync {
    /// Reads a file and splits it into lines (without terminators)
    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Reads a file's raw bytes
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Writes `contents` to `path`, replacing any existing file
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Returns metadata for `path`, following symlinks
    fn metadata(&self, path: &Path) -> io::Result<Metadata>;

    /// Lists the entry names directly inside `dir`, sorted lexicographically
    fn list(&self, dir: &Path) -> io::Result<Vec<String>>;

    /// Creates `dir` and any missing parents
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    /// Removes a file, or a directory together with its contents
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Copies a file's contents and permissions
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Applies `permissions` to `path`
    fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()>;

    /// Writes each line followed by a newline
    fn write_lines(&self, path: &Path, lines: &[String]) -> io::Result<()> {
        let mut contents = String::new();
        for line in lines {
            contents.push_str(line);
            contents.push('\n');
        }
        self.write(path, contents.as_bytes())
    }

    /// Whether anything exists at `path`
    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }

    /// Whether `path` exists and is a directory
    fn is_dir(&self, path: &Path) -> bool {
        self.metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }
}

/// [`FileSystem`] backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_lines(&self, path: &Path) -> io::Result<Vec<String>> {
        let contents = fs::read_to_string(path)?;
        Ok(contents.lines().map(str::to_string).collect())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn metadata(&self, path: &Path) -> io::Result<Metadata> {
        fs::metadata(path)
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        if fs::symlink_metadata(path)?.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn set_permissions(&self, path: &Path, permissions: Permissions) -> io::Result<()> {
        fs::set_permissions(path, permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_is_sorted() {
        let dir = tempdir().unwrap();
        for name in ["b.mod", "a.mod", "c.lst"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let names = OsFileSystem.list(dir.path()).unwrap();
        assert_eq!(names, vec!["a.mod", "b.mod", "c.lst"]);
    }

    #[test]
    fn test_write_and_read_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run001.mod");
        let lines = vec!["$PROB test".to_string(), "$DATA ../data.csv".to_string()];

        OsFileSystem.write_lines(&path, &lines).unwrap();

        assert_eq!(OsFileSystem.read_lines(&path).unwrap(), lines);
    }

    #[test]
    fn test_remove_all_handles_files_and_dirs() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("FCON");
        let sub = dir.path().join("temp_dir");
        fs::write(&file, "x").unwrap();
        fs::create_dir_all(sub.join("nested")).unwrap();

        OsFileSystem.remove_all(&file).unwrap();
        OsFileSystem.remove_all(&sub).unwrap();

        assert!(!OsFileSystem.exists(&file));
        assert!(!OsFileSystem.is_dir(&sub));
    }

    #[test]
    fn test_list_missing_dir_fails() {
        let dir = tempdir().unwrap();
        assert!(OsFileSystem.list(&dir.path().join("absent")).is_err());
    }
}
