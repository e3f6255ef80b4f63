// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Generic file trees.
//!
//! Dashboard and alert group files are read through a [`FileTree`], so the
//! same parsing logic serves a directory on the local machine and the sparse
//! in-memory checkout of a remote repository. All paths handed to a tree are
//! relative to its root.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Component, Path, PathBuf},
};

/// Entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreeEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read/write access to a tree of files.
pub trait FileTree {
    /// Check if relative path names a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// List direct children of a directory, sorted by name.
    fn read_dir(&self, path: &Path) -> Result<Vec<TreeEntry>>;

    /// Read file as UTF-8 text.
    fn read(&self, path: &Path) -> Result<String>;

    /// Check if relative path names a file.
    fn is_file(&self, path: &Path) -> bool;

    /// Create or replace file.
    fn write(&mut self, path: &Path, contents: &str) -> Result<()>;

    /// Remove file.
    fn remove(&mut self, path: &Path) -> Result<()>;
}

impl<T> FileTree for &mut T
where
    T: FileTree + ?Sized,
{
    fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<TreeEntry>> {
        (**self).read_dir(path)
    }

    fn read(&self, path: &Path) -> Result<String> {
        (**self).read(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        (**self).is_file(path)
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<()> {
        (**self).write(path, contents)
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        (**self).remove(path)
    }
}

/// Directory on the local file system.
#[derive(Debug, Clone)]
pub struct OsTree {
    root: PathBuf,
}

impl OsTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl FileTree for OsTree {
    fn is_dir(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<TreeEntry>> {
        let full = self.resolve(path);
        let entries = fs::read_dir(&full).map_err(|err| TreeError::io(err, &full))?;

        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| TreeError::io(err, &full))?;
            let file_type = entry
                .file_type()
                .map_err(|err| TreeError::io(err, entry.path()))?;
            listing.push(TreeEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        listing.sort();

        Ok(listing)
    }

    fn read(&self, path: &Path) -> Result<String> {
        let full = self.resolve(path);
        fs::read_to_string(&full).map_err(|err| TreeError::io(err, full))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<()> {
        let full = self.resolve(path);
        fs::write(&full, contents.as_bytes()).map_err(|err| TreeError::io(err, full))
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        let full = self.resolve(path);
        fs::remove_file(&full).map_err(|err| TreeError::io(err, full))
    }
}

/// Tree of files held in memory.
///
/// Directories exist implicitly through the files they contain, plus any
/// directory explicitly registered with [`MemTree::insert_dir`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemTree {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl MemTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert file, registering all of its parent directories.
    pub fn insert_file(&mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = normalize(&path.into());
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            parent = dir.parent();
        }
        self.files.insert(path, contents.into());
    }

    /// Register a directory even if it holds no files.
    pub fn insert_dir(&mut self, path: impl Into<PathBuf>) {
        self.dirs.insert(normalize(&path.into()));
    }

    /// Number of files in tree.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileTree for MemTree {
    fn is_dir(&self, path: &Path) -> bool {
        let path = normalize(path);
        path.as_os_str().is_empty() || self.dirs.contains(&path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<TreeEntry>> {
        let dir = normalize(path);
        if !self.is_dir(&dir) {
            return Err(TreeError::NotFound { path: dir });
        }

        let files = self.files.keys().map(|path| (path, false));
        let dirs = self.dirs.iter().map(|path| (path, true));
        let mut listing = files
            .chain(dirs)
            .filter(|(path, _)| path.parent() == Some(dir.as_path()))
            .filter_map(|(path, is_dir)| {
                path.file_name().map(|name| TreeEntry {
                    name: name.to_string_lossy().into_owned(),
                    is_dir,
                })
            })
            .collect::<Vec<_>>();
        listing.sort();

        Ok(listing)
    }

    fn read(&self, path: &Path) -> Result<String> {
        let path = normalize(path);
        let bytes = self
            .files
            .get(&path)
            .ok_or_else(|| TreeError::NotFound { path: path.clone() })?;
        String::from_utf8(bytes.clone()).map_err(|err| TreeError::Utf8 { source: err, path })
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<()> {
        let path = normalize(path);
        if let Some(parent) = path.parent() {
            if !self.is_dir(parent) {
                return Err(TreeError::NotFound {
                    path: parent.to_path_buf(),
                });
            }
        }
        self.files.insert(path, contents.as_bytes().to_vec());
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        let path = normalize(path);
        self.files
            .remove(&path)
            .map(|_| ())
            .ok_or(TreeError::NotFound { path })
    }
}

/// Lexically normalize a path.
///
/// Drops `.` components, resolves `..` against preceding components, and
/// strips trailing separators. Does not touch the file system, so it works
/// on paths that do not exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// File tree error types.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// File system operation failed.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Path does not exist in tree.
    #[error("{:?} does not exist", path.display())]
    NotFound { path: PathBuf },

    /// File is not valid UTF-8.
    #[error("{:?} is not valid UTF-8", path.display())]
    Utf8 {
        #[source]
        source: std::string::FromUtf8Error,
        path: PathBuf,
    },
}

impl TreeError {
    fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if source.kind() == IoErrorKind::NotFound {
            return Self::NotFound { path };
        }
        Self::Io { source, path }
    }
}

/// Friendly result alias :3
pub type Result<T, E = TreeError> = std::result::Result<T, E>;
