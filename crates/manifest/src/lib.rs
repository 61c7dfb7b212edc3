//! # Manifest
//!
//! Declared file sets and content-digest change detection.
//!
//! This crate provides functionality to:
//! - Hold an ordered, validated mapping of relative paths to intended content
//! - Fingerprint content with BLAKE3
//! - Read the current state of a file without treating absence as an error
//! - Compare a manifest against a deployment directory
//!
//! ## Example
//!
//! ```no_run
//! use manifest::{FileManifest, diff_manifest};
//! use std::path::Path;
//!
//! let mut files = FileManifest::new();
//! files.insert("run.sh", "#!/bin/sh\necho hi")?;
//! files.insert("settings.conf", "level = 3")?;
//!
//! let diff = diff_manifest(&files, Path::new("/opt/deploy"))?;
//! for (path, change) in &diff.changes {
//!     println!("{}: {:?}", path.display(), change);
//! }
//! # Ok::<(), manifest::Error>(())
//! ```

mod error;
mod types;

pub use error::{Error, Result};
pub use types::{ContentDigest, FileChange, FileState, ManifestDiff, ManifestEntry};

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Ordered set of declared files
///
/// Declaration order is preserved: it decides parameter-rewrite
/// tie-breaks and the order files are written in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ManifestEntry>", into = "Vec<ManifestEntry>")]
pub struct FileManifest {
    entries: Vec<ManifestEntry>,
}

impl TryFrom<Vec<ManifestEntry>> for FileManifest {
    type Error = Error;

    fn try_from(entries: Vec<ManifestEntry>) -> Result<Self> {
        Self::from_pairs(entries.into_iter().map(|e| (e.path, e.content)))
    }
}

impl From<FileManifest> for Vec<ManifestEntry> {
    fn from(manifest: FileManifest) -> Self {
        manifest.entries
    }
}

impl FileManifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from `(path, content)` pairs, validating each one
    pub fn from_pairs<I, P, C>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let mut manifest = Self::new();
        for (path, content) in pairs {
            manifest.insert(path, content)?;
        }
        Ok(manifest)
    }

    /// Declare a file
    ///
    /// Rejects absolute paths, empty content and duplicate paths.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> Result<()> {
        let path = path.into();
        let content = content.into();

        if path.starts_with('/') {
            return Err(Error::AbsolutePath(path));
        }
        if content.is_empty() {
            return Err(Error::EmptyContent(path));
        }
        if self.contains(&path) {
            return Err(Error::DuplicatePath(path));
        }

        self.entries.push(ManifestEntry { path, content });
        Ok(())
    }

    /// Look up an entry by relative path
    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Whether `path` is declared
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Declared relative paths, in declaration order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Entries in declaration order
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute the digest of `content`
pub fn digest(content: &[u8]) -> ContentDigest {
    ContentDigest::of(content)
}

/// Read the current state of `path`
///
/// A missing file is [`FileState::Absent`]; any other read failure is an error.
/// Symlinks are reported as [`FileState::NotRegular`], not followed.
pub fn current_state(path: &Path) -> Result<FileState> {
    let io_error = |source: std::io::Error| Error::Io {
        path: path.to_path_buf(),
        source,
    };

    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FileState::Absent),
        Err(e) => return Err(io_error(e)),
    };
    if !meta.is_file() {
        return Ok(FileState::NotRegular {
            kind: kind_of(&meta.file_type()).to_string(),
        });
    }

    let content = fs::read(path).map_err(io_error)?;
    Ok(FileState::Present {
        digest: digest(&content),
        content,
    })
}

fn kind_of(file_type: &fs::FileType) -> &'static str {
    if file_type.is_symlink() {
        "symlink"
    } else if file_type.is_dir() {
        "directory"
    } else {
        "special file"
    }
}

/// Absolute target path of a manifest entry under `root`
pub fn target_path(root: &Path, relative: &str) -> PathBuf {
    root.join(relative)
}

/// Compare every declared file against what is deployed under `deploy_path`
pub fn diff_manifest(manifest: &FileManifest, deploy_path: &Path) -> Result<ManifestDiff> {
    let mut diff = ManifestDiff::default();

    for entry in manifest.entries() {
        let target = target_path(deploy_path, &entry.path);
        let intended = entry.intended_digest();

        match current_state(&target)? {
            FileState::Absent => {
                diff.changes.insert(target.clone(), FileChange::Absent);
            }
            FileState::Present { digest, content } if digest != intended => {
                diff.changes.insert(
                    target.clone(),
                    FileChange::Modified {
                        current: digest,
                        previous: content,
                    },
                );
            }
            FileState::NotRegular { kind } => {
                diff.changes
                    .insert(target.clone(), FileChange::NotRegular { found: kind });
            }
            FileState::Present { .. } => {}
        }

        diff.intended.insert(target, intended);
    }

    Ok(diff)
}
