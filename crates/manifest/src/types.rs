//! Data types for the manifest crate

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// BLAKE3 fingerprint of a byte sequence, as lowercase hex
///
/// Used for change detection only, never for integrity or security checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the digest of `content`
    pub fn of(content: &[u8]) -> Self {
        Self(blake3::hash(content).to_hex().to_string())
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for compact display
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blake3:{}", self.0)
    }
}

/// One declared file: relative path plus intended content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the deployment root
    pub path: String,
    /// Declared content, without the trailing newline added on write
    pub content: String,
}

impl ManifestEntry {
    /// The exact bytes written to disk for this entry
    pub fn rendered(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.content.len() + 1);
        bytes.extend_from_slice(self.content.as_bytes());
        bytes.push(b'\n');
        bytes
    }

    /// Digest of the rendered content
    pub fn intended_digest(&self) -> ContentDigest {
        ContentDigest::of(&self.rendered())
    }
}

/// Observed state of a file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    /// Nothing exists at the path
    Absent,
    /// File exists with this content
    Present {
        digest: ContentDigest,
        content: Vec<u8>,
    },
    /// A symlink, directory or special file; never read through
    NotRegular { kind: String },
}

impl FileState {
    /// Digest of the current content, if any
    pub fn digest(&self) -> Option<&ContentDigest> {
        match self {
            Self::Absent | Self::NotRegular { .. } => None,
            Self::Present { digest, .. } => Some(digest),
        }
    }
}

/// A pending change for one declared file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    /// File does not exist yet
    Absent,
    /// File exists with different content
    Modified {
        /// Digest of what is on disk now
        current: ContentDigest,
        /// Content on disk now, kept for diff display
        #[serde(skip)]
        previous: Vec<u8>,
    },
    /// Something other than a regular file occupies the path
    NotRegular { found: String },
}

impl FileChange {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Result of comparing a manifest against a deployment directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestDiff {
    /// Files needing a write, keyed by absolute path
    pub changes: BTreeMap<PathBuf, FileChange>,
    /// Intended digest of every declared file, keyed by absolute path
    pub intended: BTreeMap<PathBuf, ContentDigest>,
}

impl ManifestDiff {
    /// Whether any declared file differs from disk
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Number of files that would be created
    pub fn absent_count(&self) -> usize {
        self.changes.values().filter(|c| c.is_absent()).count()
    }

    /// Number of files whose content differs
    pub fn modified_count(&self) -> usize {
        self.changes.len() - self.absent_count()
    }
}
