//! Validated sets of named files.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{VcsError, VcsResult};

/// Files keyed by relative path, ordered so hashing is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    files: BTreeMap<String, String>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(path, content)` pairs. Any invalid path rejects the
    /// whole set.
    pub fn from_pairs<I, P, C>(pairs: I) -> VcsResult<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let mut set = Self::new();
        for (path, content) in pairs {
            set.insert(path, content)?;
        }
        Ok(set)
    }

    /// Insert or replace a file.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> VcsResult<()> {
        let path = path.into();
        validate_path(&path)?;
        self.files.insert(path, content.into());
        Ok(())
    }

    /// Overlay `other` onto `self`; files in `other` win.
    pub fn merge(&mut self, other: FileSet) {
        self.files.extend(other.files);
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// SHA-256 over every `(path, content)` pair in path order.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.files {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(content.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Reject absolute paths, parent traversal and anything touching `.git`.
pub(crate) fn validate_path(path: &str) -> VcsResult<PathBuf> {
    let invalid = |reason| VcsError::InvalidPath {
        path: path.to_string(),
        reason,
    };
    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    if path.contains('\0') || path.contains('\\') {
        return Err(invalid("illegal character"));
    }
    if path.ends_with('/') {
        return Err(invalid("names a directory"));
    }
    let candidate = Path::new(path);
    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) if part == ".git" => {
                return Err(invalid("touches .git"));
            }
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => return Err(invalid("contains '.'")),
            Component::ParentDir => return Err(invalid("escapes the app directory")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("is absolute"));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(invalid("empty path"));
    }
    Ok(normalized)
}
