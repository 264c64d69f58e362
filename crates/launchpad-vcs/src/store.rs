//! Filesystem-backed version store.
//!
//! Layout under the store root:
//!
//! ```text
//! <app>/revisions/<seq:010>/manifest.json
//! <app>/revisions/<seq:010>/files/...
//! <app>/contexts/<seq:010>/...           build contexts
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use launchpad_core::AppName;

use crate::error::{VcsError, VcsResult};
use crate::fileset::{FileSet, validate_path};

const MANIFEST: &str = "manifest.json";
const FILES_DIR: &str = "files";

/// An immutable snapshot of an app's files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub app: AppName,
    pub sequence: u64,
    /// SHA-256 content hash of the file set.
    pub hash: String,
    pub created_at: u64,
    pub files: Vec<String>,
}

/// Append-only per-app history of file sets.
///
/// Callers serialize commits per app; the store itself does not lock.
pub trait VersionStore: Send + Sync {
    /// Commit a file set. Identical content to the latest revision returns
    /// that revision instead of creating a new one.
    fn commit(&self, app: &AppName, files: &FileSet) -> VcsResult<Revision>;

    /// Materialize a revision into a fresh build-context directory.
    fn checkout(&self, app: &AppName, sequence: u64) -> VcsResult<PathBuf>;

    fn latest(&self, app: &AppName) -> VcsResult<Option<Revision>>;

    /// Read back the file set of a revision.
    fn files(&self, app: &AppName, sequence: u64) -> VcsResult<FileSet>;

    /// Remove every revision and build context of an app. Missing apps are
    /// not an error.
    fn purge(&self, app: &AppName) -> VcsResult<()>;
}

pub struct FsVersionStore {
    root: PathBuf,
}

impl FsVersionStore {
    pub fn open(root: impl Into<PathBuf>) -> VcsResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| VcsError::fault("<root>", e))?;
        debug!(root = %root.display(), "version store opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn app_dir(&self, app: &AppName) -> PathBuf {
        self.root.join(app.as_str())
    }

    fn revisions_dir(&self, app: &AppName) -> PathBuf {
        self.app_dir(app).join("revisions")
    }

    fn revision_dir(&self, app: &AppName, sequence: u64) -> PathBuf {
        self.revisions_dir(app).join(format!("{sequence:010}"))
    }

    fn latest_sequence(&self, app: &AppName) -> VcsResult<Option<u64>> {
        let dir = self.revisions_dir(app);
        if !dir.exists() {
            return Ok(None);
        }
        let entries = fs::read_dir(&dir).map_err(|e| VcsError::fault(app, e))?;
        let mut latest = None;
        for entry in entries {
            let entry = entry.map_err(|e| VcsError::fault(app, e))?;
            let name = entry.file_name();
            // Staging directories start with '.', so they never parse.
            if let Some(seq) = name.to_str().and_then(|n| n.parse::<u64>().ok()) {
                latest = latest.max(Some(seq));
            }
        }
        Ok(latest)
    }

    fn read_manifest(&self, app: &AppName, sequence: u64) -> VcsResult<Revision> {
        let path = self.revision_dir(app, sequence).join(MANIFEST);
        if !path.exists() {
            return Err(VcsError::RevisionNotFound {
                app: app.to_string(),
                sequence,
            });
        }
        let bytes = fs::read(&path).map_err(|e| VcsError::fault(app, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| VcsError::fault(app, format!("corrupt manifest {}: {e}", path.display())))
    }

    fn write_staged(&self, staging: &Path, files: &FileSet, revision: &Revision) -> std::io::Result<()> {
        let files_dir = staging.join(FILES_DIR);
        fs::create_dir_all(&files_dir)?;
        for (path, content) in files.iter() {
            let target = files_dir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            write_synced(&target, content.as_bytes())?;
        }
        let manifest = serde_json::to_vec_pretty(revision)?;
        write_synced(&staging.join(MANIFEST), &manifest)?;
        Ok(())
    }
}

impl VersionStore for FsVersionStore {
    fn commit(&self, app: &AppName, files: &FileSet) -> VcsResult<Revision> {
        if files.is_empty() {
            return Err(VcsError::EmptyFileSet {
                app: app.to_string(),
            });
        }
        let hash = files.content_hash();
        let latest = self.latest(app)?;
        if let Some(latest) = latest.as_ref().filter(|r| r.hash == hash) {
            debug!(app = %app, sequence = latest.sequence, "file set unchanged, reusing revision");
            return Ok(latest.clone());
        }

        let sequence = latest.map(|r| r.sequence + 1).unwrap_or(1);
        let revision = Revision {
            app: app.clone(),
            sequence,
            hash,
            created_at: epoch_secs(),
            files: files.paths().map(str::to_string).collect(),
        };

        let revisions = self.revisions_dir(app);
        fs::create_dir_all(&revisions).map_err(|e| VcsError::fault(app, e))?;
        let staging = revisions.join(format!(".staging-{sequence:010}"));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| VcsError::fault(app, e))?;
        }

        let written = self
            .write_staged(&staging, files, &revision)
            .and_then(|()| fs::rename(&staging, self.revision_dir(app, sequence)))
            .and_then(|()| sync_dir(&revisions));
        if let Err(e) = written {
            warn!(app = %app, sequence, error = %e, "revision write failed");
            let _ = fs::remove_dir_all(&staging);
            return Err(VcsError::fault(app, e));
        }

        info!(app = %app, sequence, files = revision.files.len(), "revision committed");
        Ok(revision)
    }

    fn checkout(&self, app: &AppName, sequence: u64) -> VcsResult<PathBuf> {
        let revision = self.read_manifest(app, sequence)?;
        let source = self.revision_dir(app, sequence).join(FILES_DIR);
        let context = self.app_dir(app).join("contexts").join(format!("{sequence:010}"));
        if context.exists() {
            fs::remove_dir_all(&context).map_err(|e| VcsError::fault(app, e))?;
        }
        fs::create_dir_all(&context).map_err(|e| VcsError::fault(app, e))?;

        for entry in WalkDir::new(&source).min_depth(1) {
            let entry = entry.map_err(|e| VcsError::fault(app, e))?;
            let relative = entry
                .path()
                .strip_prefix(&source)
                .map_err(|e| VcsError::fault(app, e))?;
            let target = context.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| VcsError::fault(app, e))?;
            } else {
                fs::copy(entry.path(), &target).map_err(|e| VcsError::fault(app, e))?;
            }
        }

        debug!(app = %app, sequence = revision.sequence, context = %context.display(), "revision checked out");
        Ok(context)
    }

    fn latest(&self, app: &AppName) -> VcsResult<Option<Revision>> {
        match self.latest_sequence(app)? {
            Some(seq) => self.read_manifest(app, seq).map(Some),
            None => Ok(None),
        }
    }

    fn files(&self, app: &AppName, sequence: u64) -> VcsResult<FileSet> {
        let revision = self.read_manifest(app, sequence)?;
        let files_dir = self.revision_dir(app, sequence).join(FILES_DIR);
        let mut set = FileSet::new();
        for path in &revision.files {
            let relative = validate_path(path)?;
            let content =
                fs::read_to_string(files_dir.join(relative)).map_err(|e| VcsError::fault(app, e))?;
            set.insert(path.clone(), content)?;
        }
        Ok(set)
    }

    fn purge(&self, app: &AppName) -> VcsResult<()> {
        let dir = self.app_dir(app);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| VcsError::fault(app, e))?;
            info!(app = %app, "revisions purged");
        }
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
