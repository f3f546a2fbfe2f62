use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::info;

use crate::changeset::ChangeSet;
use crate::errors::PipelineError;
use crate::ignore::IgnoreFilter;

/// Writes change sets into a working copy.
///
/// Every edit of a batch is resolved before the first byte is written: one
/// edit that escapes the root or targets an ignored path rejects the whole
/// batch. Once writing starts there is no rollback; a failing edit leaves the
/// earlier ones on disk.
pub struct ChangeApplier<'a> {
    root: &'a Path,
    filter: &'a IgnoreFilter,
}

impl<'a> ChangeApplier<'a> {
    pub fn new(root: &'a Path, filter: &'a IgnoreFilter) -> Self {
        Self { root, filter }
    }

    /// Resolve every edit, returning the relative paths in edit order.
    pub fn validate(&self, change_set: &ChangeSet) -> Result<Vec<PathBuf>, PipelineError> {
        change_set
            .iter()
            .map(|edit| self.resolve(&edit.path))
            .collect()
    }

    /// Write every edit, returning the relative paths written in order.
    pub fn apply(&self, change_set: &ChangeSet) -> Result<Vec<PathBuf>, PipelineError> {
        let targets = self.validate(change_set)?;

        for (rel, edit) in targets.iter().zip(change_set.iter()) {
            let full = self.root.join(rel);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).map_err(|source| PipelineError::WriteFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(&full, edit.content.as_bytes())
                .map_err(|source| PipelineError::WriteFailed { path: full.clone(), source })?;
            debug!("Wrote {} ({} bytes)", rel.display(), edit.content.len());
        }

        info!("Applied {} edit(s)", targets.len());
        Ok(targets)
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, PipelineError> {
        let rejected = || PipelineError::PathTraversalRejected {
            path: path.to_string(),
        };

        let rel = normalize_relative(Path::new(path)).ok_or_else(rejected)?;
        if self.filter.excludes_path(&rel) {
            return Err(PipelineError::IgnoredPathRejected {
                path: path.to_string(),
            });
        }
        if !self.stays_inside_root(&rel) {
            return Err(rejected());
        }
        Ok(rel)
    }

    /// Follow symlinks already present in the working copy: the deepest
    /// existing ancestor of the target must still live under the root.
    fn stays_inside_root(&self, rel: &Path) -> bool {
        let Ok(root) = self.root.canonicalize() else {
            return false;
        };
        let target = self.root.join(rel);
        let Some(existing) = target
            .ancestors()
            .find(|p| p.symlink_metadata().is_ok())
        else {
            return false;
        };
        match existing.canonicalize() {
            Ok(resolved) => resolved.starts_with(&root),
            // Dangling symlink.
            Err(_) => false,
        }
    }
}

/// Lexically normalize a relative path. `None` for absolute paths, paths that
/// climb above their start, and paths that name the root itself.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}
