//! Read, patch and write back a single target file

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::anchor::{AnchorPatch, MissReason, PatchOutcome, Snippet};
use crate::backup_manager::BackupManager;
use crate::error::PatchError;

/// How a miss is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissPolicy {
    /// Report the miss and leave the file untouched
    #[default]
    Checked,
    /// Rewrite the file with its unchanged content, without a diagnostic
    Unchecked,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    pub dry_run: bool,
    pub policy: MissPolicy,
}

#[derive(Debug)]
pub enum PatchReport {
    /// The file was rewritten with the patched content
    Applied {
        original: String,
        patched: String,
        span: Range<usize>,
        backup_id: Option<String>,
    },
    /// Dry run: what would have been written
    Preview {
        original: String,
        patched: String,
        span: Range<usize>,
    },
    AlreadyApplied,
    NotMatched {
        reason: MissReason,
        snippet: Option<Snippet>,
        /// Unchecked mode still rewrote the (unchanged) content
        rewritten: bool,
    },
}

pub struct FilePatcher {
    patch: AnchorPatch,
    description: String,
}

impl FilePatcher {
    pub fn new(patch: AnchorPatch, description: impl Into<String>) -> Self {
        Self {
            patch,
            description: description.into(),
        }
    }

    pub fn patch(&self) -> &AnchorPatch {
        &self.patch
    }

    /// Run the patch against `path`. A backup is taken through `backups`
    /// right before the write; pass `None` to skip it.
    pub fn run(
        &self,
        path: &Path,
        options: PatchOptions,
        backups: Option<&mut BackupManager>,
    ) -> Result<PatchReport> {
        let original = read_target(path)?;
        tracing::debug!(path = %path.display(), bytes = original.len(), "read target");

        match self.patch.apply(&original) {
            PatchOutcome::Patched { content, span } => {
                if options.dry_run {
                    return Ok(PatchReport::Preview {
                        original,
                        patched: content,
                        span,
                    });
                }

                let backup_id = match backups {
                    Some(manager) => Some(
                        manager
                            .create_backup(&self.description, &[path.to_path_buf()])
                            .context("Backup failed; the target was not modified")?,
                    ),
                    None => None,
                };

                write_atomic(path, &content)?;
                tracing::info!(path = %path.display(), "patched");

                Ok(PatchReport::Applied {
                    original,
                    patched: content,
                    span,
                    backup_id,
                })
            }
            PatchOutcome::AlreadyApplied => {
                tracing::info!(path = %path.display(), "replacement already in place");
                Ok(PatchReport::AlreadyApplied)
            }
            PatchOutcome::NotMatched { reason, snippet } => {
                tracing::warn!(path = %path.display(), %reason, "pattern not matched");
                let rewritten = options.policy == MissPolicy::Unchecked && !options.dry_run;
                if rewritten {
                    write_atomic(path, &original)?;
                }
                Ok(PatchReport::NotMatched {
                    reason,
                    snippet,
                    rewritten,
                })
            }
        }
    }
}

/// Read the target as UTF-8 text
pub fn read_target(path: &Path) -> Result<String, PatchError> {
    fs::read_to_string(path).map_err(|e| PatchError::file_access(path, "reading", e))
}

/// Replace `path` with `content` via a temp file in the same directory and
/// a rename, keeping the original permissions.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), PatchError> {
    let parent_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut temp_file = NamedTempFile::new_in(&parent_dir)
        .map_err(|e| PatchError::file_access(&parent_dir, "creating a temp file in", e))?;

    temp_file
        .write_all(content.as_bytes())
        .and_then(|_| temp_file.as_file().sync_all())
        .map_err(|e| PatchError::file_access(temp_file.path(), "writing", e))?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp_file.path(), metadata.permissions())
            .map_err(|e| PatchError::file_access(temp_file.path(), "setting permissions on", e))?;
    }

    temp_file
        .persist(path)
        .map_err(|e| PatchError::file_access(path, "writing", e.error))?;

    Ok(())
}
