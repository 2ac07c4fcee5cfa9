//! Error types and actionable error messages
//!
//! `PatchError` is the domain taxonomy; the binary wraps it in `anyhow` at the edge.

use std::io;
use std::path::{Path, PathBuf};

use crate::anchor::MissReason;

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Target missing, unreadable or unwritable
    #[error("{}", file_access_message(.path, .operation, .source))]
    FileAccess {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// Anchors (or the interior guard) were not found; nothing was written
    #[error("Pattern not matched in '{}': {reason}", .path.display())]
    PatternNotMatched { path: PathBuf, reason: MissReason },

    #[error("Invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("Replacement in '{}' is not valid JSON: {source}", .path.display())]
    InvalidReplacement {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PatchError {
    pub fn file_access(path: &Path, operation: &'static str, source: io::Error) -> Self {
        PatchError::FileAccess {
            path: path.to_path_buf(),
            operation,
            source,
        }
    }
}

/// Check if an IO error is a permission denied error
pub fn is_permission_denied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

/// Check if an IO error is a "not found" error
pub fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

fn file_access_message(path: &Path, operation: &str, err: &io::Error) -> String {
    if is_not_found(err) {
        not_found_error(path, operation)
    } else if is_permission_denied(err) {
        permission_error(path, operation)
    } else {
        format!("Failed {} '{}': {}", operation, path.display(), err)
    }
}

/// Create an enhanced error message for file permission issues
pub fn permission_error(path: &Path, operation: &str) -> String {
    let parent_dir = path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string());

    format!(
        "Permission denied when {} '{}'\n\n\
         Possible fixes:\n\
         1. Check file permissions: ls -l '{}'\n\
         2. The patch is written through a temp file, so '{}' must be writable too\n\
         3. For backup failures: use --backup-dir or --no-backup --force",
        operation,
        path.display(),
        path.display(),
        parent_dir
    )
}

/// Create an enhanced error message for file not found issues
pub fn not_found_error(path: &Path, operation: &str) -> String {
    format!(
        "File not found when {} '{}'\n\n\
         Possible fixes:\n\
         1. Relative targets resolve against the current directory; run from the project root\n\
         2. Override the recipe target with --target <FILE>",
        operation,
        path.display()
    )
}

/// Create an enhanced error message for directory creation failures
pub fn dir_create_error(path: &Path, underlying_err: &io::Error) -> String {
    let base = format!("Failed to create directory: '{}'", path.display());

    if is_permission_denied(underlying_err) {
        format!(
            "{}\n\n\
             Cause: Permission denied\n\n\
             Possible fixes:\n\
             1. Check write permissions on the parent directory\n\
             2. Use --backup-dir to specify a different location",
            base
        )
    } else {
        format!("{}\n\nUnderlying error: {}", base, underlying_err)
    }
}
