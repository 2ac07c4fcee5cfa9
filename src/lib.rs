//! anchorpatch: replace an anchor-bounded region of a text file
//!
//! The pure transformation lives in [`anchor`]; [`file_patcher`] wraps it
//! with file I/O, backups and atomic writes. The binary is at src/main.rs.

pub mod anchor;
pub mod backup_manager;
pub mod cli;
pub mod config;
pub mod diff_formatter;
pub mod disk_space;
pub mod error;
pub mod file_patcher;
pub mod logger;
pub mod recipe;

// Re-export commonly used types for convenience
pub use anchor::{AnchorPatch, AnchorPattern, MissReason, PatchOutcome, Snippet};
pub use backup_manager::{BackupLimits, BackupManager, BackupMetadata, FileBackup};
pub use error::PatchError;
pub use file_patcher::{FilePatcher, MissPolicy, PatchOptions, PatchReport};
pub use recipe::{PatchRecipe, RecipeOverrides, ResolvedRecipe};
