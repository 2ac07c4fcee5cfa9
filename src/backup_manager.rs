use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::disk_space;

const MAX_BACKUPS: usize = 50;
const METADATA_FILE: &str = "operation.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Recipe name and anchors of the patch that triggered the backup
    pub description: String,
    pub files: Vec<FileBackup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBackup {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub size: u64,
}

/// Limits applied before a backup is written
#[derive(Debug, Clone, Copy)]
pub struct BackupLimits {
    /// Warn above this many bytes
    pub warn_bytes: u64,
    /// Refuse when the backup would use more than this % of free space
    pub max_disk_usage_percent: f64,
}

impl Default for BackupLimits {
    fn default() -> Self {
        Self {
            warn_bytes: 2 * 1024 * 1024 * 1024,
            max_disk_usage_percent: 60.0,
        }
    }
}

pub struct BackupManager {
    backups_dir: PathBuf,
    limits: BackupLimits,
}

impl BackupManager {
    /// Use ~/.anchorpatch/backups
    pub fn new() -> Result<Self> {
        let backups_dir = crate::config::app_dir()?.join("backups");
        Self::with_directory(backups_dir)
    }

    /// Create a BackupManager with a custom backup directory
    pub fn with_directory(dir: impl Into<PathBuf>) -> Result<Self> {
        let backups_dir = dir.into();

        fs::create_dir_all(&backups_dir).map_err(|e| {
            anyhow::anyhow!(crate::error::dir_create_error(&backups_dir, &e))
        })?;

        Ok(Self {
            backups_dir,
            limits: BackupLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: BackupLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Get the backup directory path
    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Copy `files` into a new backup directory and return its ID.
    /// Files that do not exist are skipped.
    pub fn create_backup(&mut self, description: &str, files: &[PathBuf]) -> Result<String> {
        let mut total_size = 0u64;
        for file_path in files.iter().filter(|p| p.exists()) {
            total_size += file_path
                .metadata()
                .with_context(|| format!("Failed to get file metadata: {}", file_path.display()))?
                .len();
        }

        if total_size > self.limits.warn_bytes {
            tracing::warn!(
                size = %disk_space::bytes_to_human(total_size),
                "this operation will create a large backup"
            );
        }

        disk_space::ensure_room_for_backup(
            &self.backups_dir,
            total_size,
            self.limits.max_disk_usage_percent,
        )
        .with_context(|| {
            format!(
                "Cannot create backup. Files size: {}",
                disk_space::bytes_to_human(total_size)
            )
        })?;

        // Millisecond timestamp keeps IDs sortable; the uuid suffix keeps them unique.
        let id = format!(
            "{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S%3f"),
            Uuid::new_v4().to_string().split_at(8).0
        );
        let backup_dir = self.backups_dir.join(&id);

        fs::create_dir_all(&backup_dir)
            .map_err(|e| anyhow::anyhow!(crate::error::dir_create_error(&backup_dir, &e)))?;

        let mut file_backups = Vec::new();

        for (index, file_path) in files.iter().enumerate() {
            if !file_path.exists() {
                continue;
            }

            let file_name = file_path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", file_path.display()))?;

            // Prefix with the position so two targets sharing a name don't collide.
            let backup_path = backup_dir.join(format!("{}-{}", index, file_name.to_string_lossy()));

            let size = fs::copy(file_path, &backup_path)
                .with_context(|| format!("Failed to backup file: {}", file_path.display()))?;

            file_backups.push(FileBackup {
                original_path: absolute(file_path),
                backup_path,
                size,
            });
        }

        let metadata = BackupMetadata {
            id: id.clone(),
            timestamp: Utc::now(),
            description: description.to_string(),
            files: file_backups,
        };

        let metadata_path = backup_dir.join(METADATA_FILE);
        let metadata_json =
            serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;

        fs::write(&metadata_path, metadata_json)
            .with_context(|| format!("Failed to write metadata: {}", metadata_path.display()))?;

        tracing::info!(backup = %id, files = metadata.files.len(), "backup created");

        self.cleanup_old_backups()?;

        Ok(id)
    }

    /// Read the metadata of one backup
    pub fn get_backup(&self, id: &str) -> Result<BackupMetadata> {
        let backup_dir = self.backups_dir.join(id);
        if !backup_dir.is_dir() {
            anyhow::bail!("Backup not found: {}", id);
        }

        let metadata_path = backup_dir.join(METADATA_FILE);
        let metadata_json = fs::read_to_string(&metadata_path)
            .with_context(|| format!("Failed to read metadata: {}", metadata_path.display()))?;
        Self::parse_backup_metadata(&metadata_json)
    }

    /// Copy every file of a backup back to its original path, then delete
    /// the backup. Returns the restored paths.
    pub fn restore_backup(&self, id: &str) -> Result<Vec<PathBuf>> {
        let metadata = self.get_backup(id)?;
        let mut restored = Vec::new();

        for file_backup in &metadata.files {
            if !file_backup.backup_path.exists() {
                tracing::warn!(
                    path = %file_backup.backup_path.display(),
                    "backup file missing, skipping"
                );
                continue;
            }

            fs::copy(&file_backup.backup_path, &file_backup.original_path).with_context(|| {
                format!(
                    "Failed to restore file: {}",
                    file_backup.original_path.display()
                )
            })?;

            restored.push(file_backup.original_path.clone());
        }

        self.remove_backup(id)?;
        tracing::info!(backup = %id, restored = restored.len(), "backup restored and removed");

        Ok(restored)
    }

    pub fn get_last_backup_id(&self) -> Result<Option<String>> {
        Ok(self.list_backups()?.last().map(|b| b.id.clone()))
    }

    /// All readable backups, oldest first
    pub fn list_backups(&self) -> Result<Vec<BackupMetadata>> {
        let mut backups = Vec::new();

        for entry in fs::read_dir(&self.backups_dir).with_context(|| {
            format!(
                "Failed to read backups directory: {}",
                self.backups_dir.display()
            )
        })? {
            let entry = entry?;
            let metadata_path = entry.path().join(METADATA_FILE);

            if !metadata_path.exists() {
                continue;
            }

            let metadata_json = fs::read_to_string(&metadata_path)?;
            match Self::parse_backup_metadata(&metadata_json) {
                Ok(metadata) => backups.push(metadata),
                Err(e) => tracing::debug!(
                    path = %metadata_path.display(),
                    error = %e,
                    "ignoring unreadable backup"
                ),
            }
        }

        // Equal timestamps are rare; the ID breaks ties.
        backups.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(backups)
    }

    /// Total bytes held by all backups
    pub fn total_size(&self) -> Result<u64> {
        Ok(self
            .list_backups()?
            .iter()
            .flat_map(|b| b.files.iter())
            .map(|f| f.size)
            .sum())
    }

    fn cleanup_old_backups(&self) -> Result<()> {
        let removed = self.prune_backups(MAX_BACKUPS)?;
        if removed > 0 {
            tracing::debug!(removed, "removed old backups");
        }
        Ok(())
    }

    /// Remove a backup by its ID
    pub fn remove_backup(&self, backup_id: &str) -> Result<()> {
        let backup_dir = self.backups_dir.join(backup_id);
        if !backup_dir.is_dir() {
            anyhow::bail!("Backup not found: {}", backup_id);
        }
        fs::remove_dir_all(&backup_dir)
            .with_context(|| format!("Failed to remove backup: {}", backup_dir.display()))?;
        Ok(())
    }

    /// Parse backup metadata from JSON string
    pub fn parse_backup_metadata(json: &str) -> Result<BackupMetadata> {
        let metadata: BackupMetadata =
            serde_json::from_str(json).context("Failed to parse backup metadata")?;
        Ok(metadata)
    }

    /// Prune backups keeping only the N most recent ones
    pub fn prune_backups(&self, keep_count: usize) -> Result<usize> {
        let backups = self.list_backups()?;

        if backups.len() <= keep_count {
            return Ok(0);
        }

        let to_remove = backups.len() - keep_count;
        for backup in backups.iter().take(to_remove) {
            self.remove_backup(&backup.id)?;
        }

        Ok(to_remove)
    }

    /// Prune backups older than the specified number of days
    pub fn prune_backups_older_than(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut removed = 0;

        for backup in self.list_backups()? {
            if backup.timestamp < cutoff {
                self.remove_backup(&backup.id)?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Restores must not depend on the directory rollback is run from.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
