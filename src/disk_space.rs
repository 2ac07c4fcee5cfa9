//! Free-space checks before a backup is written

use anyhow::{Context, Result};
use std::path::Path;

/// Render a byte count as "1.5 MB" and friends
pub fn bytes_to_human(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Bytes available to an unprivileged user on the filesystem holding `path`
#[cfg(unix)]
pub fn available_bytes(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path =
        CString::new(path.as_os_str().as_bytes()).context("Path contains an interior NUL byte")?;

    // SAFETY: statvfs is plain old data, so a zeroed value is valid, and
    // `c_path` outlives the call. The return code is checked before use.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("Failed to get disk space for '{}'", path.display()));
    }

    #[allow(clippy::unnecessary_cast)] // field widths differ between platforms
    let available = stat.f_bavail as u64 * stat.f_frsize as u64;
    Ok(available)
}

#[cfg(not(unix))]
pub fn available_bytes(_path: &Path) -> Result<u64> {
    anyhow::bail!("Disk space checks are only implemented on Unix")
}

/// Refuse a backup of `needed` bytes that would take more than
/// `max_percent` of the free space under `backup_dir`.
pub fn ensure_room_for_backup(backup_dir: &Path, needed: u64, max_percent: f64) -> Result<()> {
    let available = match available_bytes(backup_dir) {
        Ok(bytes) => bytes,
        Err(e) if cfg!(not(unix)) => {
            tracing::debug!(error = %e, "skipping disk space check");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let percent_of_free = if available > 0 {
        needed as f64 / available as f64 * 100.0
    } else {
        100.0
    };

    if needed > 0 && percent_of_free > max_percent {
        anyhow::bail!(
            "Insufficient disk space for backup\n\
             backup directory: {}\n\
             available: {}\n\
             backup required: {} ({:.1}% of free space, limit {:.1}%)\n\
             \n\
             Options:\n\
             1. Remove old backups: anchorpatch backup prune --keep=5\n\
             2. Use a different location: --backup-dir /mnt/backups\n\
             3. Skip the backup: --no-backup --force",
            backup_dir.display(),
            bytes_to_human(available),
            bytes_to_human(needed),
            percent_of_free,
            max_percent
        );
    }

    Ok(())
}
