use anyhow::Result;
use anchorpatch::backup_manager::{BackupLimits, BackupManager};
use anchorpatch::cli::{parse_args, Args, PatchArgs};
use anchorpatch::config::{self, Config, OnMissing};
use anchorpatch::diff_formatter::DiffFormatter;
use anchorpatch::disk_space::bytes_to_human;
use anchorpatch::error::PatchError;
use anchorpatch::file_patcher::{FilePatcher, MissPolicy, PatchOptions, PatchReport};
use anchorpatch::logger;
use anchorpatch::recipe::{PatchRecipe, ResolvedRecipe};
use std::io::{self, Write};
use std::path::PathBuf;

fn main() -> Result<()> {
    let invocation = parse_args()?;
    let config = config::load_config()?;

    let debug_dir = if config.logging.debug {
        Some(config::app_dir()?)
    } else {
        None
    };
    let _log = logger::init_logging(invocation.verbose, debug_dir.as_deref())?;

    let backup_dir = invocation.backup_dir;

    match invocation.args {
        Args::Patch(args) => execute_patch(args, &config),
        Args::Rollback { id } => rollback(id, backup_manager(backup_dir, &config)?),
        Args::History => show_history(&backup_manager(backup_dir, &config)?, false),
        Args::Status => show_status(&backup_manager(backup_dir, &config)?),
        Args::BackupList { verbose } => show_history(&backup_manager(backup_dir, &config)?, verbose),
        Args::BackupShow { id } => show_backup(&backup_manager(backup_dir, &config)?, &id),
        Args::BackupRestore { id } => restore(&backup_manager(backup_dir, &config)?, &id),
        Args::BackupRemove { id, force } => {
            remove_backup(&backup_manager(backup_dir, &config)?, &id, force)
        }
        Args::BackupPrune { keep, keep_days, force } => {
            prune_backups(&backup_manager(backup_dir, &config)?, keep, keep_days, force)
        }
        Args::Config { show } => show_config(&config, show),
    }
}

/// Backup directory precedence: --backup-dir, then config, then ~/.anchorpatch/backups
fn backup_manager(cli_dir: Option<PathBuf>, config: &Config) -> Result<BackupManager> {
    let dir = cli_dir.or_else(|| config.backup.backup_dir.as_ref().map(PathBuf::from));
    let manager = match dir {
        Some(dir) => BackupManager::with_directory(dir)?,
        None => BackupManager::new()?,
    };
    Ok(manager.with_limits(BackupLimits {
        warn_bytes: config.max_size_bytes(),
        max_disk_usage_percent: config.max_disk_usage_percent(),
    }))
}

fn describe(resolved: &ResolvedRecipe) -> String {
    let pattern = resolved.patch.pattern();
    format!("{} ({:?} .. {:?})", resolved.name, pattern.start(), pattern.end())
}

fn execute_patch(args: PatchArgs, config: &Config) -> Result<()> {
    let recipe = match &args.recipe {
        Some(path) => PatchRecipe::load(path)?,
        None => PatchRecipe::default(),
    };
    let resolved = recipe.merge(args.overrides).resolve(config.snippet_chars())?;

    let description = describe(&resolved);
    let path_label = resolved.target.display().to_string();
    let context = args.context.unwrap_or_else(|| config.context_lines());
    let marker = resolved.patch.marker().to_string();

    let options = PatchOptions {
        dry_run: args.dry_run,
        policy: if args.unchecked {
            MissPolicy::Unchecked
        } else {
            MissPolicy::Checked
        },
    };

    let mut backups = if args.dry_run || args.no_backup {
        None
    } else {
        Some(backup_manager(args.backup_dir, config)?)
    };

    let patcher = FilePatcher::new(resolved.patch, description);
    let report = patcher.run(&resolved.target, options, backups.as_mut())?;

    match report {
        PatchReport::Preview { original, patched, .. } => {
            print!("{}", DiffFormatter::format_dry_run_header(&resolved.name));
            print!("{}", DiffFormatter::format_diff(&path_label, &original, &patched, context));
            println!("\nNo changes written (dry run).");
        }
        PatchReport::Applied { original, patched, backup_id, .. } => {
            print!("{}", DiffFormatter::format_diff(&path_label, &original, &patched, context));
            println!();
            print!("{}", DiffFormatter::format_applied(&path_label, backup_id.as_deref()));
        }
        PatchReport::AlreadyApplied => {
            println!("{} already contains the replacement; nothing to do.", path_label);
        }
        PatchReport::NotMatched { rewritten: true, .. } => {
            println!("Wrote {}", path_label);
        }
        PatchReport::NotMatched { reason, snippet, .. } => {
            print!(
                "{}",
                DiffFormatter::format_miss(
                    &path_label,
                    reason,
                    &marker,
                    snippet.as_ref(),
                    DiffFormatter::should_use_color()
                )
            );
            if config.patch.on_missing == OnMissing::Fail {
                return Err(PatchError::PatternNotMatched {
                    path: resolved.target,
                    reason,
                }
                .into());
            }
        }
    }

    Ok(())
}

fn rollback(id: Option<String>, manager: BackupManager) -> Result<()> {
    let backup_id = match id {
        Some(id) => id,
        None => match manager.get_last_backup_id()? {
            Some(id) => {
                println!("Rolling back last operation: {}\n", id);
                id
            }
            None => anyhow::bail!("No backups found to rollback"),
        },
    };

    restore(&manager, &backup_id)?;
    println!("\n✅ Rollback complete");
    Ok(())
}

fn restore(manager: &BackupManager, id: &str) -> Result<()> {
    for path in manager.restore_backup(id)? {
        println!("Restored: {}", path.display());
    }
    println!("Backup {} removed after restore", id);
    Ok(())
}

fn show_history(manager: &BackupManager, verbose: bool) -> Result<()> {
    let backups = manager.list_backups()?;
    print!(
        "{}",
        DiffFormatter::format_history(&backups, verbose, DiffFormatter::should_use_color())
    );
    Ok(())
}

fn show_status(manager: &BackupManager) -> Result<()> {
    let backups = manager.list_backups()?;

    println!("Backup directory: {}", manager.backups_dir().display());
    println!("Total backups: {}", backups.len());
    println!("Disk usage: {}\n", bytes_to_human(manager.total_size()?));

    if let Some(last) = backups.last() {
        println!("Last operation:");
        println!("  ID: {}", last.id);
        println!("  Time: {}", last.timestamp.format("%Y-%m-%d %H:%M:%S"));
        println!("  Patch: {}", last.description);
    }

    Ok(())
}

fn show_backup(manager: &BackupManager, id: &str) -> Result<()> {
    let backup = manager.get_backup(id)?;
    println!("ID: {}", backup.id);
    println!("Time: {}", backup.timestamp.format("%Y-%m-%d %H:%M:%S"));
    println!("Patch: {}", backup.description);
    println!("Files:");
    for file in &backup.files {
        println!(
            "  {} -> {} ({})",
            file.original_path.display(),
            file.backup_path.display(),
            bytes_to_human(file.size)
        );
    }
    Ok(())
}

fn remove_backup(manager: &BackupManager, id: &str, force: bool) -> Result<()> {
    if !force && !confirm(&format!("Remove backup {}?", id))? {
        println!("Backup not removed.");
        return Ok(());
    }
    manager.remove_backup(id)?;
    println!("Removed backup {}", id);
    Ok(())
}

fn prune_backups(
    manager: &BackupManager,
    keep: Option<usize>,
    keep_days: Option<usize>,
    force: bool,
) -> Result<()> {
    let plan = match (keep, keep_days) {
        (_, Some(days)) => format!("Remove backups older than {} days?", days),
        (keep, None) => format!("Keep only the {} most recent backups?", keep.unwrap_or(10)),
    };
    if !force && !confirm(&plan)? {
        println!("Nothing pruned.");
        return Ok(());
    }

    let mut removed = 0;
    if let Some(days) = keep_days {
        removed += manager.prune_backups_older_than(days as i64)?;
    }
    if keep.is_some() || keep_days.is_none() {
        removed += manager.prune_backups(keep.unwrap_or(10))?;
    }

    println!("Removed {} backup{}", removed, if removed == 1 { "" } else { "s" });
    Ok(())
}

fn show_config(config: &Config, show: bool) -> Result<()> {
    if show {
        print!("{}", toml::to_string_pretty(config)?);
    } else {
        println!("Configuration file: {}", config::config_file_path()?.display());
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
