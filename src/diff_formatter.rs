use crate::anchor::{MissReason, Snippet};
use crate::backup_manager::BackupMetadata;
use crate::disk_space::bytes_to_human;
use colored::*;
use similar::{ChangeTag, TextDiff};
use std::io::IsTerminal;

pub struct DiffFormatter;

impl DiffFormatter {
    /// Auto-detect if we should use colors
    pub fn should_use_color() -> bool {
        // https://no-color.org/
        if std::env::var_os("NO_COLOR").is_some() {
            return false;
        }
        std::io::stdout().is_terminal()
    }

    /// Unified diff of `old` against `new`, grouped into hunks with
    /// `context` lines around each change
    pub fn format_diff(path: &str, old: &str, new: &str, context: usize) -> String {
        Self::format_diff_styled(path, old, new, context, Self::should_use_color())
    }

    pub fn format_diff_styled(path: &str, old: &str, new: &str, context: usize, use_color: bool) -> String {
        let diff = TextDiff::from_lines(old, new);
        let mut output = String::new();

        let header = format!("--- {}\n+++ {} (patched)\n", path, path);
        if use_color {
            output.push_str(&header.bold().to_string());
        } else {
            output.push_str(&header);
        }

        let mut added = 0usize;
        let mut removed = 0usize;

        for group in diff.grouped_ops(context) {
            let (Some(first), Some(last)) = (group.first(), group.last()) else {
                continue;
            };
            let old_range = first.old_range().start..last.old_range().end;
            let new_range = first.new_range().start..last.new_range().end;
            let hunk = format!(
                "@@ -{},{} +{},{} @@\n",
                old_range.start + 1,
                old_range.len(),
                new_range.start + 1,
                new_range.len()
            );
            if use_color {
                output.push_str(&hunk.cyan().to_string());
            } else {
                output.push_str(&hunk);
            }

            for op in &group {
                for change in diff.iter_changes(op) {
                    let (sign, line) = match change.tag() {
                        ChangeTag::Equal => (" ", change.value().to_string()),
                        ChangeTag::Delete => {
                            removed += 1;
                            ("-", change.value().to_string())
                        }
                        ChangeTag::Insert => {
                            added += 1;
                            ("+", change.value().to_string())
                        }
                    };
                    let mut text = format!("{}{}", sign, line);
                    if change.missing_newline() {
                        text.push('\n');
                    }
                    let styled = match (use_color, change.tag()) {
                        (false, _) | (true, ChangeTag::Equal) => text,
                        (true, ChangeTag::Delete) => text.red().to_string(),
                        (true, ChangeTag::Insert) => text.green().to_string(),
                    };
                    output.push_str(&styled);
                }
            }
        }

        let summary = format!("\nTotal: {} added, {} removed\n", added, removed);
        if use_color {
            output.push_str(&summary.bold().to_string());
        } else {
            output.push_str(&summary);
        }

        output
    }

    /// Diagnostic printed when the anchors were not found
    pub fn format_miss(
        path: &str,
        reason: MissReason,
        marker: &str,
        snippet: Option<&Snippet>,
        use_color: bool,
    ) -> String {
        let mut output = String::new();

        let headline = format!("❌ Pattern not found in {}: {}\n", path, reason);
        if use_color {
            output.push_str(&headline.red().bold().to_string());
        } else {
            output.push_str(&headline);
        }

        match snippet {
            Some(snippet) => {
                output.push_str(&format!(
                    "Found {:?} at position {}\nContent around it:\n",
                    marker, snippet.offset
                ));
                output.push_str(&snippet.text);
                if !snippet.text.ends_with('\n') {
                    output.push('\n');
                }
            }
            None => output.push_str(&format!("Marker {:?} does not occur in the file\n", marker)),
        }

        output
    }

    /// Format operation history
    pub fn format_history(backups: &[BackupMetadata], verbose: bool, use_color: bool) -> String {
        let mut output = String::new();

        if backups.is_empty() {
            output.push_str("No backup history found.\n");
            return output;
        }

        if use_color {
            output.push_str(&"Operation History:\n\n".bold().white().to_string());
        } else {
            output.push_str("Operation History:\n\n");
        }

        // Most recent first
        for backup in backups.iter().rev() {
            if use_color {
                output.push_str(&format!("ID: {}\n", backup.id.yellow()));
                output.push_str(&format!("  Patch: {}\n", backup.description.cyan()));
            } else {
                output.push_str(&format!("ID: {}\n", backup.id));
                output.push_str(&format!("  Patch: {}\n", backup.description));
            }
            output.push_str(&format!("  Time: {}\n", backup.timestamp.format("%Y-%m-%d %H:%M:%S")));
            output.push_str(&format!("  Files: {}\n", backup.files.len()));
            if verbose {
                for file in &backup.files {
                    output.push_str(&format!(
                        "    {} ({})\n",
                        file.original_path.display(),
                        bytes_to_human(file.size)
                    ));
                }
            }
            output.push('\n');
        }

        output
    }

    /// Format dry run header
    pub fn format_dry_run_header(name: &str) -> String {
        if Self::should_use_color() {
            format!("{} {}\n\n", "🔍 Dry run:".bold().cyan(), name.white().bold())
        } else {
            format!("Dry run: {}\n\n", name)
        }
    }

    /// Format the confirmation printed after a write
    pub fn format_applied(path: &str, backup_id: Option<&str>) -> String {
        let use_color = Self::should_use_color();
        let mut output = String::new();

        if use_color {
            output.push_str(&format!("{} {}\n", "✅ Patched".bold().green(), path.white().bold()));
        } else {
            output.push_str(&format!("Patched {}\n", path));
        }

        match backup_id {
            Some(id) => {
                output.push_str(&format!("Backup ID: {}\n", id));
                output.push_str(&format!("Rollback with: anchorpatch rollback {}\n", id));
            }
            None => output.push_str("No backup was created.\n"),
        }

        output
    }
}
