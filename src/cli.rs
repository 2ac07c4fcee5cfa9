use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::anchor::unescape;
use crate::recipe::RecipeOverrides;

#[derive(Parser)]
#[command(name = "anchorpatch")]
#[command(about = "Replace the text between two anchors in a file, with preview and rollback")]
#[command(long_about = "anchorpatch replaces an anchor-bounded region of a text file.

The region starts at the first occurrence of the start anchor and ends at the
first end anchor after it (non-greedy). Both anchors are kept; the text between
them is replaced with a replacement block you supply. Anchors are literal text,
not regular expressions.

A patch is usually described by a recipe (TOML) but every field can be given
or overridden on the command line.

SAFETY:
  • The file is never written when the anchors are not found
  • A backup is taken before every write (rollback with 'anchorpatch rollback')
  • Writes go through a temp file and an atomic rename
  • Re-running a patch that is already in place is a no-op

ESCAPES:
  \\n, \\t, \\r and \\\\ are interpreted in --start, --end, --marker and --require.

EXAMPLES:
  anchorpatch demos/claude_schema.toml --dry-run
  anchorpatch demos/claude_schema.toml
  anchorpatch --target claude.ts --start 'JSON format:\\n' --end '\\n\\nRemember:' \\
              --replacement schema.json --json
  anchorpatch rollback")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Patch recipe (TOML)
    #[arg(value_name = "RECIPE")]
    recipe: Option<PathBuf>,

    /// File to patch (overrides the recipe)
    #[arg(short = 't', long, value_name = "FILE")]
    target: Option<PathBuf>,

    /// Start anchor (overrides the recipe)
    #[arg(short = 's', long = "start", value_name = "TEXT")]
    start_anchor: Option<String>,

    /// End anchor (overrides the recipe)
    #[arg(short = 'e', long = "end", value_name = "TEXT")]
    end_anchor: Option<String>,

    /// File holding the replacement block (overrides the recipe)
    #[arg(short = 'r', long = "replacement", value_name = "FILE")]
    replacement_file: Option<PathBuf>,

    /// Treat the replacement as JSON: validate it and pretty-print it
    #[arg(long)]
    json: bool,

    /// Text to locate the diagnostic snippet when the pattern misses
    #[arg(long, value_name = "TEXT")]
    marker: Option<String>,

    /// Only patch when the region between the anchors contains this text
    #[arg(long = "require", value_name = "TEXT")]
    require_interior: Option<String>,

    /// Preview the change without modifying the file
    #[arg(short = 'd', long)]
    dry_run: bool,

    /// Behave like a plain substitution: no diagnostic, rewrite on a miss
    #[arg(long)]
    unchecked: bool,

    /// Number of context lines around the diff
    #[arg(short = 'n', long, value_name = "NUM")]
    context: Option<usize>,

    /// Skip backup creation (requires --force)
    #[arg(long = "no-backup", requires = "force")]
    #[arg(help = "Skip creating a backup (requires --force)\n⚠️  Changes cannot be rolled back!")]
    no_backup: bool,

    /// Force dangerous operations (use with --no-backup)
    #[arg(long = "force", requires = "no_backup")]
    force: bool,

    /// Custom backup directory
    #[arg(long, value_name = "DIR", global = true)]
    backup_dir: Option<PathBuf>,

    /// More output (-v info, -vv debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rollback a previous patch
    #[command(long_about = "Restore files from a backup.

If no backup ID is specified, rolls back the most recent patch.
Use 'anchorpatch history' to see all available backups.")]
    Rollback {
        /// Backup ID to rollback (defaults to the last operation)
        #[arg(value_name = "ID")]
        id: Option<String>,
    },

    /// Show patch history
    History,

    /// Show backup location and usage
    Status,

    /// Manage backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Show or create the configuration file
    #[command(long_about = "Manage ~/.anchorpatch/config.toml.

Without flags, prints the path of the configuration file, creating a
commented default if it does not exist.")]
    Config {
        /// Print the effective configuration
        #[arg(long = "show")]
        show: bool,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// List all backups
    List {
        /// Show backed-up file paths and sizes
        #[arg(short = 'l', long = "long")]
        details: bool,
    },

    /// Show backup details
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Restore from a backup (the backup is removed afterwards)
    Restore {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Remove a backup
    Remove {
        #[arg(value_name = "ID")]
        id: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Remove old backups
    Prune {
        /// Number of recent backups to keep
        #[arg(long, value_name = "N")]
        keep: Option<usize>,

        /// Keep backups from the last N days
        #[arg(long, value_name = "N")]
        keep_days: Option<usize>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug)]
pub struct PatchArgs {
    pub recipe: Option<PathBuf>,
    pub overrides: RecipeOverrides,
    pub dry_run: bool,
    pub unchecked: bool,
    pub context: Option<usize>,
    pub no_backup: bool,
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub enum Args {
    Patch(PatchArgs),
    Rollback { id: Option<String> },
    History,
    Status,
    BackupList { verbose: bool },
    BackupShow { id: String },
    BackupRestore { id: String },
    BackupRemove { id: String, force: bool },
    BackupPrune { keep: Option<usize>, keep_days: Option<usize>, force: bool },
    Config { show: bool },
}

/// Parsed command line plus the global verbosity
pub struct Invocation {
    pub args: Args,
    pub verbose: u8,
    pub backup_dir: Option<PathBuf>,
}

pub fn parse_args() -> Result<Invocation> {
    Ok(from_cli(Cli::parse()))
}

/// Parse from an explicit argument list
pub fn parse_from<I, T>(iter: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Ok(from_cli(Cli::try_parse_from(iter)?))
}

fn from_cli(cli: Cli) -> Invocation {
    let verbose = cli.verbose;
    let backup_dir = cli.backup_dir.clone();

    let args = match cli.command {
        Some(Commands::Rollback { id }) => Args::Rollback { id },
        Some(Commands::History) => Args::History,
        Some(Commands::Status) => Args::Status,
        Some(Commands::Config { show }) => Args::Config { show },
        Some(Commands::Backup { action }) => match action {
            BackupAction::List { details } => Args::BackupList { verbose: details },
            BackupAction::Show { id } => Args::BackupShow { id },
            BackupAction::Restore { id } => Args::BackupRestore { id },
            BackupAction::Remove { id, force } => Args::BackupRemove { id, force },
            BackupAction::Prune { keep, keep_days, force } => {
                Args::BackupPrune { keep, keep_days, force }
            }
        },
        None => Args::Patch(PatchArgs {
            recipe: cli.recipe,
            overrides: RecipeOverrides {
                target: cli.target,
                start_anchor: cli.start_anchor.as_deref().map(unescape),
                end_anchor: cli.end_anchor.as_deref().map(unescape),
                replacement_file: cli.replacement_file,
                json: cli.json,
                marker: cli.marker.as_deref().map(unescape),
                require_interior: cli.require_interior.as_deref().map(unescape),
            },
            dry_run: cli.dry_run,
            unchecked: cli.unchecked,
            context: cli.context,
            no_backup: cli.no_backup,
            backup_dir: cli.backup_dir,
        }),
    };

    Invocation {
        args,
        verbose,
        backup_dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_patch_with_recipe_and_overrides() {
        let inv = parse_from([
            "anchorpatch",
            "demos/claude_schema.toml",
            "--end",
            r"\n\nRemember:",
            "--dry-run",
            "-vv",
        ])
        .unwrap();

        assert_eq!(inv.verbose, 2);
        let Args::Patch(args) = inv.args else {
            panic!("expected a patch invocation");
        };
        assert_eq!(args.recipe, Some(PathBuf::from("demos/claude_schema.toml")));
        assert_eq!(args.overrides.end_anchor.as_deref(), Some("\n\nRemember:"));
        assert!(args.dry_run);
        assert!(!args.unchecked);
        assert!(!args.no_backup);
    }

    #[test]
    fn test_no_backup_requires_force() {
        assert!(parse_from(["anchorpatch", "r.toml", "--no-backup"]).is_err());
        let inv = parse_from(["anchorpatch", "r.toml", "--no-backup", "--force"]).unwrap();
        let Args::Patch(args) = inv.args else {
            panic!("expected a patch invocation");
        };
        assert!(args.no_backup);
    }

    #[test]
    fn test_backup_subcommands() {
        let inv = parse_from(["anchorpatch", "backup", "prune", "--keep", "5"]).unwrap();
        assert!(matches!(
            inv.args,
            Args::BackupPrune { keep: Some(5), keep_days: None, force: false }
        ));

        let inv = parse_from(["anchorpatch", "backup", "list", "--long", "-v"]).unwrap();
        assert!(matches!(inv.args, Args::BackupList { verbose: true }));
        assert_eq!(inv.verbose, 1);

        let inv = parse_from(["anchorpatch", "rollback"]).unwrap();
        assert!(matches!(inv.args, Args::Rollback { id: None }));
    }
}
