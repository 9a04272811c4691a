use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use trellis_core::config::BOARD_DIR;
use trellis_core::db::{self, BOARD_DB_FILE, migrations};

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the default config even if `.trellis/` already exists.
    /// Board data is kept.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[tasks]\n\
    # \"top\" puts new tasks first in their column; \"bottom\" appends them.\n\
    insert = \"top\"\n\
    \n\
    [pages]\n\
    # Save a page move in one batch instead of one write per page.\n\
    batch_moves = false\n\
    \n\
    [collision]\n\
    # Pointers farther than this from every drop region have no target.\n\
    # max_fallback_distance = 64.0\n";

#[derive(Debug, Serialize)]
struct InitReport {
    board_dir: PathBuf,
    config: PathBuf,
    database: PathBuf,
    schema_version: u32,
}

/// Execute `tl init`. Creates the board skeleton:
///
/// ```text
/// .trellis/
///   config.toml   (default project config)
///   board.db      (SQLite board, migrated to the latest schema)
/// ```
///
/// # Errors
///
/// Returns an error if `.trellis/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let board_dir = project_root.join(BOARD_DIR);

    if board_dir.exists() && !args.force {
        anyhow::bail!(".trellis/ already exists. Use `tl init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&board_dir)
        .with_context(|| format!("Failed to create board directory: {}", board_dir.display()))?;

    let config_path = board_dir.join("config.toml");
    std::fs::write(&config_path, CONFIG_TOML)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let db_path = board_dir.join(BOARD_DB_FILE);
    let conn = db::open_board(&db_path)?;
    let schema_version =
        migrations::current_schema_version(&conn).context("read board schema version")?;

    let report = InitReport {
        board_dir,
        config: config_path,
        database: db_path,
        schema_version,
    };

    render(output, &report, |report, w| {
        writeln!(w, "✓ Initialized .trellis/ board.")?;
        writeln!(w)?;
        writeln!(w, "  Config:   {}", report.config.display())?;
        writeln!(
            w,
            "  Database: {} (schema v{})",
            report.database.display(),
            report.schema_version
        )?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  Create your first page:")?;
        writeln!(w, "    tl page add \"Roadmap\"")?;
        writeln!(w, "  Then give it columns and tasks:")?;
        writeln!(w, "    tl column add <page-id> Todo")?;
        writeln!(w, "    tl task add <column-id> \"First task\"")
    })
}
