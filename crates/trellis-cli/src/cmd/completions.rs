use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Args, Command};
use clap_complete::{Shell, generate, generate_to};

const BIN_NAME: &str = "tl";

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script into this directory (e.g. a shell's completion
    /// directory) instead of printing it.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

/// Print the completion script, or install it under `--dir`.
///
/// # Errors
///
/// Returns an error if the script cannot be written.
pub fn run_completions(args: &CompletionsArgs, command: &mut Command) -> Result<()> {
    match &args.dir {
        Some(dir) => {
            let path = install(args.shell, command, dir)?;
            tracing::debug!(shell = %args.shell, path = %path.display(), "completions installed");
            println!("{}", path.display());
            Ok(())
        }
        None => write_script(args.shell, command, &mut std::io::stdout()),
    }
}

fn write_script(shell: Shell, command: &mut Command, out: &mut dyn Write) -> Result<()> {
    generate(shell, command, BIN_NAME, out);
    out.flush().context("flush completion script")
}

fn install(shell: Shell, command: &mut Command, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create completion directory {}", dir.display()))?;
    generate_to(shell, command, BIN_NAME, dir)
        .with_context(|| format!("write {shell} completions to {}", dir.display()))
}
