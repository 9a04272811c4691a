#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use trellis_core::config;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "trellis: boards of pages, columns and tasks",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Initialize a board",
        long_about = "Create .trellis/ with a default config and an empty board database.",
        after_help = "EXAMPLES:\n    # Initialize a board in the current directory\n    tl init\n\n    # Rewrite the default config, keeping board data\n    tl init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(next_help_heading = "Board", about = "Manage pages")]
    Page {
        #[command(subcommand)]
        command: cmd::page::PageCommand,
    },

    #[command(next_help_heading = "Board", about = "Manage columns")]
    Column {
        #[command(subcommand)]
        command: cmd::column::ColumnCommand,
    },

    #[command(next_help_heading = "Board", about = "Manage tasks")]
    Task {
        #[command(subcommand)]
        command: cmd::task::TaskCommand,
    },

    #[command(
        next_help_heading = "Read",
        about = "Show a page",
        long_about = "Show a page with its columns and their tasks in board order.",
        after_help = "EXAMPLES:\n    # Show a page\n    tl show pg-abc123\n\n    # Emit machine-readable output\n    tl show pg-abc123 --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Print bash completions\n    tl completions bash\n\n    # Install zsh completions into a directory\n    tl completions zsh --dir ~/.zfunc"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TRELLIS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "trellis=debug,info"
        } else {
            "trellis=info,warn"
        })
    });

    let format =
        env::var("TRELLIS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable.
    if format == "json" {
        registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let project_root = env::current_dir()?;
    let effective = config::resolve_config(&project_root, cli.json)?;
    let output = OutputMode::from_name(&effective.resolved_output);
    let project = &effective.project;

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::Page { ref command } => {
            cmd::page::run_page(command, project, output, &project_root)
        }
        Commands::Column { ref command } => {
            cmd::column::run_column(command, project, output, &project_root)
        }
        Commands::Task { ref command } => {
            cmd::task::run_task(command, project, output, &project_root)
        }
        Commands::Show(ref args) => cmd::show::run_show(args, project, output, &project_root),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args, &mut command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmd::page::PageCommand;
    use cmd::task::TaskCommand;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::parse_from(["tl", "page", "ls", "--json"]);
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Page {
                command: PageCommand::Ls
            }
        ));
    }

    #[test]
    fn task_move_takes_several_ids() {
        let cli = Cli::parse_from([
            "tl", "task", "move", "tk-a", "tk-b", "--to", "col-x", "--index", "2",
        ]);
        match cli.command {
            Commands::Task {
                command: TaskCommand::Move { ids, to, index },
            } => {
                assert_eq!(ids, ["tk-a", "tk-b"]);
                assert_eq!(to, "col-x");
                assert_eq!(index, Some(2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn page_move_defaults_to_root_append() {
        let cli = Cli::parse_from(["tl", "page", "move", "pg-a"]);
        match cli.command {
            Commands::Page {
                command: PageCommand::Move { ids, parent, index },
            } => {
                assert_eq!(ids, ["pg-a"]);
                assert_eq!(parent, None);
                assert_eq!(index, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn move_requires_an_id() {
        assert!(Cli::try_parse_from(["tl", "column", "move", "--index", "0"]).is_err());
    }

    #[test]
    fn completions_accepts_shell() {
        let cli = Cli::parse_from(["tl", "completions", "bash"]);
        assert!(matches!(cli.command, Commands::Completions(_)));
    }
}
