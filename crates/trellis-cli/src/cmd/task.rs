//! `tl task`: manage the tasks in a page's columns.

use std::path::Path;

use anyhow::{Result, anyhow};
use clap::Subcommand;
use trellis_core::config::ProjectConfig;
use trellis_core::model::TaskPatch;
use trellis_core::{EntityKind, ItemId};

use super::{ItemView, MoveReport, Session, item_ids};
use crate::output::{OutputMode, render_item};

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    #[command(
        about = "Add a task to a column",
        long_about = "Add a task to a column. New tasks go first unless `[tasks] insert = \"bottom\"` is configured.",
        after_help = "EXAMPLES:\n    # Add a task\n    tl task add col-abc123 \"Write release notes\"\n\n    # Add a task with a description\n    tl task add col-abc123 \"Fix login\" --description \"Session expires too early\""
    )]
    Add {
        /// Column ID.
        column: String,

        /// Task title.
        title: String,

        /// Optional longer description.
        #[arg(long)]
        description: Option<String>,
    },

    #[command(about = "Rename a task")]
    Rename {
        /// Task ID.
        id: String,

        /// New title.
        title: String,
    },

    #[command(about = "Set or clear a task's description")]
    Describe {
        /// Task ID.
        id: String,

        /// New description. Omit to clear it.
        text: Option<String>,
    },

    #[command(about = "Delete a task")]
    Rm {
        /// Task ID.
        id: String,
    },

    #[command(
        about = "Move tasks",
        long_about = "Move one or more tasks, as a block in the given order, into a column at a final index. The move is all-or-nothing.",
        after_help = "EXAMPLES:\n    # Move a task to the top of another column\n    tl task move tk-abc123 --to col-def456 --index 0\n\n    # Move two tasks to the end of a column\n    tl task move tk-abc123 tk-ghi789 --to col-def456"
    )]
    Move {
        /// Task ids, in the order they should land.
        #[arg(required = true)]
        ids: Vec<String>,

        /// Target column ID.
        #[arg(long)]
        to: String,

        /// Final index of the first moved task. Defaults to appending.
        #[arg(long)]
        index: Option<usize>,
    },
}

pub fn run_task(
    command: &TaskCommand,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let mut session = Session::open(project_root, config, output)?;

    match command {
        TaskCommand::Add {
            column,
            title,
            description,
        } => {
            let column = ItemId::new(column.as_str());
            session.open_owner(EntityKind::Column, &column)?;
            let created = session.board.create_task(&column, title);
            let task = session.check(created)?;
            if let Some(description) = description {
                describe(&mut session, &task.id, Some(description.clone()))?;
            }
            show_task(&session, "created", &task.id)
        }
        TaskCommand::Rename { id, title } => {
            let id = ItemId::new(id.as_str());
            session.open_owner(EntityKind::Task, &id)?;
            let patch = TaskPatch {
                title: Some(title.clone()),
                description: None,
            };
            let renamed = session.board.update_task(&id, &patch);
            session.check(renamed)?;
            show_task(&session, "renamed", &id)
        }
        TaskCommand::Describe { id, text } => {
            let id = ItemId::new(id.as_str());
            session.open_owner(EntityKind::Task, &id)?;
            describe(&mut session, &id, text.clone())?;
            show_task(&session, "described", &id)
        }
        TaskCommand::Rm { id } => {
            let id = ItemId::new(id.as_str());
            session.open_owner(EntityKind::Task, &id)?;
            let deleted = session.board.delete_task(&id);
            let task = session.check(deleted)?;
            render_item(&ItemView::task("deleted", &task), output)
        }
        TaskCommand::Move { ids, to, index } => {
            let ids = item_ids(ids);
            let column = ItemId::new(to.as_str());
            session.open_owner(EntityKind::Column, &column)?;
            let index = index.unwrap_or_else(|| session.board.tasks().group(Some(&column)).len());
            let outcome = session.board.move_tasks(&ids, &column, index);
            session.finish_move(
                MoveReport::new(EntityKind::Task, ids, Some(column), index),
                outcome,
            )
        }
    }
}

fn describe(session: &mut Session, id: &ItemId, description: Option<String>) -> Result<()> {
    let patch = TaskPatch {
        title: None,
        description: Some(description),
    };
    let updated = session.board.update_task(id, &patch);
    session.check(updated)
}

fn show_task(session: &Session, action: &'static str, id: &ItemId) -> Result<()> {
    let task = session
        .board
        .tasks()
        .get(id)
        .ok_or_else(|| anyhow!("task {id} vanished after update"))?;
    render_item(&ItemView::task(action, task), session.output)
}
