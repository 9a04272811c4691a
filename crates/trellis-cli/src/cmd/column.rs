//! `tl column`: manage the columns of a page.

use std::path::Path;

use anyhow::{Result, anyhow};
use clap::Subcommand;
use trellis_core::config::ProjectConfig;
use trellis_core::{EntityKind, ItemId};

use super::{ItemView, MoveReport, Session, item_ids};
use crate::output::{OutputMode, render_item};

#[derive(Subcommand, Debug)]
pub enum ColumnCommand {
    #[command(
        about = "Add a column to a page",
        after_help = "EXAMPLES:\n    # Append a column\n    tl column add pg-abc123 Doing"
    )]
    Add {
        /// Page ID.
        page: String,

        /// Column title.
        title: String,
    },

    #[command(about = "Rename a column")]
    Rename {
        /// Column ID.
        id: String,

        /// New title.
        title: String,
    },

    #[command(about = "Delete a column and its tasks")]
    Rm {
        /// Column ID.
        id: String,
    },

    #[command(
        about = "Reorder columns",
        long_about = "Move one or more columns of the same page, as a block in the given order, to a final index.",
        after_help = "EXAMPLES:\n    # Make a column the first one\n    tl column move col-abc123 --index 0"
    )]
    Move {
        /// Column ids, in the order they should land.
        #[arg(required = true)]
        ids: Vec<String>,

        /// Final index of the first moved column. Defaults to appending.
        #[arg(long)]
        index: Option<usize>,
    },
}

pub fn run_column(
    command: &ColumnCommand,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let mut session = Session::open(project_root, config, output)?;

    match command {
        ColumnCommand::Add { page, title } => {
            let page = session.open_owner(EntityKind::Page, &ItemId::new(page.as_str()))?;
            let created = session.board.create_column(&page, title);
            let column = session.check(created)?;
            render_item(&ItemView::column("created", &column), output)
        }
        ColumnCommand::Rename { id, title } => {
            let id = ItemId::new(id.as_str());
            session.open_owner(EntityKind::Column, &id)?;
            let renamed = session.board.rename_column(&id, title);
            session.check(renamed)?;
            let column = session
                .board
                .columns()
                .get(&id)
                .ok_or_else(|| anyhow!("column {id} vanished after rename"))?;
            render_item(&ItemView::column("renamed", column), output)
        }
        ColumnCommand::Rm { id } => {
            let id = ItemId::new(id.as_str());
            session.open_owner(EntityKind::Column, &id)?;
            let deleted = session.board.delete_column(&id);
            let column = session.check(deleted)?;
            render_item(&ItemView::column("deleted", &column), output)
        }
        ColumnCommand::Move { ids, index } => {
            let ids = item_ids(ids);
            let Some(first) = ids.first() else {
                return Err(anyhow!("no column ids given"));
            };
            let page = session.open_owner(EntityKind::Column, first)?;
            let index = index.unwrap_or_else(|| session.board.columns().group(Some(&page)).len());
            let outcome = session.board.move_columns(&ids, index);
            session.finish_move(
                MoveReport::new(EntityKind::Column, ids, Some(page), index),
                outcome,
            )
        }
    }
}
