//! `tl page`: manage the page tree.

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Result, anyhow};
use clap::Subcommand;
use serde::Serialize;
use trellis_core::config::ProjectConfig;
use trellis_core::model::group_label;
use trellis_core::position;
use trellis_core::{EntityKind, ItemId, Page};

use super::{ItemView, MoveReport, Session, item_ids};
use crate::output::{OutputMode, Renderable, render_item, render_list};

#[derive(Subcommand, Debug)]
pub enum PageCommand {
    #[command(
        about = "Create a page",
        long_about = "Create a page at the end of its parent's subpages, or at the end of the root list.",
        after_help = "EXAMPLES:\n    # Create a root page\n    tl page add Roadmap\n\n    # Create a subpage\n    tl page add \"Q3 plans\" --parent pg-abc123"
    )]
    Add {
        /// Page title.
        title: String,

        /// Parent page ID. Omit for a root page.
        #[arg(long)]
        parent: Option<String>,
    },

    #[command(about = "Rename a page")]
    Rename {
        /// Page ID.
        id: String,

        /// New title.
        title: String,
    },

    #[command(
        about = "Delete a page",
        long_about = "Soft-delete a page. Its subpages keep their parent link and stay where they are."
    )]
    Rm {
        /// Page ID.
        id: String,
    },

    #[command(
        about = "Move pages",
        long_about = "Move one or more pages, as a block in the given order, under a new parent at a final index.",
        after_help = "EXAMPLES:\n    # Make a page the first root page\n    tl page move pg-abc123 --index 0\n\n    # Move two pages under another page, appended\n    tl page move pg-abc123 pg-def456 --parent pg-xyz789"
    )]
    Move {
        /// Page ids, in the order they should land.
        #[arg(required = true)]
        ids: Vec<String>,

        /// New parent page ID. Omit to move to the root list.
        #[arg(long)]
        parent: Option<String>,

        /// Final index of the first moved page. Defaults to appending.
        #[arg(long)]
        index: Option<usize>,
    },

    #[command(about = "List the page tree")]
    Ls,
}

pub fn run_page(
    command: &PageCommand,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let mut session = Session::open(project_root, config, output)?;

    match command {
        PageCommand::Add { title, parent } => {
            let parent = parent.as_deref().map(ItemId::new);
            let created = session.board.create_page(title, parent.as_ref());
            let page = session.check(created)?;
            render_item(&ItemView::page("created", &page), output)
        }
        PageCommand::Rename { id, title } => {
            let id = ItemId::new(id.as_str());
            let renamed = session.board.rename_page(&id, title);
            session.check(renamed)?;
            let page = session
                .board
                .pages()
                .get(&id)
                .ok_or_else(|| anyhow!("page {id} vanished after rename"))?;
            render_item(&ItemView::page("renamed", page), output)
        }
        PageCommand::Rm { id } => {
            let deleted = session.board.delete_page(&ItemId::new(id.as_str()));
            let page = session.check(deleted)?;
            render_item(&ItemView::page("deleted", &page), output)
        }
        PageCommand::Move { ids, parent, index } => {
            let ids = item_ids(ids);
            let parent = parent.as_deref().map(ItemId::new);
            let index =
                index.unwrap_or_else(|| session.board.pages().group(parent.as_ref()).len());
            let outcome = session.board.move_pages(&ids, parent.as_ref(), index);
            session.finish_move(MoveReport::new(EntityKind::Page, ids, parent, index), outcome)
        }
        PageCommand::Ls => render_list(&page_tree(session.board.pages().items()), output),
    }
}

/// One line of the page tree.
#[derive(Debug, Serialize)]
pub struct PageRow {
    pub id: ItemId,
    pub title: String,
    pub parent: Option<ItemId>,
    pub position: u32,
    pub depth: usize,
}

impl Renderable for PageRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}{}  {}", "  ".repeat(self.depth), self.title, self.id)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            self.id,
            group_label(self.parent.as_ref()),
            self.position,
            self.depth,
            self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "parent", "position", "depth", "title"]
    }
}

/// Depth-first page order. Pages whose parent is gone are listed as roots.
fn page_tree(pages: &[Page]) -> Vec<PageRow> {
    let known: HashSet<&ItemId> = pages.iter().map(|page| &page.id).collect();
    let mut roots: Vec<&Page> = pages
        .iter()
        .filter(|page| {
            page.parent_id
                .as_ref()
                .is_none_or(|parent| !known.contains(parent))
        })
        .collect();
    roots.sort_by_key(|page| (page.parent_id.is_some(), page.position));

    let mut rows = Vec::with_capacity(pages.len());
    let mut seen: HashSet<&ItemId> = HashSet::new();
    let mut stack: Vec<(&Page, usize)> = roots.into_iter().rev().map(|page| (page, 0)).collect();
    while let Some((page, depth)) = stack.pop() {
        if !seen.insert(&page.id) {
            continue;
        }
        rows.push(PageRow {
            id: page.id.clone(),
            title: page.title.clone(),
            parent: page.parent_id.clone(),
            position: page.position,
            depth,
        });
        for child in position::members(pages, Some(&page.id)).into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    rows
}
