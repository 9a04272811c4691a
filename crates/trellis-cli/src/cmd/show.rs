//! `tl show`: print one page with its columns and tasks in board order.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use trellis_core::config::ProjectConfig;
use trellis_core::{Board, EntityKind, ItemId};

use super::Session;
use crate::output::{OutputMode, field, heading, render};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Page ID.
    pub page: String,
}

#[derive(Debug, Serialize)]
pub struct PageView {
    pub id: ItemId,
    pub title: String,
    pub parent: Option<ItemId>,
    pub subpages: Vec<ItemId>,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Serialize)]
pub struct ColumnView {
    pub id: ItemId,
    pub title: String,
    pub position: u32,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: ItemId,
    pub title: String,
    pub position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub fn run_show(
    args: &ShowArgs,
    config: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let mut session = Session::open(project_root, config, output)?;
    let page = session.open_owner(EntityKind::Page, &ItemId::new(args.page.as_str()))?;
    let Some(view) = page_view(&session.board, &page) else {
        anyhow::bail!("page {page} is not loaded");
    };

    render(output, &view, |view, w| match output {
        OutputMode::Pretty => write_pretty(view, w),
        OutputMode::Text | OutputMode::Json => write_text(view, w),
    })
}

fn page_view(board: &Board, page_id: &ItemId) -> Option<PageView> {
    let page = board.pages().get(page_id)?;
    let columns = board
        .columns()
        .group(Some(page_id))
        .into_iter()
        .map(|column| ColumnView {
            id: column.id.clone(),
            title: column.title.clone(),
            position: column.position,
            tasks: board
                .tasks()
                .group(Some(&column.id))
                .into_iter()
                .map(|task| TaskView {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    position: task.position,
                    description: task.description.clone(),
                })
                .collect(),
        })
        .collect();

    Some(PageView {
        id: page.id.clone(),
        title: page.title.clone(),
        parent: page.parent_id.clone(),
        subpages: board
            .pages()
            .group(Some(page_id))
            .into_iter()
            .map(|child| child.id.clone())
            .collect(),
        columns,
    })
}

fn write_pretty(view: &PageView, w: &mut dyn Write) -> io::Result<()> {
    heading(w, &view.title, view.id.as_str())?;
    if let Some(parent) = &view.parent {
        field(w, "parent", parent.as_str())?;
    }
    if !view.subpages.is_empty() {
        let subpages: Vec<&str> = view.subpages.iter().map(ItemId::as_str).collect();
        field(w, "subpages", &subpages.join(", "))?;
    }
    for column in &view.columns {
        writeln!(w)?;
        writeln!(w, "{}  {} ({} tasks)", column.title, column.id, column.tasks.len())?;
        for task in &column.tasks {
            writeln!(w, "  {}. {}  {}", task.position + 1, task.title, task.id)?;
            if let Some(description) = &task.description {
                writeln!(w, "     {description}")?;
            }
        }
    }
    if view.columns.is_empty() {
        writeln!(w, "(no columns)")?;
    }
    Ok(())
}

fn write_text(view: &PageView, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "page\t{}\t-\t0\t{}", view.id, view.title)?;
    for column in &view.columns {
        writeln!(w, "column\t{}\t{}\t{}\t{}", column.id, view.id, column.position, column.title)?;
        for task in &column.tasks {
            writeln!(w, "task\t{}\t{}\t{}\t{}", task.id, column.id, task.position, task.title)?;
        }
    }
    Ok(())
}
