//! `tl` subcommand handlers.
//!
//! Every handler that touches the board goes through [`Session`]: it opens
//! `.trellis/board.db`, builds a [`Board`] whose three stores share one
//! SQLite connection, and collects commit notices for the report.

pub mod column;
pub mod completions;
pub mod init;
pub mod page;
pub mod show;
pub mod task;

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};
use trellis_core::config::{BOARD_DIR, ProjectConfig};
use trellis_core::db::{BOARD_DB_FILE, SqliteBackend, query};
use trellis_core::model::group_label;
use trellis_core::notify::NoticeLog;
use trellis_core::{
    Board, BoardError, Column, CommitOutcome, EntityKind, ErrorCode, ItemId, Notice, Page, Task,
};

use crate::output::{CliError, OutputMode, Renderable, fail, render};

/// An open board plus the notices its stores emit.
pub struct Session {
    pub board: Board,
    pub output: OutputMode,
    notices: NoticeLog,
    backend: SqliteBackend,
}

impl Session {
    /// Open the board under `project_root` and load its page tree.
    ///
    /// # Errors
    ///
    /// Fails with `E1001` when `tl init` has not been run, or when the
    /// database cannot be opened.
    pub fn open(project_root: &Path, config: &ProjectConfig, output: OutputMode) -> Result<Self> {
        let board_dir = project_root.join(BOARD_DIR);
        if !board_dir.is_dir() {
            let code = ErrorCode::NotInitialized;
            return Err(fail(
                output,
                &CliError::with_details(
                    format!("no board found at {}", board_dir.display()),
                    code.hint().unwrap_or_default(),
                    code.code(),
                ),
            ));
        }

        let backend = SqliteBackend::open(&board_dir.join(BOARD_DB_FILE))?;
        let notices = NoticeLog::new();
        let mut board = Board::with_backends(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            config.clone(),
            &notices,
        );
        let pages = board
            .load_pages()
            .map_err(|err| fail(output, &CliError::from(&err)))?;
        debug!(pages, "board opened");

        Ok(Self {
            board,
            output,
            notices,
            backend,
        })
    }

    /// Turn a domain result into a rendered CLI failure.
    pub fn check<T>(&self, result: Result<T, BoardError>) -> Result<T> {
        result.map_err(|err| fail(self.output, &CliError::from(&err)))
    }

    /// Load the page that owns `id` so its columns and tasks are in memory.
    ///
    /// Returns the page id.
    pub fn open_owner(&mut self, kind: EntityKind, id: &ItemId) -> Result<ItemId> {
        let Some(page) = query::owning_page(self.backend.connection(), kind, id)? else {
            return Err(fail(
                self.output,
                &CliError::from(&BoardError::ItemNotFound {
                    kind,
                    id: id.clone(),
                }),
            ));
        };
        let opened = self.board.open(&page);
        self.check(opened)?;
        Ok(page)
    }

    /// Report a move outcome. Rollbacks and abandoned moves fail the command.
    pub fn finish_move(&self, mut report: MoveReport, outcome: CommitOutcome) -> Result<()> {
        report.notices = self.notices.take();
        match outcome {
            CommitOutcome::Unchanged => {
                report.status = "unchanged";
            }
            CommitOutcome::Committed { rows } => {
                report.status = "committed";
                report.rows = rows;
            }
            CommitOutcome::RolledBack { error, rollback } => {
                warn!(kind = %report.kind, ?rollback, "move rolled back");
                return Err(fail(self.output, &CliError::from(&error)));
            }
            CommitOutcome::Abandoned(error) => {
                return Err(fail(self.output, &CliError::from(&error)));
            }
        }
        render(self.output, &report, |report, w| report.write_human(w))
    }
}

/// Parse raw id arguments.
#[must_use]
pub fn item_ids(raw: &[String]) -> Vec<ItemId> {
    raw.iter().map(ItemId::new).collect()
}

/// One entity after a create, rename or delete.
#[derive(Debug, Serialize)]
pub struct ItemView {
    pub action: &'static str,
    pub kind: EntityKind,
    pub id: ItemId,
    pub title: String,
    pub group: Option<ItemId>,
    pub position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ItemView {
    #[must_use]
    pub fn page(action: &'static str, page: &Page) -> Self {
        Self {
            action,
            kind: EntityKind::Page,
            id: page.id.clone(),
            title: page.title.clone(),
            group: page.parent_id.clone(),
            position: page.position,
            description: None,
        }
    }

    #[must_use]
    pub fn column(action: &'static str, column: &Column) -> Self {
        Self {
            action,
            kind: EntityKind::Column,
            id: column.id.clone(),
            title: column.title.clone(),
            group: Some(column.page_id.clone()),
            position: column.position,
            description: None,
        }
    }

    #[must_use]
    pub fn task(action: &'static str, task: &Task) -> Self {
        Self {
            action,
            kind: EntityKind::Task,
            id: task.id.clone(),
            title: task.title.clone(),
            group: Some(task.column_id.clone()),
            position: task.position,
            description: task.description.clone(),
        }
    }
}

impl Renderable for ItemView {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "✓ {} {} {} \"{}\" (in {} at {})",
            self.action,
            self.kind,
            self.id,
            self.title,
            group_label(self.group.as_ref()),
            self.position
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            self.id,
            group_label(self.group.as_ref()),
            self.position,
            self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "group", "position", "title"]
    }
}

/// Result of a `move` subcommand.
#[derive(Debug, Serialize)]
pub struct MoveReport {
    pub kind: EntityKind,
    pub items: Vec<ItemId>,
    pub group: Option<ItemId>,
    pub index: usize,
    pub status: &'static str,
    pub rows: usize,
    pub notices: Vec<Notice>,
}

impl MoveReport {
    #[must_use]
    pub const fn new(
        kind: EntityKind,
        items: Vec<ItemId>,
        group: Option<ItemId>,
        index: usize,
    ) -> Self {
        Self {
            kind,
            items,
            group,
            index,
            status: "pending",
            rows: 0,
            notices: Vec::new(),
        }
    }

    fn write_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let ids: Vec<&str> = self.items.iter().map(ItemId::as_str).collect();
        writeln!(
            w,
            "✓ {} {} {} to {} at {} ({} rows written)",
            self.status,
            self.kind,
            ids.join(", "),
            group_label(self.group.as_ref()),
            self.index,
            self.rows
        )
    }
}
