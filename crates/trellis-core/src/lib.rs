//! trellis-core library.
//!
//! Ordering engine for a board of pages, columns and tasks: pure position
//! planning, drop-target resolution, the drag state machine, and optimistic
//! stores that roll back when persistence fails.
//!
//! # Conventions
//!
//! - **Errors**: domain failures are `thiserror` enums mapped to
//!   [`error::ErrorCode`]; config and database setup return `anyhow::Result`.
//! - **Logging**: `tracing` macros with structured fields (`kind`, `item`,
//!   `group`, `rows`).
//! - **Positions**: zero-based and dense per group after any reorder.

pub mod board;
pub mod collision;
pub mod config;
pub mod db;
pub mod drag;
pub mod error;
pub mod model;
pub mod notify;
pub mod persist;
pub mod position;
pub mod reconcile;
pub mod store;

pub use board::Board;
pub use collision::{CollisionResolver, DropTarget, Point, Rect, Region};
pub use drag::{DragScope, DragSession, DragStart, DropIntent};
pub use error::{BoardError, ErrorCode};
pub use model::{Column, EntityKind, GroupKey, ItemId, Orderable, Page, Task};
pub use notify::{Notice, NoticeLog, Notifier};
pub use persist::{MemoryBackend, PersistError, Persistence};
pub use reconcile::{CommitOutcome, PersistMode, Reconciler, RollbackOutcome};
pub use store::{ColumnStore, PageStore, Placement, Store, StoreEvent, TaskStore};
