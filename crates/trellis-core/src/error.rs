use std::fmt;

use crate::drag::DragError;
use crate::model::{EntityKind, ItemId};
use crate::persist::PersistError;
use crate::position::PositionError;

/// Machine-readable error codes surfaced in notices and CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    ItemNotFound,
    GroupNotFound,
    CycleDetected,
    DragInProgress,
    InvalidTarget,
    PersistenceRejected,
    PersistenceUnavailable,
    StorageFailure,
    StaleRollback,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ItemNotFound => "E2001",
            Self::GroupNotFound => "E2002",
            Self::CycleDetected => "E2003",
            Self::DragInProgress => "E2004",
            Self::InvalidTarget => "E2005",
            Self::PersistenceRejected => "E3001",
            Self::PersistenceUnavailable => "E3002",
            Self::StorageFailure => "E3003",
            Self::StaleRollback => "E3004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Board not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::ItemNotFound => "Item not found",
            Self::GroupNotFound => "Target group not found",
            Self::CycleDetected => "Move would create a cycle",
            Self::DragInProgress => "Another drag is already active",
            Self::InvalidTarget => "Invalid drop target",
            Self::PersistenceRejected => "Change rejected by the backing store",
            Self::PersistenceUnavailable => "Backing store unavailable",
            Self::StorageFailure => "Local storage failure",
            Self::StaleRollback => "Rollback merged with newer changes",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `tl init` to create a board in this directory."),
            Self::ConfigParseError => Some("Fix syntax in .trellis/config.toml and retry."),
            Self::ItemNotFound | Self::GroupNotFound => {
                Some("The item may have been deleted; reload the board.")
            }
            Self::CycleDetected => Some("A page cannot be moved under itself or its descendants."),
            Self::DragInProgress => Some("Finish or cancel the current drag first."),
            Self::InvalidTarget => None,
            Self::PersistenceRejected | Self::PersistenceUnavailable => {
                Some("The change was reverted locally. Repeat the action to retry.")
            }
            Self::StorageFailure => Some("Check disk space and write permissions."),
            Self::StaleRollback => Some("Reload the board to resynchronize ordering."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl serde::Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// Domain failure of a board or store operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("{kind} not found: {id}")]
    ItemNotFound { kind: EntityKind, id: ItemId },
    #[error("target group not found: {0}")]
    GroupNotFound(ItemId),
    #[error("moving page '{page}' under '{parent}' would create a cycle")]
    CycleDetected { page: ItemId, parent: ItemId },
    #[error("invalid drop target: {0}")]
    InvalidTarget(String),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Drag(#[from] DragError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl BoardError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ItemNotFound { .. } => ErrorCode::ItemNotFound,
            Self::GroupNotFound(_) => ErrorCode::GroupNotFound,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::InvalidTarget(_) => ErrorCode::InvalidTarget,
            Self::Position(err) => err.code(),
            Self::Drag(err) => err.code(),
            Self::Persist(err) => err.code(),
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
