//! User-visible commit signals (toasts).

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::{error, info};

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            code: Some(code),
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.level, NoticeLevel::Error)
    }
}

/// Sink for commit notices.
pub trait Notifier {
    fn notify(&self, notice: Notice);
}

/// Forwards notices to `tracing`. Used when no UI sink is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.code {
            Some(code) => error!(code = code.code(), "{}", notice.message),
            None => info!("{}", notice.message),
        }
    }
}

/// Collects notices in memory; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct NoticeLog(Rc<RefCell<Vec<Notice>>>);

impl NoticeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.0.borrow().clone()
    }

    /// Drain everything collected so far.
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|notice| notice.is_error())
            .count()
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        self.0.borrow_mut().push(notice);
    }
}
