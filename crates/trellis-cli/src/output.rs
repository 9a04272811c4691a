//! How `tl` prints results and errors.
//!
//! Commands get an [`OutputMode`] from `trellis_core::config::resolve_config`
//! (`--json`, then `FORMAT`, then the user config, then TTY detection) and
//! hand their result to [`render`] or [`render_list`]. Errors go to stderr
//! through [`fail`] so stdout carries only results.

use serde::Serialize;
use std::convert::identity;
use std::io::{self, Write};
use trellis_core::BoardError;

/// Width of the key column in [`field`] lines.
const FIELD_WIDTH: usize = 10;

/// A board object's heading: its title and id, underlined.
pub fn heading(w: &mut dyn Write, title: &str, id: &str) -> io::Result<()> {
    let line = format!("{title}  {id}");
    writeln!(w, "{line}")?;
    writeln!(w, "{}", "=".repeat(line.chars().count()))
}

/// An indented `key  value` line under a [`heading`].
pub fn field(w: &mut dyn Write, key: &str, value: &str) -> io::Result<()> {
    writeln!(w, "  {key:<FIELD_WIDTH$}{value}")
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized output (sections, indentation, visual framing).
    Pretty,
    /// Tab-separated rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Map a resolved mode name (`pretty`, `text`, `json`) to a mode.
    ///
    /// Unknown names fall back to text.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Text,
        }
    }
}

/// Implemented by CLI result types that render in every mode.
pub trait Renderable: Serialize {
    /// Render for human consumption.
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()>;

    /// Render as a single text row in the column order of [`table_headers`].
    ///
    /// [`table_headers`]: Renderable::table_headers
    fn render_table(&self, w: &mut dyn Write) -> io::Result<()>;

    /// Column headers for text mode. Default: no header.
    fn table_headers() -> &'static [&'static str]
    where
        Self: Sized,
    {
        &[]
    }
}

/// Render a single [`Renderable`] item to stdout.
pub fn render_item<R: Renderable>(item: &R, mode: OutputMode) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Pretty => item.render_human(&mut out)?,
        OutputMode::Text => item.render_table(&mut out)?,
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, item)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Render a list of [`Renderable`] items to stdout.
///
/// JSON mode wraps the items in an array; text mode prints the header row
/// once when there is at least one item.
pub fn render_list<R: Renderable>(items: &[R], mode: OutputMode) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Pretty => {
            for item in items {
                item.render_human(&mut out)?;
            }
        }
        OutputMode::Text => {
            let headers = R::table_headers();
            if !items.is_empty() && !headers.is_empty() {
                writeln!(out, "{}", headers.join("\t"))?;
            }
            for item in items {
                item.render_table(&mut out)?;
            }
        }
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, items)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Render a serializable value; pretty and text share `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            human_fn(value, &mut out)?;
        }
    }
    Ok(())
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    #[must_use]
    pub fn with_details(
        message: impl Into<String>,
        suggestion: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            suggestion: Some(suggestion.into()),
            error_code: Some(error_code.into()),
        }
    }
}

impl From<&BoardError> for CliError {
    fn from(err: &BoardError) -> Self {
        Self {
            message: err.to_string(),
            suggestion: err.hint().map(str::to_string),
            error_code: Some(err.code().code().to_string()),
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(&mut out, mode, error)?;
    Ok(())
}

fn write_error(out: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut *out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Render `error` and hand back an `anyhow` error carrying its message, so
/// handlers can `return Err(fail(...))`.
#[must_use]
pub fn fail(mode: OutputMode, error: &CliError) -> anyhow::Error {
    render_error(mode, error).map_or_else(identity, |()| anyhow::anyhow!("{}", error.message))
}
