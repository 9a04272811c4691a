use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;

use crate::collision::CollisionResolver;
use crate::reconcile::PersistMode;
use crate::store::Placement;

/// Directory holding a board's database and project config.
pub const BOARD_DIR: &str = ".trellis";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub pages: PageConfig,
    #[serde(default)]
    pub collision: CollisionConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskInsert {
    /// New tasks go first; existing tasks shift down by one.
    #[default]
    Top,
    Bottom,
}

impl TaskInsert {
    #[must_use]
    pub const fn placement(self) -> Placement {
        match self {
            Self::Top => Placement::Top,
            Self::Bottom => Placement::Bottom,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub insert: TaskInsert,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageConfig {
    /// Persist page moves with one batched upsert instead of one call per row.
    #[serde(default)]
    pub batch_moves: bool,
}

impl PageConfig {
    #[must_use]
    pub const fn persist_mode(self) -> PersistMode {
        if self.batch_moves {
            PersistMode::Batch
        } else {
            PersistMode::PerRow
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionConfig {
    /// Pointers farther than this from every region resolve to nothing.
    #[serde(default)]
    pub max_fallback_distance: Option<f32>,
}

impl CollisionConfig {
    #[must_use]
    pub const fn resolver(self) -> CollisionResolver {
        CollisionResolver::new(self.max_fallback_distance)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Read `.trellis/config.toml` under `project_root`; missing means defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(BOARD_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// Returns an error if the user config exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("trellis/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// Returns an error if either config file is unreadable or malformed.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(
        cli_json,
        user.output.as_deref(),
        env_format.as_deref(),
        std::io::stdout().is_terminal(),
    );

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// `--json` beats `FORMAT`, which beats the user config, which beats TTY
/// detection.
fn resolve_output(
    cli_json: bool,
    user_output: Option<&str>,
    env_format: Option<&str>,
    is_terminal: bool,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    env_format
        .and_then(normalize_output_mode)
        .or_else(|| user_output.and_then(normalize_output_mode))
        .unwrap_or(if is_terminal { "pretty" } else { "text" })
        .to_string()
}
