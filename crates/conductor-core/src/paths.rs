use anyhow::Result;
use std::path::{Path, PathBuf};

const CONDUCTOR_DIR: &str = ".conductor";
const PROFILES_FILE: &str = "unified-profiles.json";
const ROUTING_FILE: &str = "routing.json";
const LOGS_DIR: &str = "logs";

/// Environment variable to override the Conductor directory.
pub const CONDUCTOR_DIR_ENV: &str = "CONDUCTOR_DIR";

/// Resolve the Conductor configuration directory.
/// Priority: CONDUCTOR_DIR env var > ~/.conductor/
pub fn resolve_conductor_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONDUCTOR_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(CONDUCTOR_DIR))
        .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))
}

/// Ensure the Conductor directory exists and return its path.
pub fn ensure_conductor_dir() -> Result<PathBuf> {
    let dir = resolve_conductor_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Get the unified profile store path: ~/.conductor/unified-profiles.json
pub fn profiles_path() -> Result<PathBuf> {
    Ok(profiles_path_in(&resolve_conductor_dir()?))
}

pub fn profiles_path_in(base: &Path) -> PathBuf {
    base.join(PROFILES_FILE)
}

/// Get the logs directory: ~/.conductor/logs/
pub fn logs_dir() -> Result<PathBuf> {
    logs_dir_in(&resolve_conductor_dir()?)
}

/// Create and return `<base>/logs`
pub fn logs_dir_in(base: &Path) -> Result<PathBuf> {
    let dir = base.join(LOGS_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Per-project routing settings: <project>/.conductor/routing.json
pub fn routing_settings_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CONDUCTOR_DIR).join(ROUTING_FILE)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
