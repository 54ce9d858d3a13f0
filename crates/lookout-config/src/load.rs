use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::first_violation;

/// Directory holding a project's overlay `config.toml`.
pub const PROJECT_DIR_NAME: &str = ".lookout";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Written into `config.toml` the first time a config directory is used.
const TEMPLATE: &str = r##"# lookout configuration
# Every setting below shows its default. Remove the leading "# " to change one.

# [adapter]
# title = "lookout"
# wait_for_debugger = false
# console_buffer_capacity = 1000
# heap_snapshot_chunk_size = 102400
# heap_sampling_interval = 32768

# [server]
# listen = "127.0.0.1:9229"

# [log]
# level = "info"
# file = "/tmp/lookout.log"
"##;

/// Platform config directory for lookout, e.g. `~/.config/lookout`.
///
/// # Errors
///
/// [`ConfigError::NoConfigDir`] when the platform has no config directory.
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("lookout"))
        .ok_or_else(|| ConfigError::NoConfigDir(PathBuf::from("~/.config/lookout")))
}

/// Build the effective configuration.
///
/// Layers, lowest first: built-in defaults, `config_dir/config.toml`
/// (written from a commented template when absent), then the nearest
/// `.lookout/config.toml` at or above `project_dir`. The merged result
/// must validate.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O, parse or validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global = ensure_global_config(config_dir)?;
    let mut config = apply_layer(Config::default(), &global)?;

    if let Some(overlay) = project_dir.and_then(find_project_config) {
        tracing::debug!(path = %overlay.display(), "applying project config");
        config = apply_layer(config, &overlay)?;
    }

    first_violation(&config)?;
    Ok(config)
}

/// Path of the global config file, creating it from [`TEMPLATE`] if needed.
fn ensure_global_config(config_dir: &Path) -> Result<PathBuf, ConfigError> {
    let path = config_dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Ok(path);
    }
    fs::create_dir_all(config_dir)?;
    fs::write(&path, TEMPLATE).map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
    tracing::info!(path = %path.display(), "wrote config template");
    Ok(path)
}

/// Merge the TOML file at `path` over `config`. Comment-only files are skipped.
fn apply_layer(config: Config, path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path)?;
    if !has_settings(&text) {
        return Ok(config);
    }
    merge_configs(&config, &text)
}

fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

fn has_settings(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Parse and validate a configuration held in memory.
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(text: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    first_violation(&config)?;
    Ok(config)
}
