use crate::config::Config;
use crate::error::ConfigError;

fn parse_error(e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Parse(e.to_string())
}

/// Merge an overlay TOML fragment on top of `base`.
///
/// Keys present in `overlay_toml` win; everything else keeps its `base`
/// value. Both sides go through [`toml::Value`] so nested tables merge
/// key by key.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let base_text = toml::to_string(base).map_err(parse_error)?;
    let mut merged: toml::Value = toml::from_str(&base_text).map_err(parse_error)?;
    let overlay: toml::Value = toml::from_str(overlay_toml).map_err(parse_error)?;

    merge_values(&mut merged, &overlay);

    merged.try_into().map_err(parse_error)
}

/// Recursively merge `overlay` into `base`. Tables merge per key; any
/// other value is replaced outright.
fn merge_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
