use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform reports no config directory.
    #[error("no config directory on this platform (expected something like {0})")]
    NoConfigDir(PathBuf),

    /// The commented template could not be written.
    #[error("cannot write config template: {0}")]
    CreateDefault(String),

    #[error("invalid TOML: {0}")]
    Parse(String),

    /// A setting is out of range or malformed.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Dotted path such as `server.listen`.
        field: String,
        message: String,
    },

    #[error("config file I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_config_dir_names_expected_location() {
        let err = ConfigError::NoConfigDir(PathBuf::from("~/.config/lookout"));
        assert_eq!(
            err.to_string(),
            "no config directory on this platform (expected something like ~/.config/lookout)"
        );
    }

    #[test]
    fn template_write_failure_display() {
        let err = ConfigError::CreateDefault("read-only file system".into());
        assert_eq!(
            err.to_string(),
            "cannot write config template: read-only file system"
        );
    }

    #[test]
    fn parse_display_keeps_toml_detail() {
        let err = ConfigError::Parse("expected `=`".into());
        assert_eq!(err.to_string(), "invalid TOML: expected `=`");
    }

    #[test]
    fn validation_display_names_field() {
        let err = ConfigError::Validation {
            field: "adapter.console_buffer_capacity".into(),
            message: "must be between 1 and 100000".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid adapter.console_buffer_capacity: must be between 1 and 100000"
        );
    }

    #[test]
    fn io_display_wraps_source() {
        let err = ConfigError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "access denied",
        ));
        assert_eq!(err.to_string(), "config file I/O: access denied");
    }
}
