use std::net::SocketAddr;

use crate::config::Config;
use crate::error::ConfigError;

const MAX_CONSOLE_BUFFER_CAPACITY: usize = 100_000;

fn violation(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let adapter = &config.adapter;

    if adapter.title.trim().is_empty() {
        errors.push(violation("adapter.title", "must not be empty".to_string()));
    }

    let capacity = adapter.console_buffer_capacity;
    if capacity == 0 || capacity > MAX_CONSOLE_BUFFER_CAPACITY {
        errors.push(violation(
            "adapter.console_buffer_capacity",
            format!("must be 1 to {MAX_CONSOLE_BUFFER_CAPACITY}, got {capacity}"),
        ));
    }

    if adapter.heap_snapshot_chunk_size == 0 {
        errors.push(violation(
            "adapter.heap_snapshot_chunk_size",
            "must be greater than 0".to_string(),
        ));
    }

    if adapter.heap_sampling_interval == 0 {
        errors.push(violation(
            "adapter.heap_sampling_interval",
            "must be greater than 0".to_string(),
        ));
    }

    if config.server.listen.parse::<SocketAddr>().is_err() {
        errors.push(violation(
            "server.listen",
            format!("not a socket address: {:?}", config.server.listen),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// First violation of `config`, if any.
pub(crate) fn first_violation(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| violation("unknown", "validation failed".to_string()))
    })
}
