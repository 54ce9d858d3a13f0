use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    /// Default.
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lower-case name, as written in `config.toml`.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Debugger adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Execution context name shown to the client.
    #[serde(default = "default_title")]
    pub title: String,
    /// Hold the first script at load until the client resumes it.
    #[serde(default)]
    pub wait_for_debugger: bool,
    /// Console messages kept before `Runtime.enable` (1–100000).
    #[serde(default = "default_console_buffer_capacity")]
    pub console_buffer_capacity: usize,
    /// Bytes per heap snapshot chunk.
    #[serde(default = "default_heap_snapshot_chunk_size")]
    pub heap_snapshot_chunk_size: usize,
    /// Default heap sampling interval in bytes.
    #[serde(default = "default_heap_sampling_interval")]
    pub heap_sampling_interval: u64,
}

fn default_title() -> String {
    "lookout".to_string()
}
fn default_console_buffer_capacity() -> usize {
    1000
}
fn default_heap_snapshot_chunk_size() -> usize {
    100 * 1024
}
fn default_heap_sampling_interval() -> u64 {
    32 * 1024
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            wait_for_debugger: false,
            console_buffer_capacity: default_console_buffer_capacity(),
            heap_snapshot_chunk_size: default_heap_snapshot_chunk_size(),
            heap_sampling_interval: default_heap_sampling_interval(),
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the client connects to.
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:9229".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

/// Top-level lookout configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.adapter.title, "lookout");
        assert!(!cfg.adapter.wait_for_debugger);
        assert_eq!(cfg.adapter.console_buffer_capacity, 1000);
        assert_eq!(cfg.adapter.heap_snapshot_chunk_size, 102_400);
        assert_eq!(cfg.adapter.heap_sampling_interval, 32_768);
        assert_eq!(cfg.server.listen, "127.0.0.1:9229");
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let cfg = Config {
            adapter: AdapterConfig {
                title: "app".into(),
                wait_for_debugger: true,
                console_buffer_capacity: 10,
                heap_snapshot_chunk_size: 512,
                heap_sampling_interval: 1024,
            },
            server: ServerConfig {
                listen: "0.0.0.0:9000".into(),
            },
            log: LogConfig {
                level: LogLevel::Debug,
                file: Some(PathBuf::from("/tmp/lookout.log")),
            },
        };

        let toml_str = toml::to_string(&cfg).expect("serialize");
        let deserialized: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn parse_from_toml_string() {
        let input = r#"
[adapter]
title = "my app"
wait_for_debugger = true

[log]
level = "trace"
"#;
        let cfg: Config = toml::from_str(input).expect("parse toml");
        assert_eq!(cfg.adapter.title, "my app");
        assert!(cfg.adapter.wait_for_debugger);
        assert_eq!(cfg.log.level, LogLevel::Trace);
        // Unspecified fields keep defaults via serde(default)
        assert_eq!(cfg.adapter.console_buffer_capacity, 1000);
        assert_eq!(cfg.server, ServerConfig::default());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty toml");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn log_level_names() {
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(LogLevel::default().as_str(), "info");
    }
}
