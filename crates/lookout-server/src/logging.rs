//! Log file helpers for the binary's `tracing-subscriber` setup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Size at which the current log file is rotated (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated files kept next to the current one.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

const LOG_FILE_NAME: &str = "lookout.log";

/// Default log file: `<local data dir>/lookout/lookout.log`, or the
/// system temp dir when the platform has no data directory.
pub fn default_log_file_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("lookout")
        .join(LOG_FILE_NAME)
}

/// Create the parent directory of `log_path` if it is missing.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Shift `lookout.log` to `lookout.log.1` (and `.1` to `.2`, and so on)
/// once it reaches `max_size` bytes. `.max_files` is the oldest kept.
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let size = match fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = numbered(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for index in (1..max_files).rev() {
        let from = numbered(log_path, index);
        if from.exists() {
            fs::rename(&from, numbered(log_path, index + 1))?;
        }
    }
    fs::rename(log_path, numbered(log_path, 1))
}

/// `tracing` filter directive for a level name; unknown names map to
/// `info`.
pub fn log_level_to_filter(level: &str) -> &'static str {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    LEVELS
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(level.trim()))
        .unwrap_or("info")
}

fn numbered(base: &Path, index: u32) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{index}"));
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_path_is_a_lookout_log() {
        let path = default_log_file_path();
        assert!(path.ends_with("lookout/lookout.log"), "got {path:?}");
    }

    #[test]
    fn numbered_appends_index() {
        let base = Path::new("/var/log/lookout.log");
        assert_eq!(numbered(base, 2), PathBuf::from("/var/log/lookout.log.2"));
    }

    #[test]
    fn rotate_ignores_missing_and_small_files() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join(LOG_FILE_NAME);
        rotate_log_files(&log, 10, 3).unwrap();

        fs::write(&log, "tiny").unwrap();
        rotate_log_files(&log, 10, 3).unwrap();
        assert!(log.exists());
        assert!(!dir.path().join("lookout.log.1").exists());
    }

    #[test]
    fn rotate_cascades_and_drops_oldest() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join(LOG_FILE_NAME);
        fs::write(dir.path().join("lookout.log.1"), "one").unwrap();
        fs::write(dir.path().join("lookout.log.2"), "two").unwrap();
        fs::write(&log, "x".repeat(64)).unwrap();

        rotate_log_files(&log, 32, 2).unwrap();

        assert!(!log.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("lookout.log.1")).unwrap(),
            "x".repeat(64)
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("lookout.log.2")).unwrap(),
            "one"
        );
        assert!(!dir.path().join("lookout.log.3").exists());
    }

    #[test]
    fn ensure_log_dir_creates_parents() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("a").join("b").join(LOG_FILE_NAME);
        ensure_log_dir(&log).unwrap();
        ensure_log_dir(&log).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
        assert!(ensure_log_dir(Path::new("bare.log")).is_ok());
    }

    #[test]
    fn level_filter_names() {
        assert_eq!(log_level_to_filter("debug"), "debug");
        assert_eq!(log_level_to_filter("WARN"), "warn");
        assert_eq!(log_level_to_filter(" error "), "error");
        assert_eq!(log_level_to_filter("loud"), "info");
    }
}
