mod cli;

use std::env;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use lookout_adapter::{AdapterOptions, CdpHandler};
use lookout_config::{default_config_dir, load_config, AdapterConfig, Config, LogConfig};
use lookout_engine::{EngineError, EngineThread, Value};
use lookout_server::logging::{
    default_log_file_path, ensure_log_dir, log_level_to_filter, rotate_log_files,
    DEFAULT_MAX_LOG_FILES, DEFAULT_MAX_LOG_SIZE,
};
use lookout_server::serve;

use crate::cli::{parse_args, CliArgs, USAGE};

fn adapter_options(config: &AdapterConfig) -> AdapterOptions {
    AdapterOptions {
        title: config.title.clone(),
        wait_for_debugger: config.wait_for_debugger,
        console_buffer_capacity: config.console_buffer_capacity,
        heap_snapshot_chunk_size: config.heap_snapshot_chunk_size,
        heap_sampling_interval: config.heap_sampling_interval,
    }
}

/// Where logs go: the configured file, else the platform default.
fn log_file_path(log: &LogConfig) -> PathBuf {
    log.file.clone().unwrap_or_else(default_log_file_path)
}

/// Open `path` for appending, creating its directory and rotating it first.
fn open_log_file(path: &Path) -> Result<File> {
    ensure_log_dir(path)
        .with_context(|| format!("cannot create log directory for {}", path.display()))?;
    if let Err(e) = rotate_log_files(path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES) {
        eprintln!("lookout: log rotation failed: {e}");
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))
}

/// Install the global subscriber. Falls back to stderr when the log file
/// cannot be opened.
fn init_logging(log: &LogConfig) {
    let filter = log_level_to_filter(log.level.as_str());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let path = log_file_path(log);
    match open_log_file(&path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_env_filter(env_filter)
                .init();
            eprintln!("lookout: logging to {}", path.display());
        }
        Err(e) => {
            eprintln!("lookout: {e:#}; logging to stderr");
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter)
                .init();
        }
    }
}

/// Queue every script on the engine, in order.
fn start_scripts(
    engine: &EngineThread,
    scripts: &[PathBuf],
) -> Result<Vec<(PathBuf, Receiver<Result<Value, EngineError>>)>> {
    scripts
        .iter()
        .map(|path| {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read script {}", path.display()))?;
            let url = path.display().to_string();
            Ok((path.clone(), engine.run_script(source, url)))
        })
        .collect()
}

fn report_outcome(path: &Path, outcome: Option<Result<Value, EngineError>>) {
    match outcome {
        Some(Ok(value)) => info!(script = %path.display(), result = %value, "script finished"),
        Some(Err(e)) => warn!(script = %path.display(), error = %e, "script failed"),
        None => warn!(script = %path.display(), "engine stopped before the script ran"),
    }
}

async fn serve_until_interrupted(listen: &str, handler: &CdpHandler) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("cannot listen on {listen}"))?;
    tokio::select! {
        result = serve(listener, handler) => result.context("debugger server failed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("cannot wait for ctrl-c")?;
            info!("interrupted, shutting down");
            Ok(())
        }
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config_dir = match args.config_dir {
        Some(dir) => dir,
        None => default_config_dir().context("cannot locate the config directory")?,
    };
    let project_dir = env::current_dir().ok();
    let loaded = load_config(&config_dir, project_dir.as_deref());
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    config.adapter.wait_for_debugger |= args.wait;

    init_logging(&config.log);
    if let Err(e) = loaded {
        error!(error = %e, "config load failed, using defaults");
    }
    info!(listen = %config.server.listen, scripts = args.scripts.len(), "lookout starting");

    let engine = EngineThread::spawn();
    let runtime_handle = engine.handle();
    let options = adapter_options(&config.adapter);
    let handler = engine
        .with_engine(move |engine| CdpHandler::new(engine, runtime_handle, options))
        .context("engine thread is not running")?
        .context("cannot attach the debugger")?;

    let pending = start_scripts(&engine, &args.scripts)?;
    let reporter = std::thread::Builder::new()
        .name("lookout-scripts".into())
        .spawn(move || {
            for (path, outcome) in pending {
                report_outcome(&path, outcome.recv().ok());
            }
        })
        .context("cannot spawn the script reporter")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let served = runtime.block_on(serve_until_interrupted(&config.server.listen, &handler));

    // A parked engine only continues once the adapter is gone.
    drop(handler);
    engine.shutdown();
    if reporter.join().is_err() {
        error!("script reporter panicked");
    }
    served
}

fn main() {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("lookout: {e:#}\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return;
    }
    if let Err(e) = run(args) {
        eprintln!("lookout: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_options_follow_config() {
        let config = AdapterConfig {
            title: "svc".into(),
            wait_for_debugger: true,
            console_buffer_capacity: 7,
            heap_snapshot_chunk_size: 9,
            heap_sampling_interval: 11,
        };
        let options = adapter_options(&config);
        assert_eq!(options.title, "svc");
        assert!(options.wait_for_debugger);
        assert_eq!(options.console_buffer_capacity, 7);
        assert_eq!(options.heap_snapshot_chunk_size, 9);
        assert_eq!(options.heap_sampling_interval, 11);
    }

    #[test]
    fn log_file_defaults_to_platform_path() {
        let mut log = LogConfig::default();
        assert_eq!(log_file_path(&log), default_log_file_path());
        log.file = Some(PathBuf::from("/var/log/lookout/custom.log"));
        assert_eq!(log_file_path(&log), PathBuf::from("/var/log/lookout/custom.log"));
    }

    #[test]
    fn log_file_opens_in_new_directory_and_rotates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("lookout.log");
        drop(open_log_file(&path).unwrap());
        assert!(path.exists());

        std::fs::write(&path, vec![b'x'; DEFAULT_MAX_LOG_SIZE as usize]).unwrap();
        drop(open_log_file(&path).unwrap());
        assert!(path.with_file_name("lookout.log.1").exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn default_config_matches_default_options() {
        assert_eq!(
            adapter_options(&Config::default().adapter),
            AdapterOptions::default()
        );
    }
}
