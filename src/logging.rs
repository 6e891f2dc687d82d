// src/logging.rs
//
// tracing subscriber setup: compact stderr output plus an optional
// timestamped log file in a reports directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LATEST_LOG: &str = "espmon.log";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `filter`; `verbose` switches the library
/// to debug. When `log_dir` is given, output is also written to a new
/// `YYYYmmdd-HHMMSS-espmon.log` file there, and its path is returned.
pub fn init_logging(filter: &str, verbose: bool, log_dir: Option<&Path>) -> Result<Option<PathBuf>, String> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(format!("{},espmon_lib=debug", filter))
        } else {
            EnvFilter::new(filter)
        }
    });

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            let (file, path) = create_log_file(dir)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialise logging: {}", e))?;

    if let Some(ref path) = log_path {
        tracing::info!("File logging started: {}", path.display());
    }
    Ok(log_path)
}

/// Create a timestamped log file and point the `espmon.log` symlink at it
/// (Unix only; Windows symlinks require elevated privileges).
fn create_log_file(dir: &Path) -> Result<(File, PathBuf), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-espmon.log")
        .to_string();
    let log_path = dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    #[cfg(unix)]
    {
        let symlink_path = dir.join(LATEST_LOG);
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            // Subscriber is not installed yet
            eprintln!("[logging] Failed to create {} symlink: {}", LATEST_LOG, e);
        }
    }

    Ok((file, log_path))
}
