//! File-backed logging so tracing output never scribbles over the terminal UI.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Level;

use crate::error::ClientResult;

/// Where the active log file lives.
pub fn log_file_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("voxchat")
        .join("voxchat.log")
}

/// Install the global tracing subscriber writing to the log file. Safe to
/// call more than once; later calls keep the first subscriber.
pub fn init_logging(verbose: bool) -> ClientResult<PathBuf> {
    let path = log_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(path)
}
