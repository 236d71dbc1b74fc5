use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "dahdit=debug";

/// `RUST_LOG` when set, otherwise debug output for this crate only
pub fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs a file-backed subscriber when `debug` is set.
///
/// The terminal belongs to the TUI, so nothing is ever written to stdout.
/// Returns the log path in use, or `None` when logging stays off.
pub fn init(debug: bool, path: Option<&Path>) -> std::io::Result<Option<PathBuf>> {
    if !debug {
        return Ok(None);
    }
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("dahdit.log"));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    // a second init (tests, re-entry) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();

    Ok(Some(path))
}
