//! Memory file location.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Environment variable overriding the memory file location
pub const MEMORY_FILE_ENV: &str = "MEMORY_FILE_PATH";

/// File name used next to the executable when nothing is configured
pub const DEFAULT_MEMORY_FILE: &str = "memory.json";

/// Resolve the memory file from an optional override.
///
/// Absolute overrides are used as-is; relative ones are joined onto
/// `install_dir`, never the working directory.
pub fn resolve_memory_path(override_path: Option<&str>, install_dir: &Path) -> PathBuf {
    match override_path.filter(|p| !p.trim().is_empty()) {
        Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
        Some(p) => install_dir.join(p),
        None => install_dir.join(DEFAULT_MEMORY_FILE),
    }
}

/// Directory containing the running executable
pub fn install_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate running executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("Executable path has no parent directory")
}

/// Memory file path for this process: explicit CLI path first, then the
/// environment override, then the default next to the executable.
pub fn memory_path(cli_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_path {
        return Ok(path);
    }
    let env_value = std::env::var(MEMORY_FILE_ENV).ok();
    Ok(resolve_memory_path(env_value.as_deref(), &install_dir()?))
}
