use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Log file name used when the config does not name one
pub const DEFAULT_LOG_FILE: &str = "pdc.log";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Destination prefix for every artifact. Used verbatim, so it should
    /// carry its own trailing separator.
    pub output: String,
    #[serde(default)]
    pub log: Option<PathBuf>,
}

impl Config {
    /// Default config location, relative to the working directory
    pub const DEFAULT_PATH: &'static str = "./config.plist";

    /// Load config from a property list file (XML or binary)
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Can't find {}", path.display());
        }

        let config: Config = plist::from_file(path)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Where the log file goes: the configured path, or `pdc.log` next to
    /// the running executable
    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log {
            return Ok(path.clone());
        }
        default_log_path()
    }
}

fn default_log_path() -> Result<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    if let Some(dir) = exe_dir {
        return Ok(dir.join(DEFAULT_LOG_FILE));
    }

    log::debug!("Executable path unavailable, falling back to the data directory");
    let dirs = ProjectDirs::from("com", "pdc", "pdc")
        .context("Could not determine a directory for the log file")?;
    Ok(dirs.data_local_dir().join(DEFAULT_LOG_FILE))
}
