use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use std::path::{Path, PathBuf};

/// Per-invocation naming state: every artifact of one run shares `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    directory: String,
    name: String,
}

impl RunContext {
    /// Capture the current local time as the run name
    pub fn new(directory: impl Into<String>) -> Self {
        Self::with_name(directory, timestamp(&Local::now()))
    }

    pub fn with_name(directory: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// `<output><name><suffix>`, with the output prefix taken verbatim
    pub fn artifact_path(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}{}", self.directory, self.name, suffix))
    }

    /// Destination for a copied file: `<output>/<name>_<file name>`
    pub fn copy_destination(&self, file_name: &str) -> PathBuf {
        Path::new(&self.directory).join(format!("{}_{}", self.name, file_name))
    }
}

/// ISO-8601 with the zone offset, `Z` when the zone is UTC
pub fn timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
