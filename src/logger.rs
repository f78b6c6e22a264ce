use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target, WriteStyle};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Target of the run's own lines, always shown at `info` and above
const TARGET: &str = "pdc::run";
const DEFAULT_FILTER: &str = "info";

/// Writes every line to the log file and to stdout.
///
/// A `Logger` only exists once its file sink is open, so there is no way
/// to log before initialization. Clones share the same sinks.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Sinks>,
}

struct Sinks {
    path: PathBuf,
    file: env_logger::Logger,
    stdout: env_logger::Logger,
}

impl Logger {
    /// Open the file sink at `path`, honoring `RUST_LOG` (default `info`).
    /// `RUST_LOG` can raise the detail of other targets but never hides the
    /// lines written through [`Logger::info`] and [`Logger::error`].
    pub fn init(path: &Path) -> Result<Self> {
        Self::open(path, None)
    }

    /// Like [`Logger::init`] with explicit filter directives instead of `RUST_LOG`
    pub fn with_filters(path: &Path, filters: &str) -> Result<Self> {
        Self::open(path, Some(filters))
    }

    fn open(path: &Path, filters: Option<&str>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Logger init error: cannot open {:?}", path))?;

        let file = builder(filters)
            .target(Target::Pipe(Box::new(file)))
            .write_style(WriteStyle::Never)
            .build();
        let stdout = builder(filters).target(Target::Stdout).build();

        Ok(Self {
            inner: Arc::new(Sinks {
                path: path.to_path_buf(),
                file,
                stdout,
            }),
        })
    }

    /// Route the `log` macros through this logger as well
    pub fn install(&self) -> Result<()> {
        log::set_boxed_logger(Box::new(self.clone()))
            .context("A global logger is already installed")?;
        log::set_max_level(self.max_level());
        Ok(())
    }

    /// Highest level either sink lets through
    fn max_level(&self) -> LevelFilter {
        self.inner.file.filter().max(self.inner.stdout.filter())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.emit(Level::Info, format_args!("{}", message));
    }

    /// Log an error with its full context chain
    pub fn error(&self, error: &anyhow::Error) {
        self.emit(Level::Error, format_args!("ERROR: {:#}", error));
    }

    pub fn error_msg(&self, message: impl fmt::Display) {
        self.emit(Level::Error, format_args!("ERROR: {}", message));
    }

    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        self.log(
            &Record::builder()
                .args(args)
                .level(level)
                .target(TARGET)
                .build(),
        );
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.file.enabled(metadata) || self.inner.stdout.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        self.inner.file.log(record);
        self.inner.stdout.log(record);
    }

    fn flush(&self) {
        self.inner.file.flush();
        self.inner.stdout.flush();
    }
}

fn builder(filters: Option<&str>) -> Builder {
    let mut builder = match filters {
        Some(filters) => {
            let mut builder = Builder::new();
            builder.parse_filters(filters);
            builder
        }
        None => Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER)),
    };
    // The most specific directive wins, so this overrides `RUST_LOG=error` or `off`
    builder.filter_module(TARGET, LevelFilter::Info);
    builder.format_timestamp_secs();
    builder
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("path", &self.inner.path)
            .finish()
    }
}
