// Suppress warnings from deprecated `cocoa` crate (would require migration to `objc2`)
#![allow(deprecated)]
// Suppress cfg warnings from `objc` crate's msg_send! macro
#![allow(unexpected_cfgs)]

mod cli;
mod config;
mod dispatch;
mod export;
mod logger;
#[cfg(target_os = "macos")]
mod macos;
mod pasteboard;
mod rtfd;
mod run_context;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use config::Config;
use export::Exporter;
use logger::Logger;
use pasteboard::SystemPasteboard;
use run_context::RunContext;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration; without it nothing is written
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let logger = Logger::init(&config.log_path()?)?;
    if let Err(e) = logger.install() {
        logger.error(&e);
    }

    // One name for every artifact of this run
    let context = RunContext::new(config.output.clone());
    logger.info(format!("The file name is {}", context.name()));
    log::debug!(
        "Writing to {:?}, logging to {:?}",
        context.directory(),
        logger.path()
    );

    let pasteboard = SystemPasteboard::new();
    let exporter = Exporter::new(&context, &pasteboard, &logger);
    dispatch::dispatch(cli.modes(), &exporter);

    Ok(())
}
